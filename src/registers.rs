//! Register map for the IMX708 two-wire configuration interface.
//! Register addresses are 16 bits wide; values are written big-endian,
//! one to four bytes at a time.

/// Registers touched individually by the driver (mode tables carry the
/// rest as raw address/value pairs).
#[repr(u16)]
#[derive(Clone, Copy)]
pub enum Register {
    /// Module variant word: bit 1 = wide-angle lens, bit 7 = NoIR
    ModuleId = 0x0000,
    ChipId = 0x0016,
    /// 0x00 = software standby, 0x01 = streaming
    ModeSelect = 0x0100,
    /// hflip in bit 0, vflip in bit 1
    Orientation = 0x0101,
    /// Exposure in lines, right-shifted by the long-exposure factor
    Exposure = 0x0202,
    AnalogGain = 0x0204,
    DigitalGain = 0x020e,
    /// Total lines per frame (vblank + active height), after shifting
    FrameLength = 0x0340,
    TestPattern = 0x0600,
    TestPatternRed = 0x0602,
    TestPatternGreenR = 0x0604,
    TestPatternBlue = 0x0606,
    TestPatternGreenB = 0x0608,
    ColourBalanceRed = 0x0b90,
    ColourBalanceBlue = 0x0b92,
    /// Long exposure shift factor (power of two)
    LongExpShift = 0x3100,
    /// First of 54 left-channel PDAF correction gains
    BaseSpcGainsL = 0x7b10,
    /// First of 54 right-channel PDAF correction gains
    BaseSpcGainsR = 0x7c00,
}

pub const CHIP_ID: u16 = 0x0708;

pub const MODE_STANDBY: u8 = 0x00;
pub const MODE_STREAMING: u8 = 0x01;

pub const MODULE_ID_WIDE: u16 = 0x02;
pub const MODULE_ID_NOIR: u16 = 0x80;

/// Largest value the 16-bit frame length register accepts.
pub const FRAME_LENGTH_MAX: u32 = 0xffff;
/// Largest long-exposure shift the sensor supports.
pub const LONG_EXP_SHIFT_MAX: u8 = 7;

/// Lines subtracted from (height + vblank) to get the usable exposure max.
pub const EXPOSURE_OFFSET: u32 = 48;
pub const EXPOSURE_MIN: u32 = 1;
pub const EXPOSURE_DEFAULT: u32 = 0x640;

pub const ANA_GAIN_MIN: u32 = 112;
pub const ANA_GAIN_MAX: u32 = 960;
pub const ANA_GAIN_DEFAULT: u32 = ANA_GAIN_MIN;

pub const DGTL_GAIN_MIN: u32 = 0x0100;
pub const DGTL_GAIN_MAX: u32 = 0xffff;
pub const DGTL_GAIN_DEFAULT: u32 = 0x0100;

pub const COLOUR_BALANCE_MIN: u32 = 0x01;
pub const COLOUR_BALANCE_MAX: u32 = 0xffff;
pub const COLOUR_BALANCE_DEFAULT: u32 = 0x100;

pub const TEST_PATTERN_COLOUR_MAX: u32 = 0x0fff;

/// Untouched-from-factory sentinel read back from `BaseSpcGainsL`; seeing
/// it means the PDAF correction tables still need to be programmed.
pub const SPC_GAINS_UNPATCHED: u32 = 0x40;

/// In HDR mode the sensor derives the medium and short exposures from the
/// longest one by this ratio (long:med == med:short).
pub const HDR_EXPOSURE_RATIO: u32 = 4;

/// IMX708 native and active pixel array size.
pub const NATIVE_WIDTH: u32 = 4640;
pub const NATIVE_HEIGHT: u32 = 2658;
pub const PIXEL_ARRAY_LEFT: u32 = 16;
pub const PIXEL_ARRAY_TOP: u32 = 24;
pub const PIXEL_ARRAY_WIDTH: u32 = 4608;
pub const PIXEL_ARRAY_HEIGHT: u32 = 2592;
