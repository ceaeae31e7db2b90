//! Supported operating modes of the IMX708 and the register programs that
//! realize them. The catalog is static, shared, read-only data; the driver
//! only ever holds references into it.

/// One atomic register write, part of a mode's register program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOp {
    pub address: u16,
    pub value: u8,
}

const fn op(address: u16, value: u8) -> RegisterOp {
    RegisterOp { address, value }
}

/// Media bus pixel code, using the raw Linux media-bus numbering so the
/// catalog can be matched against framework format requests directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MbusCode(pub u32);

impl MbusCode {
    /// 10-bit Bayer RGGB, the only format this sensor produces.
    pub const SRGGB10_1X10: Self = MbusCode(0x300f);
}

/// Whether a mode produces one exposure per frame or three
/// geometrically-related ones via a fixed ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HdrMode {
    None,
    /// Three exposures per frame (long:med == med:short == 4)
    X3,
}

/// Analog crop rectangle on the pixel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Frame interval as a fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fract {
    pub numerator: u32,
    pub denominator: u32,
}

/// One discrete, fully specified sensor operating configuration.
pub struct Mode {
    pub code: MbusCode,
    pub width: u32,
    pub height: u32,
    /// Highest possible frame interval
    pub max_fps: Fract,
    /// H-timing in pixels
    pub line_length_pix: u32,
    pub crop: Rect,
    /// Lowest vblank (highest framerate)
    pub vblank_min: u32,
    /// Default-framerate vblank
    pub vblank_default: u32,
    pub reg_list: &'static [RegisterOp],
    /// Not all modes have the same pixel rate.
    pub pixel_rate: u64,
    /// Not all modes have the same minimum exposure.
    pub exposure_lines_min: u32,
    /// Not all modes have the same exposure lines step.
    pub exposure_lines_step: u32,
    pub hdr: HdrMode,
}

use crate::registers::{
    HDR_EXPOSURE_RATIO, PIXEL_ARRAY_HEIGHT, PIXEL_ARRAY_LEFT, PIXEL_ARRAY_TOP,
    PIXEL_ARRAY_WIDTH,
};

/// Default PDAF pixel correction gains, periodic over 9 entries.
pub(crate) const PDAF_GAINS_L: [u8; 9] =
    [0x4c, 0x4c, 0x4c, 0x46, 0x3e, 0x38, 0x35, 0x35, 0x35];
pub(crate) const PDAF_GAINS_R: [u8; 9] =
    [0x35, 0x35, 0x35, 0x38, 0x3e, 0x46, 0x4c, 0x4c, 0x4c];
/// Entries per PDAF correction table (left and right channels each).
pub(crate) const PDAF_TABLE_LEN: u16 = 54;

/// The output interface clock rates the sensor can be programmed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkFrequency {
    Mhz450,
    Mhz447,
    Mhz453,
}

impl LinkFrequency {
    /// Select the table entry for a requested rate in Hz.
    pub fn from_hz(hz: u64) -> Option<Self> {
        match hz {
            450_000_000 => Some(LinkFrequency::Mhz450),
            447_000_000 => Some(LinkFrequency::Mhz447),
            453_000_000 => Some(LinkFrequency::Mhz453),
            _ => None,
        }
    }

    pub fn hz(self) -> u64 {
        match self {
            LinkFrequency::Mhz450 => 450_000_000,
            LinkFrequency::Mhz447 => 447_000_000,
            LinkFrequency::Mhz453 => 453_000_000,
        }
    }

    /// PLL register writes that select this link frequency.
    pub(crate) fn reg_list(self) -> &'static [RegisterOp] {
        match self {
            LinkFrequency::Mhz450 => LINK_450MHZ_REGS,
            LinkFrequency::Mhz447 => LINK_447MHZ_REGS,
            LinkFrequency::Mhz453 => LINK_453MHZ_REGS,
        }
    }
}

/// 450MHz is the nominal "default" link frequency.
const LINK_450MHZ_REGS: &[RegisterOp] = &[op(0x030e, 0x01), op(0x030f, 0x2c)];
const LINK_447MHZ_REGS: &[RegisterOp] = &[op(0x030e, 0x01), op(0x030f, 0x2a)];
const LINK_453MHZ_REGS: &[RegisterOp] = &[op(0x030e, 0x01), op(0x030f, 0x2e)];

/// Applied once per power cycle, independent of the active mode.
pub(crate) const MODE_COMMON_REGS: &[RegisterOp] = &[
    op(0x0100, 0x00),
    op(0x0136, 0x18),
    op(0x0137, 0x00),
    op(0x33f0, 0x02),
    op(0x33f1, 0x05),
    op(0x3062, 0x00),
    op(0x3063, 0x12),
    op(0x3068, 0x00),
    op(0x3069, 0x12),
    op(0x306a, 0x00),
    op(0x306b, 0x30),
    op(0x3076, 0x00),
    op(0x3077, 0x30),
    op(0x3078, 0x00),
    op(0x3079, 0x30),
    op(0x5e54, 0x0c),
    op(0x6e44, 0x00),
    op(0xb0b6, 0x01),
    op(0xe829, 0x00),
    op(0xf001, 0x08),
    op(0xf003, 0x08),
    op(0xf00d, 0x10),
    op(0xf00f, 0x10),
    op(0xf031, 0x08),
    op(0xf033, 0x08),
    op(0xf03d, 0x10),
    op(0xf03f, 0x10),
    op(0x0112, 0x0a),
    op(0x0113, 0x0a),
    op(0x0114, 0x01),
    op(0x0b8e, 0x01),
    op(0x0b8f, 0x00),
    op(0x0b94, 0x01),
    op(0x0b95, 0x00),
    op(0x3400, 0x01),
    op(0x3478, 0x01),
    op(0x3479, 0x1c),
    op(0x3091, 0x01),
    op(0x3092, 0x00),
    op(0x3419, 0x00),
    op(0xbcf1, 0x02),
    op(0x3094, 0x01),
    op(0x3095, 0x01),
    op(0x3362, 0x00),
    op(0x3363, 0x00),
    op(0x3364, 0x00),
    op(0x3365, 0x00),
    op(0x0138, 0x01),
];

/// Full resolution, 10-bit.
const MODE_4608X2592_REGS: &[RegisterOp] = &[
    op(0x0342, 0x3d),
    op(0x0343, 0x20),
    op(0x0340, 0x0a),
    op(0x0341, 0x59),
    op(0x0344, 0x00),
    op(0x0345, 0x00),
    op(0x0346, 0x00),
    op(0x0347, 0x00),
    op(0x0348, 0x11),
    op(0x0349, 0xff),
    op(0x034a, 0x0a),
    op(0x034b, 0x1f),
    op(0x0220, 0x62),
    op(0x0222, 0x01),
    op(0x0900, 0x00),
    op(0x0901, 0x11),
    op(0x0902, 0x0a),
    op(0x3200, 0x01),
    op(0x3201, 0x01),
    op(0x32d5, 0x01),
    op(0x32d6, 0x00),
    op(0x32db, 0x01),
    op(0x32df, 0x00),
    op(0x350c, 0x00),
    op(0x350d, 0x00),
    op(0x0408, 0x00),
    op(0x0409, 0x00),
    op(0x040a, 0x00),
    op(0x040b, 0x00),
    op(0x040c, 0x12),
    op(0x040d, 0x00),
    op(0x040e, 0x0a),
    op(0x040f, 0x20),
    op(0x034c, 0x12),
    op(0x034d, 0x00),
    op(0x034e, 0x0a),
    op(0x034f, 0x20),
    op(0x0301, 0x05),
    op(0x0303, 0x02),
    op(0x0305, 0x02),
    op(0x0306, 0x00),
    op(0x0307, 0x7c),
    op(0x030b, 0x02),
    op(0x030d, 0x04),
    op(0x0310, 0x01),
    op(0x3ca0, 0x00),
    op(0x3ca1, 0x64),
    op(0x3ca4, 0x00),
    op(0x3ca5, 0x00),
    op(0x3ca6, 0x00),
    op(0x3ca7, 0x00),
    op(0x3caa, 0x00),
    op(0x3cab, 0x00),
    op(0x3cb8, 0x00),
    op(0x3cb9, 0x08),
    op(0x3cba, 0x00),
    op(0x3cbb, 0x00),
    op(0x3cbc, 0x00),
    op(0x3cbd, 0x3c),
    op(0x3cbe, 0x00),
    op(0x3cbf, 0x00),
    op(0x0202, 0x0a),
    op(0x0203, 0x29),
    op(0x0224, 0x01),
    op(0x0225, 0xf4),
    op(0x3116, 0x01),
    op(0x3117, 0xf4),
    op(0x0204, 0x00),
    op(0x0205, 0x00),
    op(0x0216, 0x00),
    op(0x0217, 0x00),
    op(0x0218, 0x01),
    op(0x0219, 0x00),
    op(0x020e, 0x01),
    op(0x020f, 0x00),
    op(0x3118, 0x00),
    op(0x3119, 0x00),
    op(0x311a, 0x01),
    op(0x311b, 0x00),
    op(0x341a, 0x00),
    op(0x341b, 0x00),
    op(0x341c, 0x00),
    op(0x341d, 0x00),
    op(0x341e, 0x01),
    op(0x341f, 0x20),
    op(0x3420, 0x00),
    op(0x3421, 0xd8),
    op(0xc428, 0x00),
    op(0xc429, 0x04),
    op(0x3366, 0x00),
    op(0x3367, 0x00),
    op(0x3368, 0x00),
    op(0x3369, 0x00),
];

/// Regular 2x2 binned 1080p.
const MODE_2X2BINNED_REGS: &[RegisterOp] = &[
    op(0x0342, 0x1e),
    op(0x0343, 0x90),
    op(0x0340, 0x05),
    op(0x0341, 0x38),
    op(0x0344, 0x00),
    op(0x0345, 0x00),
    op(0x0346, 0x00),
    op(0x0347, 0x00),
    op(0x0348, 0x11),
    op(0x0349, 0xff),
    op(0x034a, 0x0a),
    op(0x034b, 0x1f),
    op(0x0220, 0x62),
    op(0x0222, 0x01),
    op(0x0900, 0x01),
    op(0x0901, 0x22),
    op(0x0902, 0x08),
    op(0x3200, 0x41),
    op(0x3201, 0x41),
    op(0x32d5, 0x00),
    op(0x32d6, 0x00),
    op(0x32db, 0x01),
    op(0x32df, 0x00),
    op(0x350c, 0x00),
    op(0x350d, 0x00),
    op(0x0408, 0x00),
    op(0x0409, 0x00),
    op(0x040a, 0x00),
    op(0x040b, 0x00),
    op(0x040c, 0x09),
    op(0x040d, 0x00),
    op(0x040e, 0x05),
    op(0x040f, 0x10),
    op(0x034c, 0x09),
    op(0x034d, 0x00),
    op(0x034e, 0x05),
    op(0x034f, 0x10),
    op(0x0301, 0x05),
    op(0x0303, 0x02),
    op(0x0305, 0x02),
    op(0x0306, 0x00),
    op(0x0307, 0x7a),
    op(0x030b, 0x02),
    op(0x030d, 0x04),
    op(0x0310, 0x01),
    op(0x3ca0, 0x00),
    op(0x3ca1, 0x3c),
    op(0x3ca4, 0x00),
    op(0x3ca5, 0x3c),
    op(0x3ca6, 0x00),
    op(0x3ca7, 0x00),
    op(0x3caa, 0x00),
    op(0x3cab, 0x00),
    op(0x3cb8, 0x00),
    op(0x3cb9, 0x1c),
    op(0x3cba, 0x00),
    op(0x3cbb, 0x08),
    op(0x3cbc, 0x00),
    op(0x3cbd, 0x1e),
    op(0x3cbe, 0x00),
    op(0x3cbf, 0x0a),
    op(0x0202, 0x05),
    op(0x0203, 0x08),
    op(0x0224, 0x01),
    op(0x0225, 0xf4),
    op(0x3116, 0x01),
    op(0x3117, 0xf4),
    op(0x0204, 0x00),
    op(0x0205, 0x70),
    op(0x0216, 0x00),
    op(0x0217, 0x70),
    op(0x0218, 0x01),
    op(0x0219, 0x00),
    op(0x020e, 0x01),
    op(0x020f, 0x00),
    op(0x3118, 0x00),
    op(0x3119, 0x70),
    op(0x311a, 0x01),
    op(0x311b, 0x00),
    op(0x341a, 0x00),
    op(0x341b, 0x00),
    op(0x341c, 0x00),
    op(0x341d, 0x00),
    op(0x341e, 0x00),
    op(0x341f, 0x90),
    op(0x3420, 0x00),
    op(0x3421, 0x6c),
    op(0x3366, 0x07),
    op(0x3367, 0x80),
    op(0x3368, 0x04),
    op(0x3369, 0x38),
];

/// 2x2 binned and cropped for 720p.
const MODE_2X2BINNED_720P_REGS: &[RegisterOp] = &[
    op(0x0342, 0x14),
    op(0x0343, 0x60),
    op(0x0340, 0x04),
    op(0x0341, 0xb6),
    op(0x0344, 0x03),
    op(0x0345, 0x00),
    op(0x0346, 0x01),
    op(0x0347, 0xb0),
    op(0x0348, 0x0e),
    op(0x0349, 0xff),
    op(0x034a, 0x08),
    op(0x034b, 0x6f),
    op(0x0220, 0x62),
    op(0x0222, 0x01),
    op(0x0900, 0x01),
    op(0x0901, 0x22),
    op(0x0902, 0x08),
    op(0x3200, 0x41),
    op(0x3201, 0x41),
    op(0x32d5, 0x00),
    op(0x32d6, 0x00),
    op(0x32db, 0x01),
    op(0x32df, 0x01),
    op(0x350c, 0x00),
    op(0x350d, 0x00),
    op(0x0408, 0x00),
    op(0x0409, 0x00),
    op(0x040a, 0x00),
    op(0x040b, 0x00),
    op(0x040c, 0x06),
    op(0x040d, 0x00),
    op(0x040e, 0x03),
    op(0x040f, 0x60),
    op(0x034c, 0x06),
    op(0x034d, 0x00),
    op(0x034e, 0x03),
    op(0x034f, 0x60),
    op(0x0301, 0x05),
    op(0x0303, 0x02),
    op(0x0305, 0x02),
    op(0x0306, 0x00),
    op(0x0307, 0x76),
    op(0x030b, 0x02),
    op(0x030d, 0x04),
    op(0x0310, 0x01),
    op(0x3ca0, 0x00),
    op(0x3ca1, 0x3c),
    op(0x3ca4, 0x01),
    op(0x3ca5, 0x5e),
    op(0x3ca6, 0x00),
    op(0x3ca7, 0x00),
    op(0x3caa, 0x00),
    op(0x3cab, 0x00),
    op(0x3cb8, 0x00),
    op(0x3cb9, 0x0c),
    op(0x3cba, 0x00),
    op(0x3cbb, 0x04),
    op(0x3cbc, 0x00),
    op(0x3cbd, 0x1e),
    op(0x3cbe, 0x00),
    op(0x3cbf, 0x05),
    op(0x0202, 0x04),
    op(0x0203, 0x86),
    op(0x0224, 0x01),
    op(0x0225, 0xf4),
    op(0x3116, 0x01),
    op(0x3117, 0xf4),
    op(0x0204, 0x00),
    op(0x0205, 0x70),
    op(0x0216, 0x00),
    op(0x0217, 0x70),
    op(0x0218, 0x01),
    op(0x0219, 0x00),
    op(0x020e, 0x01),
    op(0x020f, 0x00),
    op(0x3118, 0x00),
    op(0x3119, 0x70),
    op(0x311a, 0x01),
    op(0x311b, 0x00),
    op(0x341a, 0x00),
    op(0x341b, 0x00),
    op(0x341c, 0x00),
    op(0x341d, 0x00),
    op(0x341e, 0x00),
    op(0x341f, 0x60),
    op(0x3420, 0x00),
    op(0x3421, 0x48),
    op(0x3366, 0x00),
    op(0x3367, 0x00),
    op(0x3368, 0x00),
    op(0x3369, 0x00),
];

/// The only HDR mode, 2x2 downscaled.
const MODE_HDR_REGS: &[RegisterOp] = &[
    op(0x0342, 0x14),
    op(0x0343, 0x60),
    op(0x0340, 0x0a),
    op(0x0341, 0x5b),
    op(0x0344, 0x00),
    op(0x0345, 0x00),
    op(0x0346, 0x00),
    op(0x0347, 0x00),
    op(0x0348, 0x11),
    op(0x0349, 0xff),
    op(0x034a, 0x0a),
    op(0x034b, 0x1f),
    op(0x0220, 0x01),
    op(0x0222, HDR_EXPOSURE_RATIO as u8),
    op(0x0900, 0x00),
    op(0x0901, 0x11),
    op(0x0902, 0x0a),
    op(0x3200, 0x01),
    op(0x3201, 0x01),
    op(0x32d5, 0x00),
    op(0x32d6, 0x00),
    op(0x32db, 0x01),
    op(0x32df, 0x00),
    op(0x350c, 0x00),
    op(0x350d, 0x00),
    op(0x0408, 0x00),
    op(0x0409, 0x00),
    op(0x040a, 0x00),
    op(0x040b, 0x00),
    op(0x040c, 0x09),
    op(0x040d, 0x00),
    op(0x040e, 0x05),
    op(0x040f, 0x10),
    op(0x034c, 0x09),
    op(0x034d, 0x00),
    op(0x034e, 0x05),
    op(0x034f, 0x10),
    op(0x0301, 0x05),
    op(0x0303, 0x02),
    op(0x0305, 0x02),
    op(0x0306, 0x00),
    op(0x0307, 0xa2),
    op(0x030b, 0x02),
    op(0x030d, 0x04),
    op(0x0310, 0x01),
    op(0x3ca0, 0x00),
    op(0x3ca1, 0x00),
    op(0x3ca4, 0x00),
    op(0x3ca5, 0x00),
    op(0x3ca6, 0x00),
    op(0x3ca7, 0x28),
    op(0x3caa, 0x00),
    op(0x3cab, 0x00),
    op(0x3cb8, 0x00),
    op(0x3cb9, 0x30),
    op(0x3cba, 0x00),
    op(0x3cbb, 0x00),
    op(0x3cbc, 0x00),
    op(0x3cbd, 0x32),
    op(0x3cbe, 0x00),
    op(0x3cbf, 0x00),
    op(0x0202, 0x0a),
    op(0x0203, 0x2b),
    op(0x0224, 0x0a),
    op(0x0225, 0x2b),
    op(0x3116, 0x0a),
    op(0x3117, 0x2b),
    op(0x0204, 0x00),
    op(0x0205, 0x00),
    op(0x0216, 0x00),
    op(0x0217, 0x00),
    op(0x0218, 0x01),
    op(0x0219, 0x00),
    op(0x020e, 0x01),
    op(0x020f, 0x00),
    op(0x3118, 0x00),
    op(0x3119, 0x00),
    op(0x311a, 0x01),
    op(0x311b, 0x00),
    op(0x341a, 0x00),
    op(0x341b, 0x00),
    op(0x341c, 0x00),
    op(0x341d, 0x00),
    op(0x341e, 0x00),
    op(0x341f, 0x90),
    op(0x3420, 0x00),
    op(0x3421, 0x6c),
    op(0x3360, 0x01),
    op(0x3361, 0x01),
    op(0x3366, 0x07),
    op(0x3367, 0x80),
    op(0x3368, 0x04),
    op(0x3369, 0x38),
];

const FULL_FOV_CROP: Rect = Rect {
    left: PIXEL_ARRAY_LEFT,
    top: PIXEL_ARRAY_TOP,
    width: PIXEL_ARRAY_WIDTH,
    height: PIXEL_ARRAY_HEIGHT,
};

/// Mode catalog, ordered; iteration order is the best-fit tie-break.
pub static SUPPORTED_MODES: [Mode; 4] = [
    // Full resolution
    Mode {
        code: MbusCode::SRGGB10_1X10,
        width: 4608,
        height: 2592,
        max_fps: Fract {
            numerator: 10000,
            denominator: 140000,
        },
        line_length_pix: 0x3d20,
        crop: FULL_FOV_CROP,
        vblank_min: 58,
        vblank_default: 58,
        reg_list: MODE_4608X2592_REGS,
        pixel_rate: 595_200_000,
        exposure_lines_min: 8,
        exposure_lines_step: 1,
        hdr: HdrMode::None,
    },
    // Regular 2x2 binned
    Mode {
        code: MbusCode::SRGGB10_1X10,
        width: 1920,
        height: 1080,
        max_fps: Fract {
            numerator: 10000,
            denominator: 660000,
        },
        line_length_pix: 0x1e90,
        crop: FULL_FOV_CROP,
        vblank_min: 40,
        vblank_default: 1198,
        reg_list: MODE_2X2BINNED_REGS,
        pixel_rate: 585_600_000,
        exposure_lines_min: 4,
        exposure_lines_step: 2,
        hdr: HdrMode::None,
    },
    // There's only one HDR mode, which is 2x2 downscaled
    Mode {
        code: MbusCode::SRGGB10_1X10,
        width: 1920,
        height: 1080,
        max_fps: Fract {
            numerator: 10000,
            denominator: 310000,
        },
        line_length_pix: 0x1460,
        crop: FULL_FOV_CROP,
        vblank_min: 3673,
        vblank_default: 3673,
        reg_list: MODE_HDR_REGS,
        pixel_rate: 777_600_000,
        exposure_lines_min: 8 * HDR_EXPOSURE_RATIO * HDR_EXPOSURE_RATIO,
        exposure_lines_step: 2 * HDR_EXPOSURE_RATIO * HDR_EXPOSURE_RATIO,
        hdr: HdrMode::X3,
    },
    // 2x2 binned and cropped for 720p
    Mode {
        code: MbusCode::SRGGB10_1X10,
        width: 1536,
        height: 864,
        max_fps: Fract {
            numerator: 10000,
            denominator: 1200000,
        },
        line_length_pix: 0x1460,
        crop: Rect {
            left: PIXEL_ARRAY_LEFT + 768,
            top: PIXEL_ARRAY_TOP + 432,
            width: 3072,
            height: 1728,
        },
        vblank_min: 40,
        vblank_default: 2755,
        reg_list: MODE_2X2BINNED_720P_REGS,
        pixel_rate: 566_400_000,
        exposure_lines_min: 4,
        exposure_lines_step: 2,
        hdr: HdrMode::None,
    },
];

fn reso_dist(mode: &Mode, width: u32, height: u32) -> u32 {
    let dw = if mode.width > width {
        mode.width - width
    } else {
        width - mode.width
    };
    let dh = if mode.height > height {
        mode.height - height
    } else {
        height - mode.height
    };
    dw + dh
}

/// Pick the catalog entry closest to the requested frame size, among the
/// entries producing the requested bus code. Distance is Manhattan over
/// width and height; ties keep the lowest catalog index. `None` when no
/// entry matches the code at all.
pub fn find_best_fit(code: MbusCode, width: u32, height: u32) -> Option<&'static Mode> {
    let mut best: Option<(&Mode, u32)> = None;
    for mode in SUPPORTED_MODES.iter() {
        if mode.code != code {
            continue;
        }
        let dist = reso_dist(mode, width, height);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((mode, dist)),
        }
    }
    best.map(|(mode, _)| mode)
}

/// Find the entry with exactly this frame size and HDR class.
pub fn select_by_hdr(width: u32, height: u32, hdr: HdrMode) -> Option<&'static Mode> {
    SUPPORTED_MODES
        .iter()
        .find(|mode| mode.width == width && mode.height == height && mode.hdr == hdr)
}

/// First catalog entry with the given HDR class, used to seed the active
/// mode at attach time.
pub fn initial_mode(hdr: HdrMode) -> &'static Mode {
    SUPPORTED_MODES
        .iter()
        .find(|mode| mode.hdr == hdr)
        .unwrap_or(&SUPPORTED_MODES[0])
}
