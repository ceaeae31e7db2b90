use crate::controls::{
    ControlId, ControlRange, ControlValues, TestPattern, ANALOG_GAIN_RANGE,
    COLOUR_BALANCE_RANGE, DIGITAL_GAIN_RANGE, FLIP_RANGE, TEST_PATTERN_COLOUR_RANGE,
};
use crate::modes::{
    self, HdrMode, LinkFrequency, MbusCode, Mode, RegisterOp, MODE_COMMON_REGS,
    PDAF_GAINS_L, PDAF_GAINS_R, PDAF_TABLE_LEN,
};
use crate::registers::{
    Register, CHIP_ID, EXPOSURE_MIN, EXPOSURE_OFFSET, FRAME_LENGTH_MAX,
    LONG_EXP_SHIFT_MAX, MODE_STANDBY, MODE_STREAMING, MODULE_ID_NOIR, MODULE_ID_WIDE,
    SPC_GAINS_UNPATCHED,
};
use crate::{Error, PowerControl};

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

/// Module variant bits read from the sensor during identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleInfo {
    pub wide_angle: bool,
    pub noir: bool,
}

/// Main driver struct. Owns the register transport, the power collaborator
/// and all mutable sensor state; compound operations take `&mut self`, so
/// register programming sequences can never interleave.
pub struct Imx708<I2C, PWR> {
    base_address: u8,
    i2c: I2C,
    power: PWR,
    mode: &'static Mode,
    link_freq: LinkFrequency,
    /// Power-of-two time-unit multiplier once the requested frame length
    /// exceeds the 16-bit register range. Set through VBLANK.
    long_exp_shift: u8,
    common_regs_written: bool,
    streaming: bool,
    powered: bool,
    ctrl: ControlValues,
    exposure_range: ControlRange,
    vblank_range: ControlRange,
}

impl<I2C, PWR, CommE, PowerE> Imx708<I2C, PWR>
where
    I2C: embedded_hal::blocking::i2c::Write<Error = CommE>
        + embedded_hal::blocking::i2c::WriteRead<Error = CommE>,
    PWR: PowerControl<Error = PowerE>,
{
    /// Create a new instance with an i2c address, an initial HDR class and
    /// a requested link frequency in Hz. The initial mode is the first
    /// catalog entry of the requested HDR class; a link frequency outside
    /// the supported set is a configuration error.
    pub fn new(
        i2c: I2C,
        address: u8,
        power: PWR,
        hdr: HdrMode,
        link_freq_hz: u64,
    ) -> Result<Self, Error<CommE, PowerE>> {
        let link_freq = LinkFrequency::from_hz(link_freq_hz)
            .ok_or(Error::UnsupportedLinkFrequency)?;
        let mode = modes::initial_mode(hdr);
        let mut dev = Self {
            base_address: address,
            i2c,
            power,
            mode,
            link_freq,
            long_exp_shift: 0,
            common_regs_written: false,
            streaming: false,
            powered: false,
            ctrl: ControlValues::new(mode.vblank_default),
            exposure_range: ControlRange::fixed(0),
            vblank_range: ControlRange::fixed(0),
        };
        dev.apply_framing_limits();
        Ok(dev)
    }

    /// May use DEFAULT_I2C_ADDRESS, a non-HDR initial mode and the nominal
    /// 450MHz link frequency if in doubt.
    pub fn default(i2c: I2C, power: PWR) -> Result<Self, Error<CommE, PowerE>> {
        Self::new(
            i2c,
            crate::DEFAULT_I2C_ADDRESS,
            power,
            HdrMode::None,
            450_000_000,
        )
    }

    /// Tear down: stop streaming and drop power if still active, then
    /// release the transport and power collaborators.
    pub fn shutdown(mut self) -> (I2C, PWR) {
        let _ = self.power_off();
        (self.i2c, self.power)
    }

    // --- register access ---

    /// Read a 1..=4 byte register value, big-endian, right-aligned.
    fn read_reg(&mut self, reg: u16, len: usize) -> Result<u32, Error<CommE, PowerE>> {
        if len < 1 || len > 4 {
            return Err(Error::InvalidRegisterLength);
        }
        let addr_buf = reg.to_be_bytes();
        let mut data_buf = [0u8; 4];
        self.i2c
            .write_read(self.base_address, &addr_buf, &mut data_buf[4 - len..])
            .map_err(Error::Comm)?;
        Ok(u32::from_be_bytes(data_buf))
    }

    /// Write a 1..=4 byte register value as one transfer: 2 address bytes
    /// followed by the value bytes, big-endian.
    fn write_reg(
        &mut self,
        reg: u16,
        len: usize,
        val: u32,
    ) -> Result<(), Error<CommE, PowerE>> {
        if len < 1 || len > 4 {
            return Err(Error::InvalidRegisterLength);
        }
        let mut buf = [0u8; 6];
        buf[..2].copy_from_slice(&reg.to_be_bytes());
        buf[2..].copy_from_slice(&(val << (8 * (4 - len))).to_be_bytes());
        self.i2c
            .write(self.base_address, &buf[..2 + len])
            .map_err(Error::Comm)
    }

    /// Read a u8 from a 16-bit address
    fn read_reg_u8(&mut self, reg: Register) -> Result<u8, Error<CommE, PowerE>> {
        Ok(self.read_reg(reg as u16, 1)? as u8)
    }

    /// Read a u16 from a 16-bit address
    fn read_reg_u16(&mut self, reg: Register) -> Result<u16, Error<CommE, PowerE>> {
        Ok(self.read_reg(reg as u16, 2)? as u16)
    }

    /// Write a u8 to a 16-bit address
    fn write_reg_u8(&mut self, reg: Register, val: u8) -> Result<(), Error<CommE, PowerE>> {
        self.write_reg(reg as u16, 1, val as u32)
    }

    /// Write a u16 to a 16-bit address
    fn write_reg_u16(&mut self, reg: Register, val: u16) -> Result<(), Error<CommE, PowerE>> {
        self.write_reg(reg as u16, 2, val as u32)
    }

    /// Replay a register program in order; the first failed write aborts
    /// and leaves the device partially programmed.
    fn write_reg_program(
        &mut self,
        ops: &[RegisterOp],
    ) -> Result<(), Error<CommE, PowerE>> {
        for op in ops {
            if let Err(e) = self.write_reg(op.address, 1, op.value as u32) {
                #[cfg(feature = "rttdebug")]
                rprintln!("imx708-i2c reg 0x{:04x} write failed", op.address);
                return Err(e);
            }
        }
        Ok(())
    }

    // --- identification ---

    /// Verify the chip ID and read the module variant word. The sensor
    /// must be powered.
    pub fn identify(&mut self) -> Result<ModuleInfo, Error<CommE, PowerE>> {
        if !self.powered {
            return Err(Error::PoweredOff);
        }
        let found = self.read_reg_u16(Register::ChipId)?;
        if found != CHIP_ID {
            return Err(Error::ChipId {
                expected: CHIP_ID,
                found,
            });
        }
        let module = self.read_reg_u16(Register::ModuleId)?;
        Ok(ModuleInfo {
            wide_angle: module & MODULE_ID_WIDE != 0,
            noir: module & MODULE_ID_NOIR != 0,
        })
    }

    // --- power ---

    pub fn power_on(&mut self) -> Result<(), Error<CommE, PowerE>> {
        if self.powered {
            return Ok(());
        }
        self.power.power_on().map_err(Error::Power)?;
        self.powered = true;
        #[cfg(feature = "rttdebug")]
        rprintln!("imx708-i2c power on");
        Ok(())
    }

    /// Drop power, stopping the stream first if needed. The next stream
    /// start reprograms the common registers from scratch.
    pub fn power_off(&mut self) -> Result<(), Error<CommE, PowerE>> {
        if !self.powered {
            return Ok(());
        }
        if self.streaming {
            // The device is about to lose power anyway; a failed standby
            // write is not worth failing the whole power-down for.
            let _ = self.stop_streaming();
        }
        self.power.power_off().map_err(Error::Power)?;
        self.powered = false;
        self.common_regs_written = false;
        #[cfg(feature = "rttdebug")]
        rprintln!("imx708-i2c power off");
        Ok(())
    }

    // --- mode and format handling ---

    /// Which catalog mode a format request would resolve to, without
    /// changing anything.
    pub fn negotiate_format(
        &self,
        code: MbusCode,
        width: u32,
        height: u32,
    ) -> Result<(MbusCode, u32, u32), Error<CommE, PowerE>> {
        let mode = modes::find_best_fit(code, width, height).ok_or(Error::ModeNotFound)?;
        Ok((mode.code, mode.width, mode.height))
    }

    /// Commit a format request: switch the active mode to the best fit and
    /// reset the framing limits. Not allowed while streaming.
    pub fn set_format(
        &mut self,
        code: MbusCode,
        width: u32,
        height: u32,
    ) -> Result<(MbusCode, u32, u32), Error<CommE, PowerE>> {
        if self.streaming {
            return Err(Error::Busy);
        }
        let mode = modes::find_best_fit(code, width, height).ok_or(Error::ModeNotFound)?;
        self.mode = mode;
        self.apply_framing_limits();
        Ok((mode.code, mode.width, mode.height))
    }

    /// Switch HDR class at the current frame size. Fails without touching
    /// the active mode if the catalog has no matching entry.
    pub fn set_hdr_mode(&mut self, hdr: HdrMode) -> Result<(), Error<CommE, PowerE>> {
        if self.streaming {
            return Err(Error::Busy);
        }
        let mode = modes::select_by_hdr(self.mode.width, self.mode.height, hdr)
            .ok_or(Error::ModeNotFound)?;
        self.mode = mode;
        self.apply_framing_limits();
        Ok(())
    }

    pub fn active_mode(&self) -> &'static Mode {
        self.mode
    }

    /// Reset the mode-dependent control limits: pixel rate and hblank are
    /// pinned by the mode, vblank returns to the mode default and the
    /// exposure ceiling follows it.
    fn apply_framing_limits(&mut self) {
        let mode = self.mode;
        self.vblank_range = ControlRange {
            min: mode.vblank_min as u64,
            max: ((1u64 << LONG_EXP_SHIFT_MAX) * FRAME_LENGTH_MAX as u64)
                - mode.height as u64,
            step: 1,
            default: mode.vblank_default as u64,
        };
        self.ctrl.vblank = mode.vblank_default;
        self.adjust_exposure_range();
    }

    /// Honour the VBLANK limits when setting exposure: recompute the legal
    /// exposure maximum and pull the configured value under it. Must run
    /// whenever vblank changes, before any exposure value is applied.
    fn adjust_exposure_range(&mut self) {
        let exposure_max =
            (self.mode.height + self.ctrl.vblank - EXPOSURE_OFFSET) as u64;
        if self.ctrl.exposure as u64 > exposure_max {
            self.ctrl.exposure = exposure_max as u32;
        }
        self.exposure_range = ControlRange {
            min: EXPOSURE_MIN as u64,
            max: exposure_max,
            step: 1,
            default: self.ctrl.exposure as u64,
        };
    }

    /// Current legal range of a control. Mode changes and vblank updates
    /// move the dynamic ones, so callers re-read after those.
    pub fn control_range(&self, id: ControlId) -> ControlRange {
        match id {
            ControlId::Exposure => self.exposure_range,
            ControlId::VBlank => self.vblank_range,
            ControlId::AnalogGain => ANALOG_GAIN_RANGE,
            ControlId::DigitalGain => DIGITAL_GAIN_RANGE,
            ControlId::HorizontalFlip | ControlId::VerticalFlip => FLIP_RANGE,
            ControlId::TestPattern => ControlRange {
                min: 0,
                max: 4,
                step: 1,
                default: 0,
            },
            ControlId::TestPatternRed
            | ControlId::TestPatternGreenR
            | ControlId::TestPatternBlue
            | ControlId::TestPatternGreenB => TEST_PATTERN_COLOUR_RANGE,
            ControlId::RedBalance | ControlId::BlueBalance => COLOUR_BALANCE_RANGE,
            ControlId::HBlank => {
                ControlRange::fixed((self.mode.line_length_pix - self.mode.width) as u64)
            }
            ControlId::PixelRate => ControlRange::fixed(self.mode.pixel_rate),
            ControlId::LinkFreq => ControlRange::fixed(self.link_freq.hz()),
        }
    }

    pub fn control_values(&self) -> &ControlValues {
        &self.ctrl
    }

    // --- exposure / gain / timing ---

    /// Program the exposure register from the recorded value: clamp to the
    /// mode minimum, align down to the mode step, then scale by the long
    /// exposure factor. In HDR mode this sets the longest exposure; the
    /// sensor divides the medium and short ones by 4 and 16 itself.
    fn apply_exposure(&mut self) -> Result<(), Error<CommE, PowerE>> {
        let mut val = self.ctrl.exposure.max(self.mode.exposure_lines_min);
        val -= val % self.mode.exposure_lines_step;
        self.write_reg_u16(Register::Exposure, (val >> self.long_exp_shift) as u16)
    }

    /// In HDR mode this sets the gain for the longest exposure; by default
    /// the sensor uses the same gain for all three.
    fn apply_analog_gain(&mut self) -> Result<(), Error<CommE, PowerE>> {
        self.write_reg_u16(Register::AnalogGain, self.ctrl.analog_gain as u16)
    }

    /// Program the frame length, deriving the smallest long-exposure shift
    /// that brings the line count into the 16-bit register range.
    fn set_frame_length(&mut self, total_lines: u32) -> Result<(), Error<CommE, PowerE>> {
        let mut shift = 0u8;
        let mut val = total_lines;
        while val > FRAME_LENGTH_MAX {
            shift += 1;
            val >>= 1;
        }
        self.long_exp_shift = shift;
        self.write_reg_u16(Register::FrameLength, val as u16)?;
        self.write_reg_u8(Register::LongExpShift, shift)
    }

    fn apply_orientation(&mut self) -> Result<(), Error<CommE, PowerE>> {
        let val = self.ctrl.hflip as u8 | (self.ctrl.vflip as u8) << 1;
        self.write_reg_u8(Register::Orientation, val)
    }

    // --- control surface ---

    /// Record a control value, and program it into the sensor when power
    /// is up. Without power the value is only recorded and takes effect on
    /// the next stream start.
    pub fn set_control(
        &mut self,
        id: ControlId,
        value: u32,
    ) -> Result<(), Error<CommE, PowerE>> {
        if id.is_read_only() {
            return Err(Error::UnsupportedControl);
        }
        // vflip/hflip cannot change during streaming
        if self.streaming
            && matches!(id, ControlId::HorizontalFlip | ControlId::VerticalFlip)
        {
            return Err(Error::Busy);
        }
        match id {
            ControlId::Exposure => {
                let max = self.exposure_range.max as u32;
                self.ctrl.exposure = value.min(max).max(EXPOSURE_MIN);
            }
            ControlId::AnalogGain => self.ctrl.analog_gain = value,
            ControlId::DigitalGain => self.ctrl.digital_gain = value,
            ControlId::HorizontalFlip => self.ctrl.hflip = value != 0,
            ControlId::VerticalFlip => self.ctrl.vflip = value != 0,
            ControlId::TestPattern => {
                self.ctrl.test_pattern =
                    TestPattern::from_index(value).ok_or(Error::UnsupportedControl)?;
            }
            ControlId::TestPatternRed => self.ctrl.test_pattern_colours[0] = value,
            ControlId::TestPatternGreenR => self.ctrl.test_pattern_colours[1] = value,
            ControlId::TestPatternBlue => self.ctrl.test_pattern_colours[2] = value,
            ControlId::TestPatternGreenB => self.ctrl.test_pattern_colours[3] = value,
            ControlId::RedBalance => self.ctrl.red_balance = value,
            ControlId::BlueBalance => self.ctrl.blue_balance = value,
            ControlId::VBlank => {
                let min = self.vblank_range.min as u32;
                let max = self.vblank_range.max as u32;
                self.ctrl.vblank = value.min(max).max(min);
                // The VBLANK control may change the limits of usable
                // exposure, so check and adjust before anything is applied.
                self.adjust_exposure_range();
            }
            ControlId::HBlank | ControlId::PixelRate | ControlId::LinkFreq => {
                return Err(Error::UnsupportedControl)
            }
        }
        // Applying control values only happens when power is up
        if !self.powered {
            return Ok(());
        }
        self.apply_control(id)
    }

    fn apply_control(&mut self, id: ControlId) -> Result<(), Error<CommE, PowerE>> {
        match id {
            ControlId::Exposure => self.apply_exposure(),
            ControlId::AnalogGain => self.apply_analog_gain(),
            ControlId::DigitalGain => {
                self.write_reg_u16(Register::DigitalGain, self.ctrl.digital_gain as u16)
            }
            ControlId::TestPattern => self.write_reg_u16(
                Register::TestPattern,
                self.ctrl.test_pattern.reg_value() as u16,
            ),
            ControlId::TestPatternRed => self.write_reg_u16(
                Register::TestPatternRed,
                self.ctrl.test_pattern_colours[0] as u16,
            ),
            ControlId::TestPatternGreenR => self.write_reg_u16(
                Register::TestPatternGreenR,
                self.ctrl.test_pattern_colours[1] as u16,
            ),
            ControlId::TestPatternBlue => self.write_reg_u16(
                Register::TestPatternBlue,
                self.ctrl.test_pattern_colours[2] as u16,
            ),
            ControlId::TestPatternGreenB => self.write_reg_u16(
                Register::TestPatternGreenB,
                self.ctrl.test_pattern_colours[3] as u16,
            ),
            ControlId::RedBalance => {
                self.write_reg_u16(Register::ColourBalanceRed, self.ctrl.red_balance as u16)
            }
            ControlId::BlueBalance => self.write_reg_u16(
                Register::ColourBalanceBlue,
                self.ctrl.blue_balance as u16,
            ),
            ControlId::HorizontalFlip | ControlId::VerticalFlip => self.apply_orientation(),
            ControlId::VBlank => {
                self.set_frame_length(self.mode.height + self.ctrl.vblank)
            }
            ControlId::HBlank | ControlId::PixelRate | ControlId::LinkFreq => {
                Err(Error::UnsupportedControl)
            }
        }
    }

    /// Push every recorded control value to the sensor. vblank goes first:
    /// it fixes the long-exposure shift the exposure write depends on.
    fn replay_controls(&mut self) -> Result<(), Error<CommE, PowerE>> {
        self.adjust_exposure_range();
        self.set_frame_length(self.mode.height + self.ctrl.vblank)?;
        self.apply_exposure()?;
        self.apply_analog_gain()?;
        self.write_reg_u16(Register::DigitalGain, self.ctrl.digital_gain as u16)?;
        self.apply_orientation()?;
        self.write_reg_u16(
            Register::TestPattern,
            self.ctrl.test_pattern.reg_value() as u16,
        )?;
        self.write_reg_u16(
            Register::TestPatternRed,
            self.ctrl.test_pattern_colours[0] as u16,
        )?;
        self.write_reg_u16(
            Register::TestPatternGreenR,
            self.ctrl.test_pattern_colours[1] as u16,
        )?;
        self.write_reg_u16(
            Register::TestPatternBlue,
            self.ctrl.test_pattern_colours[2] as u16,
        )?;
        self.write_reg_u16(
            Register::TestPatternGreenB,
            self.ctrl.test_pattern_colours[3] as u16,
        )?;
        self.write_reg_u16(Register::ColourBalanceRed, self.ctrl.red_balance as u16)?;
        self.write_reg_u16(Register::ColourBalanceBlue, self.ctrl.blue_balance as u16)
    }

    // --- PDAF correction patch ---

    /// Whether the per-pixel correction gains are still at their factory
    /// sentinel and need patching.
    fn spc_gains_unpatched(&mut self) -> Result<bool, Error<CommE, PowerE>> {
        Ok(self.read_reg(Register::BaseSpcGainsL as u16, 1)? == SPC_GAINS_UNPATCHED)
    }

    /// Write the left and right 54-entry correction tables, each repeating
    /// its 9-entry gain pattern.
    fn write_spc_gain_tables(&mut self) -> Result<(), Error<CommE, PowerE>> {
        for i in 0..PDAF_TABLE_LEN {
            self.write_reg(
                Register::BaseSpcGainsL as u16 + i,
                1,
                PDAF_GAINS_L[(i % 9) as usize] as u32,
            )?;
        }
        for i in 0..PDAF_TABLE_LEN {
            self.write_reg(
                Register::BaseSpcGainsR as u16 + i,
                1,
                PDAF_GAINS_R[(i % 9) as usize] as u32,
            )?;
        }
        Ok(())
    }

    // --- streaming ---

    /// Take the sensor from standby to streaming: common registers once
    /// per power cycle (with the PDAF patch when the probe says so), then
    /// the mode program, the link frequency program, the recorded control
    /// values, and finally the stream-on write. Any failure aborts and the
    /// sensor stays in standby. A no-op when already streaming.
    pub fn start_streaming(&mut self) -> Result<(), Error<CommE, PowerE>> {
        if self.streaming {
            return Ok(());
        }
        if !self.powered {
            return Err(Error::PoweredOff);
        }
        #[cfg(feature = "rttdebug")]
        rprintln!("imx708-i2c stream start");

        if !self.common_regs_written {
            self.write_reg_program(MODE_COMMON_REGS)?;
            if self.spc_gains_unpatched()? {
                self.write_spc_gain_tables()?;
            }
            self.common_regs_written = true;
        }

        // Apply default values of the current mode
        self.write_reg_program(self.mode.reg_list)?;

        // Update the link frequency registers
        self.write_reg_program(self.link_freq.reg_list())?;

        // Apply customized values from the user
        self.replay_controls()?;

        self.write_reg_u8(Register::ModeSelect, MODE_STREAMING)?;
        self.streaming = true;
        #[cfg(feature = "rttdebug")]
        rprintln!("imx708-i2c streaming");
        Ok(())
    }

    /// Return the sensor to software standby. The recorded state becomes
    /// standby even when the write fails; the error is still surfaced.
    pub fn stop_streaming(&mut self) -> Result<(), Error<CommE, PowerE>> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        #[cfg(feature = "rttdebug")]
        rprintln!("imx708-i2c stream stop");
        self.write_reg_u8(Register::ModeSelect, MODE_STANDBY)
    }

    /// System-sleep entry: quiesce the sensor but keep the streaming
    /// intent so `resume` can pick it back up.
    pub fn suspend(&mut self) -> Result<(), Error<CommE, PowerE>> {
        if self.streaming {
            return self.write_reg_u8(Register::ModeSelect, MODE_STANDBY);
        }
        Ok(())
    }

    /// System-sleep exit: restart the stream if it was running at suspend
    /// time. A failed restart forces standby and surfaces the error, so
    /// the recorded state never disagrees with the device.
    pub fn resume(&mut self) -> Result<(), Error<CommE, PowerE>> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        if let Err(e) = self.start_streaming() {
            let _ = self.write_reg_u8(Register::ModeSelect, MODE_STANDBY);
            self.streaming = false;
            return Err(e);
        }
        Ok(())
    }

    // --- state accessors ---

    /// Recorded streaming intent; stays set across `suspend`.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Whether the once-per-power-cycle register setup has been done.
    pub fn common_regs_written(&self) -> bool {
        self.common_regs_written
    }

    pub fn long_exp_shift(&self) -> u8 {
        self.long_exp_shift
    }

    pub fn link_frequency(&self) -> LinkFrequency {
        self.link_freq
    }

    /// Direct access to the transport, for test harnesses.
    pub fn transport_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockError, MockPower};
    use crate::{Error, DEFAULT_I2C_ADDRESS};

    const REG_MODE_SELECT: u16 = 0x0100;
    const REG_EXPOSURE: u16 = 0x0202;
    const REG_ANALOG_GAIN: u16 = 0x0204;
    const REG_FRAME_LENGTH: u16 = 0x0340;
    const REG_LONG_EXP_SHIFT: u16 = 0x3100;
    const REG_SPC_L: u16 = 0x7b10;
    const REG_SPC_R: u16 = 0x7c00;
    // Distinctive addresses: 0x0136 only appears in the common program,
    // 0x0342 leads every mode program, 0x030e leads the link programs.
    const COMMON_ONLY_REG: u16 = 0x0136;
    const MODE_FIRST_REG: u16 = 0x0342;
    const LINK_FIRST_REG: u16 = 0x030e;

    fn factory_fresh_bus() -> MockBus {
        let mut bus = MockBus::new();
        // chip ID and unpatched PDAF sentinel, as a real sensor resets to
        bus.set_reg(0x0016, 0x07);
        bus.set_reg(0x0017, 0x08);
        bus.set_reg(REG_SPC_L, 0x40);
        bus
    }

    fn sensor() -> Imx708<MockBus, MockPower> {
        Imx708::new(
            factory_fresh_bus(),
            DEFAULT_I2C_ADDRESS,
            MockPower::new(),
            HdrMode::None,
            450_000_000,
        )
        .unwrap()
    }

    fn streaming_sensor() -> Imx708<MockBus, MockPower> {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.start_streaming().unwrap();
        dev
    }

    #[test]
    fn rejects_unsupported_link_frequency() {
        let res = Imx708::new(
            factory_fresh_bus(),
            DEFAULT_I2C_ADDRESS,
            MockPower::new(),
            HdrMode::None,
            400_000_000,
        );
        assert!(matches!(res, Err(Error::UnsupportedLinkFrequency)));
    }

    #[test]
    fn default_uses_nominal_link_frequency() {
        let dev = Imx708::default(factory_fresh_bus(), MockPower::new()).unwrap();
        assert_eq!(dev.link_frequency(), LinkFrequency::Mhz450);
        assert_eq!(dev.active_mode().hdr, HdrMode::None);
    }

    #[test]
    fn initial_mode_follows_hdr_request() {
        let dev = Imx708::new(
            factory_fresh_bus(),
            DEFAULT_I2C_ADDRESS,
            MockPower::new(),
            HdrMode::X3,
            450_000_000,
        )
        .unwrap();
        assert_eq!(dev.active_mode().hdr, HdrMode::X3);
        assert_eq!(dev.active_mode().width, 1920);
    }

    #[test]
    fn identify_reads_chip_and_module_ids() {
        let mut dev = sensor();
        assert!(matches!(dev.identify(), Err(Error::PoweredOff)));
        dev.power_on().unwrap();
        let info = dev.identify().unwrap();
        assert!(!info.wide_angle);
        assert!(!info.noir);

        dev.transport_mut().set_reg(0x0001, 0x82);
        let info = dev.identify().unwrap();
        assert!(info.wide_angle);
        assert!(info.noir);
    }

    #[test]
    fn identify_rejects_wrong_chip_id() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.transport_mut().set_reg(0x0017, 0x09);
        match dev.identify() {
            Err(Error::ChipId { expected, found }) => {
                assert_eq!(expected, 0x0708);
                assert_eq!(found, 0x0709);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn power_failure_propagates() {
        let mut dev = sensor();
        dev.power.fail_next = true;
        assert!(matches!(dev.power_on(), Err(Error::Power(_))));
        assert!(!dev.is_powered());
        dev.power_on().unwrap();
        assert!(dev.is_powered());
    }

    #[test]
    fn exposure_clamps_to_mode_minimum() {
        // Full-res mode: exposure_lines_min 8, step 1
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.set_control(ControlId::Exposure, 5).unwrap();
        assert_eq!(dev.transport_mut().reg_u16(REG_EXPOSURE), 8);
    }

    #[test]
    fn exposure_aligns_down_to_mode_step() {
        let mut dev = sensor();
        dev.set_format(MbusCode::SRGGB10_1X10, 1920, 1080).unwrap();
        dev.set_hdr_mode(HdrMode::X3).unwrap();
        assert_eq!(dev.active_mode().exposure_lines_min, 128);
        dev.power_on().unwrap();
        // 130 is above the minimum but not a multiple of step 32
        dev.set_control(ControlId::Exposure, 130).unwrap();
        assert_eq!(dev.transport_mut().reg_u16(REG_EXPOSURE), 128);
    }

    #[test]
    fn frame_length_beyond_16bit_derives_shift() {
        // Full-res mode height is 2592; 128479 lines of vblank makes the
        // total frame length 131071, one past what a single shift covers
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.set_control(ControlId::VBlank, 128479).unwrap();
        assert_eq!(dev.long_exp_shift(), 1);
        assert_eq!(dev.transport_mut().reg_u16(REG_FRAME_LENGTH), 65535);
        assert_eq!(dev.transport_mut().reg(REG_LONG_EXP_SHIFT), 1);
    }

    #[test]
    fn frame_length_shift_is_minimal() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        let height = dev.active_mode().height;
        // shift increases exactly when total > 0xffff << shift
        for &(total, want_shift) in &[
            (0xffffu32, 0u8),
            (0x10000, 1),
            (0x1ffff, 1),
            (0x20000, 2),
            (0x3fffc, 2),
        ] {
            dev.set_control(ControlId::VBlank, total - height).unwrap();
            assert_eq!(dev.long_exp_shift(), want_shift, "total {}", total);
            let reg = dev.transport_mut().reg_u16(REG_FRAME_LENGTH) as u32;
            assert!(reg <= 0xffff);
            assert_eq!(reg, total >> want_shift);
            // the reconstructed length never exceeds the request
            assert!((reg << want_shift) <= total);
        }
    }

    #[test]
    fn exposure_write_scales_by_long_exp_shift() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.set_control(ControlId::VBlank, 128479).unwrap();
        assert_eq!(dev.long_exp_shift(), 1);
        dev.set_control(ControlId::Exposure, 1001).unwrap();
        assert_eq!(dev.transport_mut().reg_u16(REG_EXPOSURE), 500);
    }

    #[test]
    fn vblank_tightens_exposure_range() {
        let mut dev = sensor();
        dev.set_format(MbusCode::SRGGB10_1X10, 1920, 1080).unwrap();
        dev.set_control(ControlId::VBlank, 40).unwrap();
        let range = dev.control_range(ControlId::Exposure);
        assert_eq!(range.max, (1080 + 40 - 48) as u64);
        // a request above the new maximum clamps to it, not the old one
        dev.set_control(ControlId::Exposure, 5000).unwrap();
        assert_eq!(dev.control_values().exposure, 1072);
        assert_eq!(dev.control_range(ControlId::Exposure).default, 1072);
    }

    #[test]
    fn vblank_change_clamps_configured_exposure() {
        let mut dev = sensor();
        dev.set_format(MbusCode::SRGGB10_1X10, 1920, 1080).unwrap();
        dev.set_control(ControlId::Exposure, 2000).unwrap();
        assert_eq!(dev.control_values().exposure, 2000);
        dev.set_control(ControlId::VBlank, 40).unwrap();
        assert_eq!(dev.control_values().exposure, 1072);
    }

    #[test]
    fn framing_limits_follow_mode() {
        let mut dev = sensor();
        dev.set_format(MbusCode::SRGGB10_1X10, 1920, 1080).unwrap();
        let rate = dev.control_range(ControlId::PixelRate);
        assert_eq!((rate.min, rate.max, rate.default), (585_600_000, 585_600_000, 585_600_000));
        let hblank = dev.control_range(ControlId::HBlank);
        assert_eq!(hblank.min, (0x1e90 - 1920) as u64);
        assert_eq!(hblank.min, hblank.max);
        let vblank = dev.control_range(ControlId::VBlank);
        assert_eq!(vblank.min, 40);
        assert_eq!(vblank.max, (128 * 0xffffu64) - 1080);
        assert_eq!(vblank.default, 1198);
        assert_eq!(dev.control_values().vblank, 1198);
    }

    #[test]
    fn negotiate_format_has_no_side_effects() {
        let dev = sensor();
        let (code, w, h) = dev
            .negotiate_format(MbusCode::SRGGB10_1X10, 1600, 900)
            .unwrap();
        assert_eq!((code, w, h), (MbusCode::SRGGB10_1X10, 1536, 864));
        assert_eq!(dev.active_mode().width, 4608);
    }

    #[test]
    fn format_mismatch_is_an_error() {
        let mut dev = sensor();
        let res = dev.set_format(MbusCode(0x3012), 1920, 1080);
        assert!(matches!(res, Err(Error::ModeNotFound)));
        assert_eq!(dev.active_mode().width, 4608);
    }

    #[test]
    fn hdr_switch_requires_matching_resolution() {
        let mut dev = sensor();
        // full resolution has no HDR counterpart
        assert!(matches!(dev.set_hdr_mode(HdrMode::X3), Err(Error::ModeNotFound)));
        assert_eq!(dev.active_mode().width, 4608);

        dev.set_format(MbusCode::SRGGB10_1X10, 1920, 1080).unwrap();
        dev.set_hdr_mode(HdrMode::X3).unwrap();
        assert_eq!(dev.active_mode().hdr, HdrMode::X3);
        dev.set_hdr_mode(HdrMode::None).unwrap();
        assert_eq!(dev.active_mode().hdr, HdrMode::None);
    }

    #[test]
    fn start_requires_power() {
        let mut dev = sensor();
        assert!(matches!(dev.start_streaming(), Err(Error::PoweredOff)));
    }

    #[test]
    fn start_programs_in_order_and_ends_with_stream_on() {
        let mut dev = streaming_sensor();
        let bus = dev.transport_mut();
        // the common program leads, stream-on closes
        assert_eq!(bus.log()[0], (0x0100, 0x00));
        assert_eq!(bus.log().last().copied(), Some((0x0100, 0x01)));
        assert_eq!(bus.write_count(COMMON_ONLY_REG), 1);
        assert_eq!(bus.write_count(MODE_FIRST_REG), 1);
        assert_eq!(bus.write_count(LINK_FIRST_REG), 1);
        // 450MHz PLL selection
        assert_eq!(bus.reg(0x030f), 0x2c);
        assert!(dev.is_streaming());
    }

    #[test]
    fn start_patches_pdaf_tables_from_periodic_pattern() {
        let mut dev = streaming_sensor();
        let bus = dev.transport_mut();
        assert_eq!(bus.reg(REG_SPC_L), 0x4c);
        assert_eq!(bus.reg(REG_SPC_L + 3), 0x46);
        assert_eq!(bus.reg(REG_SPC_L + 9), 0x4c);
        assert_eq!(bus.reg(REG_SPC_L + 53), 0x35);
        assert_eq!(bus.reg(REG_SPC_R), 0x35);
        assert_eq!(bus.reg(REG_SPC_R + 53), 0x4c);
        assert_eq!(bus.write_count(REG_SPC_L + 53), 1);
        assert_eq!(bus.write_count(REG_SPC_R + 53), 1);
    }

    #[test]
    fn pdaf_patch_skipped_when_already_programmed() {
        let mut bus = factory_fresh_bus();
        bus.set_reg(REG_SPC_L, 0x4c);
        let mut dev = Imx708::new(
            bus,
            DEFAULT_I2C_ADDRESS,
            MockPower::new(),
            HdrMode::None,
            450_000_000,
        )
        .unwrap();
        dev.power_on().unwrap();
        dev.start_streaming().unwrap();
        assert_eq!(dev.transport_mut().write_count(REG_SPC_L), 0);
        assert_eq!(dev.transport_mut().write_count(REG_SPC_R), 0);
    }

    #[test]
    fn start_is_idempotent_while_streaming() {
        let mut dev = streaming_sensor();
        let writes_after_first = dev.transport_mut().log().len();
        dev.start_streaming().unwrap();
        assert_eq!(dev.transport_mut().log().len(), writes_after_first);
    }

    #[test]
    fn failed_mode_program_keeps_common_regs_and_retries_without_them() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.transport_mut().fail_on_write(MODE_FIRST_REG);
        assert!(matches!(
            dev.start_streaming(),
            Err(Error::Comm(MockError::Fault(MODE_FIRST_REG)))
        ));
        // the common step already succeeded, so the flag sticks
        assert!(dev.common_regs_written());
        assert!(!dev.is_streaming());

        dev.transport_mut().clear_fault();
        dev.start_streaming().unwrap();
        // the retry went straight to mode programming
        assert_eq!(dev.transport_mut().write_count(COMMON_ONLY_REG), 1);
        assert!(dev.is_streaming());
    }

    #[test]
    fn failed_common_program_is_rewritten_on_retry() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.transport_mut().fail_on_write(0x33f0);
        assert!(dev.start_streaming().is_err());
        assert!(!dev.common_regs_written());

        dev.transport_mut().clear_fault();
        dev.start_streaming().unwrap();
        assert_eq!(dev.transport_mut().write_count(COMMON_ONLY_REG), 2);
    }

    #[test]
    fn failed_pdaf_patch_forces_full_reprogram() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        // fault inside the left correction table
        dev.transport_mut().fail_on_write(REG_SPC_L + 16);
        assert!(dev.start_streaming().is_err());
        assert!(!dev.common_regs_written());
        assert!(!dev.is_streaming());
    }

    #[test]
    fn power_cycle_forces_common_reprogram() {
        let mut dev = streaming_sensor();
        dev.stop_streaming().unwrap();
        dev.power_off().unwrap();
        assert!(!dev.common_regs_written());

        dev.power_on().unwrap();
        // losing power resets the sensor, PDAF sentinel included
        dev.transport_mut().set_reg(REG_SPC_L, 0x40);
        dev.start_streaming().unwrap();
        assert_eq!(dev.transport_mut().write_count(COMMON_ONLY_REG), 2);
        assert_eq!(dev.transport_mut().write_count(REG_SPC_L + 1), 2);
    }

    #[test]
    fn stop_goes_standby_even_when_the_write_fails() {
        let mut dev = streaming_sensor();
        dev.transport_mut().fail_on_write(REG_MODE_SELECT);
        assert!(matches!(dev.stop_streaming(), Err(Error::Comm(_))));
        assert!(!dev.is_streaming());
    }

    #[test]
    fn controls_recorded_unpowered_and_replayed_on_start() {
        let mut dev = sensor();
        dev.set_control(ControlId::AnalogGain, 300).unwrap();
        dev.set_control(ControlId::DigitalGain, 0x0200).unwrap();
        dev.set_control(ControlId::HorizontalFlip, 1).unwrap();
        dev.set_control(ControlId::VerticalFlip, 1).unwrap();
        dev.set_control(ControlId::TestPattern, 1).unwrap();
        dev.set_control(ControlId::TestPatternRed, 0x0123).unwrap();
        dev.set_control(ControlId::RedBalance, 0x01aa).unwrap();
        dev.set_control(ControlId::BlueBalance, 0x0155).unwrap();
        // nothing reached the bus yet
        assert!(dev.transport_mut().log().is_empty());

        dev.power_on().unwrap();
        dev.start_streaming().unwrap();
        let bus = dev.transport_mut();
        assert_eq!(bus.reg_u16(REG_ANALOG_GAIN), 300);
        assert_eq!(bus.reg_u16(0x020e), 0x0200);
        assert_eq!(bus.reg(0x0101), 0b11);
        // ColorBars is menu index 1 but register value 2
        assert_eq!(bus.reg_u16(0x0600), 2);
        assert_eq!(bus.reg_u16(0x0602), 0x0123);
        assert_eq!(bus.reg_u16(0x0b90), 0x01aa);
        assert_eq!(bus.reg_u16(0x0b92), 0x0155);
    }

    #[test]
    fn register_writes_are_big_endian() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.transport_mut().clear_log();
        dev.set_control(ControlId::AnalogGain, 0x0123).unwrap();
        assert_eq!(dev.transport_mut().log(), &[(0x0204, 0x01), (0x0205, 0x23)]);
    }

    #[test]
    fn flips_and_reconfiguration_frozen_while_streaming() {
        let mut dev = streaming_sensor();
        assert!(matches!(
            dev.set_control(ControlId::HorizontalFlip, 1),
            Err(Error::Busy)
        ));
        assert!(matches!(
            dev.set_control(ControlId::VerticalFlip, 1),
            Err(Error::Busy)
        ));
        assert!(matches!(
            dev.set_format(MbusCode::SRGGB10_1X10, 1920, 1080),
            Err(Error::Busy)
        ));
        assert!(matches!(dev.set_hdr_mode(HdrMode::X3), Err(Error::Busy)));

        dev.stop_streaming().unwrap();
        dev.set_control(ControlId::HorizontalFlip, 1).unwrap();
    }

    #[test]
    fn read_only_and_unknown_controls_are_rejected() {
        let mut dev = sensor();
        for id in [ControlId::HBlank, ControlId::PixelRate, ControlId::LinkFreq] {
            assert!(matches!(
                dev.set_control(id, 1),
                Err(Error::UnsupportedControl)
            ));
        }
        assert!(matches!(
            dev.set_control(ControlId::TestPattern, 9),
            Err(Error::UnsupportedControl)
        ));
    }

    #[test]
    fn suspend_keeps_streaming_intent() {
        let mut dev = streaming_sensor();
        dev.suspend().unwrap();
        assert_eq!(dev.transport_mut().reg(REG_MODE_SELECT), 0x00);
        assert!(dev.is_streaming());

        dev.resume().unwrap();
        assert_eq!(dev.transport_mut().reg(REG_MODE_SELECT), 0x01);
        assert!(dev.is_streaming());
    }

    #[test]
    fn suspend_is_a_no_op_in_standby() {
        let mut dev = sensor();
        dev.power_on().unwrap();
        dev.suspend().unwrap();
        dev.resume().unwrap();
        assert!(dev.transport_mut().log().is_empty());
        assert!(!dev.is_streaming());
    }

    #[test]
    fn failed_resume_forces_standby() {
        let mut dev = streaming_sensor();
        dev.suspend().unwrap();
        dev.transport_mut().fail_on_write(LINK_FIRST_REG);
        assert!(dev.resume().is_err());
        assert!(!dev.is_streaming());
        assert_eq!(dev.transport_mut().reg(REG_MODE_SELECT), 0x00);
    }

    #[test]
    fn shutdown_stops_and_powers_off() {
        let dev = streaming_sensor();
        let (bus, power) = dev.shutdown();
        assert_eq!(bus.reg(REG_MODE_SELECT), 0x00);
        assert!(!power.is_on);
        assert_eq!(power.off_count, 1);
    }
}
