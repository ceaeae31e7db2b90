/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/
#![cfg_attr(not(test), no_std)]

//! Configuration driver for the Sony IMX708 image sensor
//! This imaging sensor has multiple interfaces:
//! - Two-wire i2c for configuration registers (i2c)
//! - MIPI CSI-2 pixel data out (2 lanes)
//! This driver is concerned only with the i2c interface: it selects one of
//! the sensor's discrete operating modes, programs the timing, gain and
//! exposure registers within the mode's limits (including the
//! long-exposure multiplier and the three-exposure HDR variant), and runs
//! the standby/streaming state machine. Power sequencing and the pixel
//! data path belong to the surrounding system.

pub mod controls;
pub mod mock;
pub mod modes;
pub mod registers;

mod device;

pub use controls::{ControlId, ControlRange, ControlValues, TestPattern};
pub use device::{Imx708, ModuleInfo};
pub use modes::{
    find_best_fit, select_by_hdr, Fract, HdrMode, LinkFrequency, MbusCode, Mode,
    Rect, RegisterOp, SUPPORTED_MODES,
};

/// Errors in this crate
#[derive(Debug)]
pub enum Error<CommE, PowerE> {
    /// Sensor communication error
    Comm(CommE),

    /// Power sequencing failed; register I/O must not be attempted
    Power(PowerE),

    /// Register values are 1 to 4 bytes wide
    InvalidRegisterLength,

    /// The sensor did not identify as an IMX708
    ChipId { expected: u16, found: u16 },

    /// No catalog mode matches the request; the active mode is unchanged
    ModeNotFound,

    /// Unknown control, or an attempt to set a read-only one
    UnsupportedControl,

    /// The requested link frequency is not in the supported set
    UnsupportedLinkFrequency,

    /// The operation needs the sensor powered
    PoweredOff,

    /// The requested change is frozen while streaming
    Busy,
}

/// Power, clock and reset sequencing collaborator. Implementations must
/// have satisfied the sensor's post-reset settle delay before `power_on`
/// returns, so register I/O is legal immediately afterwards.
pub trait PowerControl {
    type Error;

    fn power_on(&mut self) -> Result<(), Self::Error>;
    fn power_off(&mut self) -> Result<(), Self::Error>;
}

/// 7-bit i2c address the sensor responds on.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x1a;
