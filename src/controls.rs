//! The logical control surface: one identifier per tunable parameter,
//! with its legal range and the recorded current value. Values survive
//! power-down and are replayed when streaming starts.

use crate::registers::{
    ANA_GAIN_DEFAULT, ANA_GAIN_MAX, ANA_GAIN_MIN, COLOUR_BALANCE_DEFAULT,
    COLOUR_BALANCE_MAX, COLOUR_BALANCE_MIN, DGTL_GAIN_DEFAULT, DGTL_GAIN_MAX,
    DGTL_GAIN_MIN, EXPOSURE_DEFAULT, TEST_PATTERN_COLOUR_MAX,
};

/// Identifier for each logical control the driver exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlId {
    Exposure,
    AnalogGain,
    DigitalGain,
    HorizontalFlip,
    VerticalFlip,
    TestPattern,
    TestPatternRed,
    TestPatternGreenR,
    TestPatternBlue,
    TestPatternGreenB,
    /// Digital gain applied to the red Bayer channel only.
    RedBalance,
    /// Digital gain applied to the blue Bayer channel only.
    BlueBalance,
    VBlank,
    /// Fixed by the mode's line length; not adjustable.
    HBlank,
    /// Fixed by the active mode; not adjustable.
    PixelRate,
    /// Fixed at construction time; not adjustable.
    LinkFreq,
}

impl ControlId {
    /// Read-only controls reject `set_control`.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            ControlId::HBlank | ControlId::PixelRate | ControlId::LinkFreq
        )
    }
}

/// Legal range of one control: minimum, maximum, step and default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRange {
    pub min: u64,
    pub max: u64,
    pub step: u64,
    pub default: u64,
}

impl ControlRange {
    pub(crate) const fn fixed(value: u64) -> Self {
        ControlRange {
            min: value,
            max: value,
            step: 1,
            default: value,
        }
    }
}

pub(crate) const ANALOG_GAIN_RANGE: ControlRange = ControlRange {
    min: ANA_GAIN_MIN as u64,
    max: ANA_GAIN_MAX as u64,
    step: 1,
    default: ANA_GAIN_DEFAULT as u64,
};

pub(crate) const DIGITAL_GAIN_RANGE: ControlRange = ControlRange {
    min: DGTL_GAIN_MIN as u64,
    max: DGTL_GAIN_MAX as u64,
    step: 1,
    default: DGTL_GAIN_DEFAULT as u64,
};

pub(crate) const FLIP_RANGE: ControlRange = ControlRange {
    min: 0,
    max: 1,
    step: 1,
    default: 0,
};

pub(crate) const COLOUR_BALANCE_RANGE: ControlRange = ControlRange {
    min: COLOUR_BALANCE_MIN as u64,
    max: COLOUR_BALANCE_MAX as u64,
    step: 1,
    default: COLOUR_BALANCE_DEFAULT as u64,
};

/// The "Solid color" pattern is white by default.
pub(crate) const TEST_PATTERN_COLOUR_RANGE: ControlRange = ControlRange {
    min: 0,
    max: TEST_PATTERN_COLOUR_MAX as u64,
    step: 1,
    default: TEST_PATTERN_COLOUR_MAX as u64,
};

/// Test pattern menu, in selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TestPattern {
    Disabled,
    ColorBars,
    SolidColor,
    GreyColorBars,
    Pn9,
}

impl TestPattern {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(TestPattern::Disabled),
            1 => Some(TestPattern::ColorBars),
            2 => Some(TestPattern::SolidColor),
            3 => Some(TestPattern::GreyColorBars),
            4 => Some(TestPattern::Pn9),
            _ => None,
        }
    }

    /// Value the sensor's pattern-select register expects. The menu order
    /// does not match the register numbering.
    pub(crate) fn reg_value(self) -> u32 {
        match self {
            TestPattern::Disabled => 0,
            TestPattern::ColorBars => 2,
            TestPattern::SolidColor => 1,
            TestPattern::GreyColorBars => 3,
            TestPattern::Pn9 => 4,
        }
    }
}

/// Recorded control values, applied to the sensor whenever power is up and
/// replayed in full on every stream start.
#[derive(Debug, Clone)]
pub struct ControlValues {
    pub exposure: u32,
    pub analog_gain: u32,
    pub digital_gain: u32,
    pub hflip: bool,
    pub vflip: bool,
    pub test_pattern: TestPattern,
    /// R, GR, B, GB components of the solid-colour pattern.
    pub test_pattern_colours: [u32; 4],
    pub red_balance: u32,
    pub blue_balance: u32,
    pub vblank: u32,
}

impl ControlValues {
    pub(crate) fn new(vblank_default: u32) -> Self {
        ControlValues {
            exposure: EXPOSURE_DEFAULT,
            analog_gain: ANA_GAIN_DEFAULT,
            digital_gain: DGTL_GAIN_DEFAULT,
            hflip: false,
            vflip: false,
            test_pattern: TestPattern::Disabled,
            test_pattern_colours: [TEST_PATTERN_COLOUR_MAX; 4],
            red_balance: COLOUR_BALANCE_DEFAULT,
            blue_balance: COLOUR_BALANCE_DEFAULT,
            vblank: vblank_default,
        }
    }
}
