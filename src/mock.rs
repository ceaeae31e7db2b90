//! Mock transport and power collaborators for host-side testing.
//! The bus keeps a sparse register map plus an ordered log of every byte
//! written, and can be told to fail on a specific register address so
//! partial-programming paths can be exercised.

use embedded_hal::blocking::i2c::{Write, WriteRead};
use heapless::LinearMap;

use crate::PowerControl;

const REG_CAPACITY: usize = 1024;
const LOG_CAPACITY: usize = 4096;

/// Transport failure reported by the mock bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    /// Injected fault on the given register address
    Fault(u16),
    /// Bus capacity exhausted
    Overflow,
}

/// In-memory stand-in for the sensor's i2c register interface.
pub struct MockBus {
    regs: LinearMap<u16, u8, REG_CAPACITY>,
    log: heapless::Vec<(u16, u8), LOG_CAPACITY>,
    fail_on: Option<u16>,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            regs: LinearMap::new(),
            log: heapless::Vec::new(),
            fail_on: None,
        }
    }

    /// Preset a register value, as if set by the sensor itself.
    pub fn set_reg(&mut self, address: u16, value: u8) {
        let _ = self.regs.insert(address, value);
    }

    /// Current register value; unwritten registers read back as zero.
    pub fn reg(&self, address: u16) -> u8 {
        self.regs.get(&address).copied().unwrap_or(0)
    }

    /// Two consecutive registers interpreted as one big-endian word.
    pub fn reg_u16(&self, address: u16) -> u16 {
        ((self.reg(address) as u16) << 8) | self.reg(address + 1) as u16
    }

    /// Make the next write touching this address fail.
    pub fn fail_on_write(&mut self, address: u16) {
        self.fail_on = Some(address);
    }

    pub fn clear_fault(&mut self) {
        self.fail_on = None;
    }

    /// Every byte written so far, in order, as (address, value) pairs.
    pub fn log(&self) -> &[(u16, u8)] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// How many times this register address has been written.
    pub fn write_count(&self, address: u16) -> usize {
        self.log.iter().filter(|(a, _)| *a == address).count()
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MockBus {
    type Error = MockError;

    fn write(&mut self, _addr: u8, bytes: &[u8]) -> Result<(), MockError> {
        // 2-byte big-endian register address, then data bytes landing at
        // consecutive addresses
        if bytes.len() < 3 {
            return Err(MockError::Overflow);
        }
        let base = ((bytes[0] as u16) << 8) | bytes[1] as u16;
        for (i, value) in bytes[2..].iter().enumerate() {
            let address = base + i as u16;
            if self.fail_on == Some(address) {
                return Err(MockError::Fault(address));
            }
            self.regs
                .insert(address, *value)
                .map_err(|_| MockError::Overflow)?;
            self.log
                .push((address, *value))
                .map_err(|_| MockError::Overflow)?;
        }
        Ok(())
    }
}

impl WriteRead for MockBus {
    type Error = MockError;

    fn write_read(
        &mut self,
        _addr: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), MockError> {
        if bytes.len() != 2 {
            return Err(MockError::Overflow);
        }
        let base = ((bytes[0] as u16) << 8) | bytes[1] as u16;
        if self.fail_on == Some(base) {
            return Err(MockError::Fault(base));
        }
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.reg(base + i as u16);
        }
        Ok(())
    }
}

/// Power-sequencing failure reported by the mock supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPowerError;

/// Counting stand-in for the clock/regulator/reset collaborator.
pub struct MockPower {
    pub is_on: bool,
    pub on_count: u32,
    pub off_count: u32,
    pub fail_next: bool,
}

impl MockPower {
    pub fn new() -> Self {
        MockPower {
            is_on: false,
            on_count: 0,
            off_count: 0,
            fail_next: false,
        }
    }
}

impl Default for MockPower {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerControl for MockPower {
    type Error = MockPowerError;

    fn power_on(&mut self) -> Result<(), MockPowerError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(MockPowerError);
        }
        self.is_on = true;
        self.on_count += 1;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), MockPowerError> {
        self.is_on = false;
        self.off_count += 1;
        Ok(())
    }
}
