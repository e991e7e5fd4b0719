//! Simulated M6117 configuration space.
//!
//! [`SimulatedChip`] implements [`PortIo`] and behaves like the watchdog part of the
//! chip: it decodes the index/data protocol, ignores writes while the configuration
//! space is locked, loads the counter on a rising edge of the enable bit, and fires the
//! selected [`Signal`] once the counter runs out. Every register access is recorded,
//! which makes it the test double of choice for the controller and the device.

use crate::lock::UNLOCK_CODE;
use crate::port::{PortIo, Register, DATA_PORT, INDEX_PORT, WDT_ENABLE};
use crate::signal::Signal;
use crate::timeout::{CounterValue, CLOCK_HZ};
use log::{trace, warn};
use std::time::Duration;

/// One register access, as seen by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { index: u8, value: u8 },
    Write { index: u8, value: u8 },
}

#[derive(Debug, Clone)]
pub struct SimulatedChip {
    registers: [u8; 256],
    index: u8,
    accesses: Vec<Access>,
    rejected_writes: usize,
    /// Ticks left before expiry, `None` while the counter is stopped.
    remaining: Option<u64>,
    fired: Option<Signal>,
}

impl Default for SimulatedChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChip {
    /// A locked chip with every register cleared.
    pub fn new() -> Self {
        Self {
            registers: [0; 256],
            index: 0,
            accesses: Vec::new(),
            rejected_writes: 0,
            remaining: None,
            fired: None,
        }
    }

    /// Presets a register, as firmware would have left it.
    pub fn with_register(mut self, register: Register, value: u8) -> Self {
        self.registers[usize::from(register.index())] = value;
        self
    }

    pub fn register(&self, register: Register) -> u8 {
        self.registers[usize::from(register.index())]
    }

    /// Every register access since creation or the last [`clear_log()`](Self::clear_log).
    pub fn accesses(&self) -> &[Access] {
        &self.accesses
    }

    /// The `(index, value)` pairs written, in order.
    pub fn writes(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.accesses.iter().filter_map(|access| match *access {
            Access::Write { index, value } => Some((index, value)),
            Access::Read { .. } => None,
        })
    }

    pub fn clear_log(&mut self) {
        self.accesses.clear();
    }

    /// Number of writes dropped because the configuration space was locked.
    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes
    }

    pub fn is_locked(&self) -> bool {
        self.register(Register::Lock) != UNLOCK_CODE
    }

    pub fn is_enabled(&self) -> bool {
        self.register(Register::WatchdogControl) & WDT_ENABLE != 0
    }

    /// Whether the counter is running down.
    pub fn is_counting(&self) -> bool {
        self.remaining.is_some()
    }

    /// The value in the timeout data registers.
    pub fn counter(&self) -> CounterValue {
        CounterValue::from_le_bytes([
            self.register(Register::TimeoutData0),
            self.register(Register::TimeoutData1),
            self.register(Register::TimeoutData2),
        ])
    }

    /// The recovery action selected in the signal select register.
    pub fn selected_signal(&self) -> Option<Signal> {
        Signal::from_bits(self.register(Register::SignalSelect))
    }

    /// The action fired by the last expiry, if any.
    pub fn fired(&self) -> Option<Signal> {
        self.fired
    }

    /// Lets `duration` pass on the counter clock.
    ///
    /// Returns the fired signal if the counter ran out. An expired counter stays
    /// stopped until the enable bit sees another rising edge.
    pub fn elapse(&mut self, duration: Duration) -> Option<Signal> {
        let remaining = self.remaining?;
        let ticks = duration.as_nanos() * u128::from(CLOCK_HZ) / 1_000_000_000;
        let ticks = u64::try_from(ticks).unwrap_or(u64::MAX);
        if ticks < remaining {
            self.remaining = Some(remaining - ticks);
            return None;
        }
        self.remaining = None;
        self.fired = self.selected_signal();
        warn!("Simulated watchdog expired, firing {:?}.", self.fired);
        self.fired
    }

    fn store(&mut self, value: u8) {
        let index = self.index;
        self.accesses.push(Access::Write { index, value });
        if index != Register::Lock.index() && self.is_locked() {
            trace!("Locked, write of {value:#04x} to {index:#04x} dropped.");
            self.rejected_writes += 1;
            return;
        }
        let slot = usize::from(index);
        let previous = self.registers[slot];
        self.registers[slot] = value;
        if index == Register::WatchdogControl.index() {
            let was_enabled = previous & WDT_ENABLE != 0;
            let enabled = value & WDT_ENABLE != 0;
            if enabled && !was_enabled {
                self.remaining = Some(u64::from(self.counter().ticks()));
                self.fired = None;
            } else if !enabled {
                self.remaining = None;
            }
        }
    }
}

impl PortIo for SimulatedChip {
    fn outb(&mut self, port: u16, value: u8) {
        match port {
            INDEX_PORT => self.index = value,
            DATA_PORT => self.store(value),
            _ => warn!("Write to unmapped port {port:#06x} ignored."),
        }
    }

    fn inb(&mut self, port: u16) -> u8 {
        match port {
            INDEX_PORT => self.index,
            DATA_PORT => {
                let index = self.index;
                let value = self.registers[usize::from(index)];
                self.accesses.push(Access::Read { index, value });
                value
            }
            _ => 0xff,
        }
    }
}
