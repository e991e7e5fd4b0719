//! Timeout encoding.
//!
//! The watchdog counter is 24 bits wide and advances once every 30.5 µs, so a timeout
//! in seconds is programmed as `seconds * 1_000_000 / 30.5`. The factor is used as the
//! integer 32787 (the exact value is 32786.89), which makes every timeout a few ppm
//! longer than requested. Existing installations are tuned against that skew, so it is
//! kept as is.

use crate::error::{Error, Result};
use crate::port::{PortIo, Register, RegisterPort};
use libc::c_int;
use log::warn;
use std::fmt;
use std::time::Duration;

pub const MIN_TIMEOUT: u32 = 1;
pub const MAX_TIMEOUT: u32 = 512;
pub const DEFAULT_TIMEOUT: u32 = 60;

/// Counter ticks per second (1_000_000 / 30.5, rounded).
pub const TIME_FACTOR: u32 = 32787;
/// Largest value the 24-bit counter can hold.
pub const COUNTER_MAX: u32 = 0x00ff_ffff;
/// Frequency of the counter clock.
pub const CLOCK_HZ: u64 = 32_768;

/// A timeout in seconds, within the range the hardware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeoutSeconds(u32);

impl TimeoutSeconds {
    pub const DEFAULT: Self = Self(DEFAULT_TIMEOUT);

    pub fn new(seconds: u32) -> Result<Self> {
        if (MIN_TIMEOUT..=MAX_TIMEOUT).contains(&seconds) {
            Ok(Self(seconds))
        } else {
            Err(Error::TimeoutOutOfRange {
                requested: i64::from(seconds),
            })
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// The value reported through the ioctl interface.
    pub fn as_c_int(self) -> c_int {
        // At most 512, always representable.
        self.0 as c_int
    }
}

impl TryFrom<c_int> for TimeoutSeconds {
    type Error = Error;

    fn try_from(seconds: c_int) -> Result<Self> {
        let requested = i64::from(seconds);
        u32::try_from(seconds)
            .map_err(|_| Error::TimeoutOutOfRange { requested })
            .and_then(Self::new)
    }
}

impl fmt::Display for TimeoutSeconds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} s", self.0)
    }
}

/// The value loaded in the hardware counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterValue(u32);

impl CounterValue {
    pub fn from_le_bytes(bytes: [u8; 3]) -> Self {
        let [b0, b1, b2] = bytes;
        Self(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    pub fn to_le_bytes(self) -> [u8; 3] {
        let [b0, b1, b2, _] = self.0.to_le_bytes();
        [b0, b1, b2]
    }

    pub fn ticks(self) -> u32 {
        self.0
    }

    /// Time the counter takes to run out, at the nominal clock frequency.
    pub fn as_duration(self) -> Duration {
        let nanos = u64::from(self.0) * 1_000_000_000 / CLOCK_HZ;
        Duration::from_nanos(nanos)
    }
}

impl fmt::Display for CounterValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#08x}", self.0)
    }
}

/// Converts a timeout into its counter value.
///
/// 512 s does not fit: `512 * 32787` is 16_786_944, above the 24-bit maximum of
/// 16_777_215. Keeping only the low 24 bits would arm a 0.3 s timer, so the counter
/// saturates instead and the longest timeout is really about 511.7 s.
pub fn encode(timeout: TimeoutSeconds) -> CounterValue {
    // Cannot overflow a u32: 512 * 32787 < 2^25.
    let ticks = timeout.get() * TIME_FACTOR;
    if ticks > COUNTER_MAX {
        warn!("Timeout {timeout} exceeds the 24-bit counter, using the maximum count.");
        CounterValue(COUNTER_MAX)
    } else {
        CounterValue(ticks)
    }
}

/// Writes `counter` to the timeout data registers, least significant byte first.
///
/// The configuration space must be unlocked.
pub fn write_counter<P: PortIo>(port: &mut RegisterPort<P>, counter: CounterValue) {
    let [b0, b1, b2] = counter.to_le_bytes();
    port.write(Register::TimeoutData0, b0);
    port.write(Register::TimeoutData1, b1);
    port.write(Register::TimeoutData2, b2);
}
