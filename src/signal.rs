//! Recovery actions the watchdog can trigger on expiry.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// What the chip does when the counter runs out.
///
/// Selected by the high nibble of the signal select register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    Irq3,
    Irq4,
    Irq5,
    Irq6,
    Irq7,
    Irq9,
    Irq10,
    Irq11,
    Irq12,
    Irq14,
    Irq15,
    /// Non-maskable interrupt
    Nmi,
    /// System reset
    #[default]
    SystemReset,
}

impl Signal {
    pub const ALL: [Signal; 13] = [
        Self::Irq3,
        Self::Irq4,
        Self::Irq5,
        Self::Irq6,
        Self::Irq7,
        Self::Irq9,
        Self::Irq10,
        Self::Irq11,
        Self::Irq12,
        Self::Irq14,
        Self::Irq15,
        Self::Nmi,
        Self::SystemReset,
    ];

    /// Value of the high nibble of the signal select register.
    pub fn bits(&self) -> u8 {
        match self {
            Self::Irq3        => 0x10,
            Self::Irq4        => 0x20,
            Self::Irq5        => 0x30,
            Self::Irq6        => 0x40,
            Self::Irq7        => 0x50,
            Self::Irq9        => 0x60,
            Self::Irq10       => 0x70,
            Self::Irq11       => 0x80,
            Self::Irq12       => 0x90,
            Self::Irq14       => 0xa0,
            Self::Irq15       => 0xb0,
            Self::Nmi         => 0xc0,
            Self::SystemReset => 0xd0,
        }
    }

    /// Decodes the high nibble of a signal select register value.
    pub fn from_bits(value: u8) -> Option<Self> {
        let nibble = value & crate::port::SIGNAL_MASK;
        Self::ALL.into_iter().find(|s| s.bits() == nibble)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Irq3 => write!(f, "irq3"),
            Self::Irq4 => write!(f, "irq4"),
            Self::Irq5 => write!(f, "irq5"),
            Self::Irq6 => write!(f, "irq6"),
            Self::Irq7 => write!(f, "irq7"),
            Self::Irq9 => write!(f, "irq9"),
            Self::Irq10 => write!(f, "irq10"),
            Self::Irq11 => write!(f, "irq11"),
            Self::Irq12 => write!(f, "irq12"),
            Self::Irq14 => write!(f, "irq14"),
            Self::Irq15 => write!(f, "irq15"),
            Self::Nmi => write!(f, "nmi"),
            Self::SystemReset => write!(f, "reset"),
        }
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|signal| signal.to_string() == name)
            .ok_or_else(|| Error::invalid_parameter("signal", s))
    }
}
