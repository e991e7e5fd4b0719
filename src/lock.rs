//! Configuration space lock.
//!
//! The M6117 ignores writes to its configuration registers unless the unlock code
//! was written to the lock register first. Firmware and other drivers follow the same
//! protocol, so every group of writes that has to look atomic from outside is
//! bracketed by [`unlock`] and [`lock`]. Leaving the chip unlocked is a bug: any
//! other unlock-aware code could then silently reprogram the watchdog.

use crate::port::{PortIo, Register, RegisterPort};
use std::ops::{Deref, DerefMut};

/// Value of the lock register that opens the configuration space.
pub const UNLOCK_CODE: u8 = 0xc5;
/// Value of the lock register that closes the configuration space.
pub const LOCK_CODE: u8 = 0x00;

pub fn unlock<P: PortIo>(port: &mut RegisterPort<P>) {
    port.write(Register::Lock, UNLOCK_CODE);
}

pub fn lock<P: PortIo>(port: &mut RegisterPort<P>) {
    port.write(Register::Lock, LOCK_CODE);
}

/// An unlocked configuration space.
///
/// Created by [`ConfigWindow::open`], which unlocks the chip; dropping the window
/// locks it again, so an early return can never leave the chip writable.
pub struct ConfigWindow<'a, P: PortIo> {
    port: &'a mut RegisterPort<P>,
}

impl<'a, P: PortIo> ConfigWindow<'a, P> {
    pub fn open(port: &'a mut RegisterPort<P>) -> Self {
        unlock(port);
        Self { port }
    }
}

impl<P: PortIo> Deref for ConfigWindow<'_, P> {
    type Target = RegisterPort<P>;

    fn deref(&self) -> &Self::Target {
        self.port
    }
}

impl<P: PortIo> DerefMut for ConfigWindow<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.port
    }
}

impl<P: PortIo> Drop for ConfigWindow<'_, P> {
    fn drop(&mut self) {
        lock(self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Access, SimulatedChip};

    #[test]
    fn window_brackets_writes() {
        let mut port = RegisterPort::new(SimulatedChip::new());
        {
            let mut cfg = ConfigWindow::open(&mut port);
            cfg.write(Register::TimeoutData0, 0x12);
        }
        assert_eq!(
            port.io().accesses(),
            &[
                Access::Write { index: 0x13, value: 0xc5 },
                Access::Write { index: 0x39, value: 0x12 },
                Access::Write { index: 0x13, value: 0x00 },
            ]
        );
        assert!(port.io().is_locked());
        assert_eq!(port.io().register(Register::TimeoutData0), 0x12);
    }

    #[test]
    fn window_relocks_on_panic() {
        let mut port = RegisterPort::new(SimulatedChip::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut cfg = ConfigWindow::open(&mut port);
            cfg.write(Register::TimeoutData0, 0x12);
            panic!("interrupted while unlocked");
        }));
        assert!(result.is_err());
        assert_eq!(port.io().writes().last(), Some((0x13, 0x00)));
        assert!(port.io().is_locked());
    }

    #[test]
    fn writes_outside_a_window_are_ignored_by_the_chip() {
        let mut port = RegisterPort::new(SimulatedChip::new());
        port.write(Register::TimeoutData0, 0x12);
        assert_eq!(port.io().register(Register::TimeoutData0), 0x00);
        assert_eq!(port.io().rejected_writes(), 1);
    }
}
