//! The watchdog state machine.
//!
//! [`Watchdog`] owns the register port and is the single source of truth for whether
//! the timer is armed. Every hardware sequence it runs is bracketed by a
//! [`ConfigWindow`], so other unlock-aware code never sees a half-programmed timer.
//!
//! ```text
//!              start / set_timeout
//!   Disarmed ───────────────────────► Armed ◄─┐
//!      ▲                                │     │ ping, start, set_timeout
//!      └──────────── stop ──────────────┘─────┘
//! ```
//!
//! The M6117 has no reload register: a ping clears and sets the enable bit again,
//! and the rising edge reloads the counter from the timeout data registers.

use crate::error::Result;
use crate::lock::ConfigWindow;
use crate::port::{PortIo, Register, RegisterPort, SIGNAL_MASK, WDT_ENABLE};
use crate::signal::Signal;
use crate::timeout::{encode, write_counter, TimeoutSeconds};
use log::{trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Whether the counter is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Disarmed,
    Armed,
}

/// Result of a [`Watchdog::ping()`].
///
/// Pinging a stopped watchdog is not a failure, but the caller should know that
/// nothing is protecting the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// The counter was reloaded.
    Reloaded,
    /// The watchdog is disarmed, nothing was written.
    NotRunning,
}

/// A watchdog shared between the device, its open handles and the shutdown hook.
pub type SharedWatchdog<P> = Arc<Mutex<Watchdog<P>>>;

/// Locks a shared watchdog.
///
/// A panic while holding the lock cannot leave the chip unlocked (see
/// [`ConfigWindow`]), so a poisoned mutex is still safe to use, and the watchdog must
/// stay controllable.
pub(crate) fn acquire<P>(shared: &Mutex<Watchdog<P>>) -> MutexGuard<'_, Watchdog<P>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller of the M6117 watchdog timer.
#[derive(Debug)]
pub struct Watchdog<P> {
    port: RegisterPort<P>,
    state: WatchdogState,
    timeout: TimeoutSeconds,
    signal: Signal,
}

impl<P: PortIo> Watchdog<P> {
    /// Creates a disarmed controller with the default timeout and a system reset on expiry.
    ///
    /// The hardware is not touched until the watchdog is started.
    pub fn new(io: P) -> Self {
        Self::with_config(io, TimeoutSeconds::DEFAULT, Signal::default())
    }

    pub fn with_config(io: P, timeout: TimeoutSeconds, signal: Signal) -> Self {
        Self {
            port: RegisterPort::new(io),
            state: WatchdogState::Disarmed,
            timeout,
            signal,
        }
    }

    /// Programs `seconds` and arms the watchdog.
    ///
    /// If the watchdog is already armed, the countdown restarts from the new value.
    /// A timeout outside 1..=512 is rejected before any register is written.
    pub fn start(&mut self, seconds: u32) -> Result<()> {
        let timeout = TimeoutSeconds::new(seconds)?;
        self.program(timeout);
        Ok(())
    }

    /// Arms the watchdog with the configured timeout.
    pub fn arm(&mut self) {
        self.program(self.timeout);
    }

    /// Changes the timeout and returns the value now in effect.
    ///
    /// This always arms the watchdog, even if it was stopped.
    pub fn set_timeout(&mut self, seconds: u32) -> Result<TimeoutSeconds> {
        self.start(seconds)?;
        Ok(self.timeout)
    }

    /// Disarms the watchdog. Does nothing if it is not running.
    pub fn stop(&mut self) {
        if self.state == WatchdogState::Disarmed {
            return;
        }
        {
            let mut cfg = ConfigWindow::open(&mut self.port);
            let control = cfg.read(Register::WatchdogControl);
            cfg.write(Register::WatchdogControl, control & !WDT_ENABLE);
        }
        self.state = WatchdogState::Disarmed;
        warn!("Watchdog stopped. The system will NOT be reset.");
    }

    /// Reloads the counter.
    pub fn ping(&mut self) -> PingOutcome {
        if self.state == WatchdogState::Disarmed {
            warn!("WDT is stopped, ping ignored.");
            return PingOutcome::NotRunning;
        }
        let mut cfg = ConfigWindow::open(&mut self.port);
        let control = cfg.read(Register::WatchdogControl) & !WDT_ENABLE;
        cfg.write(Register::WatchdogControl, control);
        cfg.write(Register::WatchdogControl, control | WDT_ENABLE);
        trace!("Ping.");
        PingOutcome::Reloaded
    }

    fn program(&mut self, timeout: TimeoutSeconds) {
        let counter = encode(timeout);
        let signal = self.signal;
        {
            let mut cfg = ConfigWindow::open(&mut self.port);
            let control = cfg.read(Register::WatchdogControl) & !WDT_ENABLE;
            cfg.write(Register::WatchdogControl, control);
            write_counter(&mut cfg, counter);
            let select = cfg.read(Register::SignalSelect);
            cfg.write(Register::SignalSelect, (select & !SIGNAL_MASK) | signal.bits());
            let control = cfg.read(Register::WatchdogControl);
            cfg.write(Register::WatchdogControl, control | WDT_ENABLE);
        }
        self.timeout = timeout;
        self.state = WatchdogState::Armed;
        warn!("Watchdog armed: timeout {timeout} (counter {counter}), {signal} on expiry.");
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == WatchdogState::Armed
    }

    /// The timeout used by the next [`arm()`](Self::arm).
    pub fn timeout(&self) -> TimeoutSeconds {
        self.timeout
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Selects the recovery action. Takes effect the next time the watchdog is started.
    pub fn set_signal(&mut self, signal: Signal) {
        self.signal = signal;
    }

    pub fn io(&self) -> &P {
        self.port.io()
    }

    pub fn io_mut(&mut self) -> &mut P {
        self.port.io_mut()
    }

    /// Gives the port back, leaving the hardware as it is.
    pub fn into_io(self) -> P {
        self.port.into_inner()
    }
}
