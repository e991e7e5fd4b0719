//! Stopping the watchdog on system shutdown.
//!
//! A watchdog left armed across a reboot can fire during the memory test or, worse,
//! in the middle of the following fsck. The hosting environment reports shutdown
//! events to a [`SystemEventListener`]; [`ShutdownHook`] turns the timer off.

use crate::port::PortIo;
use crate::watchdog::{acquire, SharedWatchdog};
use log::{info, trace};
use std::sync::Arc;

/// System power events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// Restart or shutdown in progress.
    Shutdown,
    /// The system is halting.
    Halt,
    /// The system is powering off.
    PowerOff,
}

pub trait SystemEventListener {
    fn on_system_event(&self, event: SystemEvent);
}

/// Stops the watchdog on [`SystemEvent::Shutdown`] and [`SystemEvent::Halt`].
///
/// The stop is unconditional: `nowayout` and a pending magic close do not matter.
pub struct ShutdownHook<P> {
    watchdog: SharedWatchdog<P>,
}

impl<P: PortIo> ShutdownHook<P> {
    pub fn new(watchdog: SharedWatchdog<P>) -> Self {
        Self { watchdog }
    }
}

impl<P> Clone for ShutdownHook<P> {
    fn clone(&self) -> Self {
        Self {
            watchdog: Arc::clone(&self.watchdog),
        }
    }
}

impl<P: PortIo> SystemEventListener for ShutdownHook<P> {
    fn on_system_event(&self, event: SystemEvent) {
        match event {
            SystemEvent::Shutdown | SystemEvent::Halt => {
                info!("{event:?} in progress, turning the watchdog off.");
                acquire(&self.watchdog).stop();
            }
            SystemEvent::PowerOff => trace!("{event:?} ignored."),
        }
    }
}
