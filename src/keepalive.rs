//! Automatic keep-alive.
//!
//! A supervising process normally pings the watchdog from its main loop. When that is
//! not practical, [`start_automatic_keep_alive()`] spawns a thread that pings an open
//! [`DeviceHandle`] at a fixed period.
//!
//! **Disclaimer**: this should only be used if the caller is sure it will not defeat the
//! purpose of having a watchdog in the first place. If the main thread malfunctions but
//! the keep-alive thread keeps running, the watchdog is still pinged and no reset will
//! take place.

use crate::device::DeviceHandle;
use crate::port::PortIo;
use crate::watchdog::PingOutcome;
use log::{error, info, trace, warn};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// The thread gives up after this many pings in a row found the watchdog stopped.
const MAX_CONSECUTIVE_MISSES: u32 = 10;

/// A running keep-alive thread.
///
/// Dropping it signals the thread to exit without waiting for it.
pub struct KeepAlive {
    sender: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Signals the thread to exit and waits for it.
    pub fn stop(mut self) -> thread::Result<()> {
        // The sender being dropped is the signal.
        self.sender = None;
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.sender = None;
    }
}

/// Pings `device` every `period` until the returned [`KeepAlive`] is stopped or dropped.
///
/// The handle stays usable by the caller in between, typically to write the magic
/// close character before shutting down.
pub fn start_automatic_keep_alive<P>(
    device: Arc<Mutex<DeviceHandle<P>>>,
    period: Duration,
) -> KeepAlive
where
    P: PortIo + Send + 'static,
{
    let (tx, rx) = channel::<()>();
    let handle = thread::spawn(move || {
        info!("Automatic keepalive thread started.");
        let mut misses = 0;
        loop {
            let outcome = device.lock().unwrap_or_else(PoisonError::into_inner).keep_alive();
            if outcome == PingOutcome::NotRunning {
                misses += 1;
                if misses >= MAX_CONSECUTIVE_MISSES {
                    error!("Watchdog stopped for {misses} consecutive pings. Closing thread...");
                    break;
                }
            } else {
                misses = 0;
            }
            match rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => trace!("keepalive period elapsed"),
                // Nothing is ever sent: anything else means the sender is gone.
                _ => {
                    warn!("Sender was terminated. Closing 'auto keepalive' thread...");
                    break;
                }
            }
        }
        info!("Automatic keepalive thread ended.");
    });
    KeepAlive {
        sender: Some(tx),
        handle: Some(handle),
    }
}
