//! Watchdog device front end.
//!
//! [`WatchdogDevice`] plays the part of the `/dev/watchdog` driver: it is created when
//! the driver loads, can be opened by one process at a time, and turns the timer off
//! when it goes away. An open [`DeviceHandle`] follows the Linux watchdog API:
//!
//! - opening the device arms the watchdog;
//! - any write pings it, and a write containing the magic character `'V'` allows the
//!   next close to disarm it;
//! - closing without the magic character, or with `nowayout` set, leaves it running;
//! - the watchdog ioctls are available through [`DeviceHandle::ioctl()`].

use crate::error::Error;
use crate::ioctl::{watchdog_info, Command, Reply, SetOptionFlags};
use crate::params::Params;
use crate::port::PortIo;
use crate::shutdown::ShutdownHook;
use crate::timeout::TimeoutSeconds;
use crate::watchdog::{acquire, PingOutcome, SharedWatchdog, Watchdog, WatchdogState};
use libc::c_int;
use log::{error, info, trace, warn};
use nix::errno::Errno;
use nix::sys::ioctl::ioctl_num_type;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Writing this character allows the next close to stop the watchdog.
pub const MAGIC_CLOSE_CHAR: u8 = b'V';

pub const DRIVER_VERSION: &str = "0.01c";

/// What happened to the watchdog when a handle was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The magic character was seen and stopping is allowed: the watchdog is off.
    Stopped,
    /// The watchdog keeps running and will reset the system unless reopened in time.
    UnexpectedClose,
}

/// The loaded driver.
pub struct WatchdogDevice<P: PortIo> {
    watchdog: SharedWatchdog<P>,
    params: Params,
    is_open: Arc<AtomicBool>,
}

impl<P: PortIo> WatchdogDevice<P> {
    /// Loads the driver on top of `io`.
    ///
    /// Fails if the configured timeout is out of range. With `early_enable` the
    /// watchdog is armed right away, otherwise it stays off until the first open.
    pub fn init(io: P, params: Params) -> Result<Self, Error> {
        let timeout = params.timeout_seconds().map_err(|e| {
            error!("{e}, driver not loaded.");
            e
        })?;
        let mut watchdog = Watchdog::with_config(io, timeout, params.signal);
        info!("WDT driver for ALi M6117 v({DRIVER_VERSION}) initialising ({params}).");
        if params.early_enable {
            watchdog.arm();
        }
        Ok(Self {
            watchdog: Arc::new(Mutex::new(watchdog)),
            params,
            is_open: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Opens the device and arms the watchdog with the current timeout.
    ///
    /// Only one handle can be open at a time; a second open fails with `EBUSY`.
    pub fn open(&self) -> Result<DeviceHandle<P>, Errno> {
        if self.is_open.swap(true, Ordering::AcqRel) {
            warn!("Watchdog device already open.");
            return Err(Errno::EBUSY);
        }
        acquire(&self.watchdog).arm();
        Ok(DeviceHandle {
            watchdog: Arc::clone(&self.watchdog),
            is_open: Arc::clone(&self.is_open),
            nowayout: self.params.nowayout,
            expect_close: false,
            released: false,
        })
    }

    /// A listener that stops the watchdog on shutdown and halt events.
    pub fn shutdown_hook(&self) -> ShutdownHook<P> {
        ShutdownHook::new(Arc::clone(&self.watchdog))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn state(&self) -> WatchdogState {
        acquire(&self.watchdog).state()
    }

    pub fn is_running(&self) -> bool {
        acquire(&self.watchdog).is_running()
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub fn timeout(&self) -> TimeoutSeconds {
        acquire(&self.watchdog).timeout()
    }

    /// Runs `f` with exclusive access to the controller.
    pub fn with_watchdog<R>(&self, f: impl FnOnce(&mut Watchdog<P>) -> R) -> R {
        f(&mut acquire(&self.watchdog))
    }
}

impl<P: PortIo> Drop for WatchdogDevice<P> {
    fn drop(&mut self) {
        info!("Unloading the ALi M6117 WDT driver.");
        acquire(&self.watchdog).stop();
    }
}

/// An open watchdog device.
///
/// Dropping the handle closes it, see [`close()`](Self::close).
pub struct DeviceHandle<P: PortIo> {
    watchdog: SharedWatchdog<P>,
    is_open: Arc<AtomicBool>,
    nowayout: bool,
    expect_close: bool,
    released: bool,
}

impl<P: PortIo> DeviceHandle<P> {
    /// Pings the watchdog.
    ///
    /// The magic close flag is set if `data` contains `'V'` and cleared otherwise.
    /// An empty write does nothing.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Errno> {
        if data.is_empty() {
            return Ok(0);
        }
        self.expect_close = data.contains(&MAGIC_CLOSE_CHAR);
        if self.expect_close {
            trace!("Magic close character received.");
        }
        self.keep_alive();
        Ok(data.len())
    }

    /// Pings the watchdog, the same as `WDIOC_KEEPALIVE`.
    pub fn keep_alive(&mut self) -> PingOutcome {
        acquire(&self.watchdog).ping()
    }

    /// Decodes and runs a raw ioctl request.
    pub fn ioctl_raw(&mut self, request: ioctl_num_type, arg: c_int) -> Result<Reply, Errno> {
        self.ioctl(Command::decode(request, arg)?)
    }

    /// Runs a watchdog ioctl.
    ///
    /// `SetTimeout` reprograms and arms the watchdog, then replies with the timeout
    /// now in effect, so the caller does not need a separate `GetTimeout`.
    pub fn ioctl(&mut self, command: Command) -> Result<Reply, Errno> {
        trace!("ioctl {command:?}");
        match command {
            Command::GetSupport => Ok(Reply::Support(watchdog_info::m6117())),
            // No fault is ever latched by the hardware.
            Command::GetStatus | Command::GetBootStatus => Ok(Reply::Value(0)),
            Command::KeepAlive => {
                self.keep_alive();
                Ok(Reply::Done)
            }
            Command::SetTimeout(seconds) => {
                let timeout = TimeoutSeconds::try_from(seconds).map_err(|e| {
                    warn!("{e}");
                    Errno::from(e)
                })?;
                let timeout = acquire(&self.watchdog).set_timeout(timeout.get())?;
                Ok(Reply::Value(timeout.as_c_int()))
            }
            Command::GetTimeout => Ok(Reply::Value(acquire(&self.watchdog).timeout().as_c_int())),
            Command::SetOptions(options) => {
                if SetOptionFlags::DisableCard.is_set_in(options) {
                    if self.nowayout {
                        let flag = SetOptionFlags::DisableCard;
                        warn!("nowayout is set, but {flag} stops the watchdog anyway.");
                    }
                    acquire(&self.watchdog).stop();
                    Ok(Reply::Done)
                } else if SetOptionFlags::EnableCard.is_set_in(options) {
                    acquire(&self.watchdog).arm();
                    Ok(Reply::Done)
                } else {
                    Err(Errno::EINVAL)
                }
            }
        }
    }

    /// Whether the last write contained the magic character.
    pub fn expects_close(&self) -> bool {
        self.expect_close
    }

    /// Closes the device.
    ///
    /// The watchdog is stopped only if the magic character was written and
    /// `nowayout` is off. Otherwise the supervising process is assumed dead and the
    /// watchdog is left running.
    pub fn close(mut self) -> CloseOutcome {
        self.release()
    }

    fn release(&mut self) -> CloseOutcome {
        self.released = true;
        let outcome = if self.expect_close && !self.nowayout {
            acquire(&self.watchdog).stop();
            CloseOutcome::Stopped
        } else {
            error!("Unexpected close, not stopping watchdog!");
            CloseOutcome::UnexpectedClose
        };
        self.expect_close = false;
        self.is_open.store(false, Ordering::Release);
        outcome
    }
}

impl<P: PortIo> Drop for DeviceHandle<P> {
    fn drop(&mut self) {
        if !self.released {
            self.release();
        }
    }
}
