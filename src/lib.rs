//! ALi M6117 watchdog timer controller.
//!
//! The ALi (Acer Labs) M6117 is an i386 system-on-chip with a watchdog timer built in.
//! The watchdog uses a 32.768 kHz clock with a 24-bit counter, giving timeouts from
//! 30.5 µs to 512 s. When the counter runs out the chip raises the recovery action
//! selected by the driver: a system reset (the default), an NMI, or one of the
//! IRQ lines 3-7, 9-12, 14 and 15.
//!
//! A Watchdog Timer (WDT) is a hardware circuit that can reset the computer system in
//! case of a software fault. A supervising process pings the watchdog at regular
//! intervals; if it fails (RAM error, kernel bug, whatever), the pings stop and the
//! hardware resets the system after the timeout.
//!
//! ## Layers
//! - [`port`]: indexed access to the configuration registers through ports 0x22/0x23,
//!   over `/dev/port`, raw `in`/`out` instructions, or the [`sim`] chip.
//! - [`lock`]: unlocking and locking the configuration space around every change.
//! - [`timeout`]: seconds to 24-bit counter conversion.
//! - [`watchdog`]: the start/stop/ping state machine.
//! - [`shutdown`]: turning the timer off on shutdown and halt.
//! - [`device`]: the watchdog device interface (open, write, ioctl, close) on top.
//!
//! ## Magic Close feature
//! Closing the device does not disable the watchdog unless the magic character `'V'`
//! was written just before. If the supervising process closes the device without it,
//! the driver assumes the process died and leaves the watchdog running, which causes
//! a reboot if the device is not re-opened in time. With `nowayout` set, there is no
//! way of disabling the watchdog once it has been started.
//!
//! # Examples
//!
//! ```rust
//! use m6117_watchdog::{sim::SimulatedChip, CloseOutcome, Params, WatchdogDevice};
//!
//! # fn do_something(){}
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = Params { nowayout: false, ..Params::parse("timeout=30")? };
//! let device = WatchdogDevice::init(SimulatedChip::new(), params)?;
//! let mut wd = device.open()?;
//! loop{
//!     do_something();
//!     wd.write(b"\n")?;
//! #   break;
//! }
//! wd.write(b"V")?;
//! assert_eq!(wd.close(), CloseOutcome::Stopped);
//! assert!(!device.is_running());
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod error;
pub mod ioctl;
#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86", target_arch = "x86_64")
))]
pub mod ioports;
pub mod keepalive;
pub mod lock;
pub mod params;
pub mod port;
pub mod shutdown;
pub mod signal;
pub mod sim;
pub mod timeout;
pub mod watchdog;

pub use device::{CloseOutcome, DeviceHandle, WatchdogDevice};
pub use error::{Error, Result};
pub use ioctl::{Command, Reply};
pub use keepalive::{start_automatic_keep_alive, KeepAlive};
pub use params::Params;
pub use port::{DevPort, PortIo, Register, RegisterPort};
pub use shutdown::{ShutdownHook, SystemEvent, SystemEventListener};
pub use signal::Signal;
pub use timeout::{encode, CounterValue, TimeoutSeconds};
pub use watchdog::{PingOutcome, SharedWatchdog, Watchdog, WatchdogState};
