//! Register port access.
//!
//! The M6117 configuration registers are not memory mapped. They sit behind an
//! index/data port pair: the register index is written to [`INDEX_PORT`], then the
//! value is read from or written to [`DATA_PORT`]. These are the two unused ports
//! of the first 8259 interrupt controller (0x20-0x23), which are only decoded by
//! the M6117 configuration logic.
//!
//! The raw byte I/O is abstracted by [`PortIo`], so that the same controller code
//! can drive the real chip (through [`DevPort`], or `ioports::IoPorts` on x86) or the
//! [`SimulatedChip`](crate::sim::SimulatedChip).

use log::{error, info, trace};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Port receiving the register index.
pub const INDEX_PORT: u16 = 0x22;
/// Port carrying the register data.
pub const DATA_PORT: u16 = 0x23;

/// Enable bit of [`Register::WatchdogControl`].
pub const WDT_ENABLE: u8 = 0x40;
/// Bits of [`Register::SignalSelect`] holding the recovery action.
pub const SIGNAL_MASK: u8 = 0xf0;

/// Byte-wide port I/O.
///
/// Implementations are assumed to always succeed: the hardware bus gives no way of
/// detecting a failed transfer, so there is nothing to report.
pub trait PortIo {
    /// Writes `value` to `port`.
    fn outb(&mut self, port: u16, value: u8);
    /// Reads a byte from `port`.
    fn inb(&mut self, port: u16) -> u8;
}

impl<T: PortIo + ?Sized> PortIo for Box<T> {
    fn outb(&mut self, port: u16, value: u8) {
        (**self).outb(port, value)
    }

    fn inb(&mut self, port: u16) -> u8 {
        (**self).inb(port)
    }
}

/// Indexed configuration registers used by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    /// Write 0xc5 to unlock the configuration space, 0x00 to lock it.
    Lock = 0x13,
    /// Watchdog control, bit 6 enables the counter.
    WatchdogControl = 0x37,
    /// Recovery action in the high nibble, low nibble belongs to other functions.
    SignalSelect = 0x38,
    /// Counter bits 0-7.
    TimeoutData0 = 0x39,
    /// Counter bits 8-15.
    TimeoutData1 = 0x3a,
    /// Counter bits 16-23.
    TimeoutData2 = 0x3b,
    /// Reserved, never driven by this crate.
    Control = 0x3c,
}

impl Register {
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// Indexed access to the configuration registers.
///
/// This is the sole owner of the port pair. It is not reentrant: a read or a write
/// is two port transfers, and the owner of the controller must serialize callers.
#[derive(Debug)]
pub struct RegisterPort<P> {
    io: P,
}

impl<P: PortIo> RegisterPort<P> {
    pub fn new(io: P) -> Self {
        Self { io }
    }

    /// Selects `register` and reads its value.
    pub fn read(&mut self, register: Register) -> u8 {
        self.io.outb(INDEX_PORT, register.index());
        let value = self.io.inb(DATA_PORT);
        trace!("read  {register:?} ({:#04x}) = {value:#04x}", register.index());
        value
    }

    /// Selects `register` and writes `value` to it.
    pub fn write(&mut self, register: Register, value: u8) {
        trace!("write {register:?} ({:#04x}) = {value:#04x}", register.index());
        self.io.outb(INDEX_PORT, register.index());
        self.io.outb(DATA_PORT, value);
    }

    pub fn io(&self) -> &P {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut P {
        &mut self.io
    }

    pub fn into_inner(self) -> P {
        self.io
    }
}

/// Port I/O through the Linux `/dev/port` character device.
///
/// Each transfer is a one-byte positional read or write at the port address.
/// The process needs `CAP_SYS_RAWIO` and read/write permission on the device file.
#[derive(Debug)]
pub struct DevPort {
    file: File,
}

impl DevPort {
    /// Opens `/dev/port`.
    pub fn open() -> Result<Self, io::Error> {
        Self::open_path("/dev/port")
    }

    /// Opens a file exposing the I/O port space at byte offsets.
    pub fn open_path<T: AsRef<Path>>(path: T) -> Result<Self, io::Error> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        info!("Port I/O through {} opened.", path.display());
        Ok(Self { file })
    }
}

impl PortIo for DevPort {
    fn outb(&mut self, port: u16, value: u8) {
        match self.file.write_at(&[value], u64::from(port)) {
            Ok(1) => {}
            Ok(n) => error!("Short write to port {port:#06x}: {n} bytes written."),
            Err(e) => error!("Write of {value:#04x} to port {port:#06x} failed: {e}"),
        }
    }

    fn inb(&mut self, port: u16) -> u8 {
        // An undriven ISA bus reads back all ones.
        let mut buf = [0xff_u8];
        match self.file.read_at(&mut buf, u64::from(port)) {
            Ok(1) => {}
            Ok(n) => error!("Short read from port {port:#06x}: {n} bytes read."),
            Err(e) => error!("Read from port {port:#06x} failed: {e}"),
        }
        let [value] = buf;
        value
    }
}
