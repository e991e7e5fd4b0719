//! Direct port I/O with the x86 `in`/`out` instructions.
//!
//! Only built for x86 Linux with glibc, where `ioperm(2)` is available.

use crate::port::{PortIo, DATA_PORT, INDEX_PORT};
use log::{error, info};
use std::io;

/// Raw access to the index/data port pair.
///
/// Access is requested from the kernel with `ioperm(2)` on creation and given back
/// on drop.
#[derive(Debug)]
pub struct IoPorts {
    _private: (),
}

impl IoPorts {
    /// Requests access to the index and data ports.
    pub fn acquire() -> Result<Self, io::Error> {
        // SAFETY: ioperm only alters the I/O permission bitmap of this process.
        let rc = unsafe { libc::ioperm(libc::c_ulong::from(INDEX_PORT), 2, 1) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        info!("I/O permission granted on ports {INDEX_PORT:#04x}-{DATA_PORT:#04x}.");
        Ok(Self { _private: () })
    }
}

impl PortIo for IoPorts {
    fn outb(&mut self, port: u16, value: u8) {
        // SAFETY: this process was granted access to the port pair in `acquire()`.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    fn inb(&mut self, port: u16) -> u8 {
        let value: u8;
        // SAFETY: this process was granted access to the port pair in `acquire()`.
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }
}

impl Drop for IoPorts {
    fn drop(&mut self) {
        // SAFETY: see `acquire()`.
        let rc = unsafe { libc::ioperm(libc::c_ulong::from(INDEX_PORT), 2, 0) };
        if rc != 0 {
            error!("Couldn't release I/O permission: {}", io::Error::last_os_error());
        }
    }
}
