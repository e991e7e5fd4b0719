//! Watchdog ioctl commands.
//!
//! This module decodes the requests a watchdog device receives from user space.
//! All the ioctl request codes follow the Linux Kernel headers:
//!  - include/uapi/linux/watchdog.h
//! Kernel documentation: /Documentation/userspace-api/ioctl/ioctl-number.rst
use libc::c_int;
use nix::errno::Errno;
use nix::sys::ioctl::ioctl_num_type;
use nix::{request_code_read, request_code_readwrite};
use std::fmt;
use std::mem::size_of;

const WATCHDOG_IOCTL_BASE: u8 = b'W';

const WDIOC_GETSUPPORT: u8 = 0;
const WDIOC_GETSTATUS: u8 = 1;
const WDIOC_GETBOOTSTATUS: u8 = 2;
const WDIOC_SETOPTIONS: u8 = 4;
const WDIOC_KEEPALIVE: u8 = 5;
const WDIOC_SETTIMEOUT: u8 = 6;
const WDIOC_GETTIMEOUT: u8 = 7;

const IDENTITY_STR_LEN: usize = 32;

/// Identity reported by [`Command::GetSupport`].
pub const IDENTITY: &str = "ALi M6117 WDT";

/// The following struct corresponds to the one defined in the Linux Kernel headers:
///  - include/uapi/linux/watchdog.h :
/// ```text
/// struct watchdog_info {
/// 	__u32 options;		/* Options the card/driver supports */
/// 	__u32 firmware_version;	/* Firmware version of the card */
/// 	__u8  identity[32];	/* Identity of the board */
/// };
/// ```
#[allow(non_camel_case_types)]
#[repr(C)] // see https://docs.rust-embedded.org/book/c-tips/index.html#packed-and-aligned-types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct watchdog_info {
    /// Flags describing what the device supports
    pub options: u32,
    /// The firmware version of the card if available
    pub firmware_version: u32,
    /// a string identifying the watchdog driver
    pub identity: [u8; IDENTITY_STR_LEN],
}

impl Default for watchdog_info {
    fn default() -> Self {
        Self::new()
    }
}

impl watchdog_info {
    pub fn new() -> Self {
        watchdog_info {
            options: 0,
            firmware_version: 0,
            identity: [0; IDENTITY_STR_LEN],
        }
    }

    /// What the M6117 driver reports about itself.
    pub fn m6117() -> Self {
        let mut info = Self::new();
        info.options = OptionFlags::KeepalivePing.value()
            | OptionFlags::SetTimeout.value()
            | OptionFlags::MagicClose.value();
        for (dst, src) in info.identity.iter_mut().zip(IDENTITY.bytes()) {
            *dst = src;
        }
        info
    }

    pub fn supports(&self, option: &OptionFlags) -> bool {
        (self.options & option.value()) != 0
    }

    /// The identity string, without the trailing NUL padding.
    pub fn identity(&self) -> String {
        let end = self.identity.iter().position(|&b| b == 0).unwrap_or(IDENTITY_STR_LEN);
        String::from_utf8_lossy(self.identity.get(..end).unwrap_or_default()).into_owned()
    }
}

/// Options a watchdog driver can report in `watchdog_info.options`.
///
/// All options and their related values have been obtained from the Linux Kernel headers:
///  - include/uapi/linux/watchdog.h in struct watchdog_info.options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFlags {
    /// Set timeout (in seconds)
    SetTimeout,
    /// Supports magic close char
    MagicClose,
    /// Keep alive ping reply
    KeepalivePing,
}

impl OptionFlags {
    pub fn value(&self) -> u32 {
        match self {
            Self::SetTimeout      => 0x0080,
            Self::MagicClose      => 0x0100,
            Self::KeepalivePing   => 0x8000,
        }
    }
}

impl fmt::Display for OptionFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::SetTimeout => write!(f, "SetTimeout"),
            Self::MagicClose => write!(f, "MagicClose"),
            Self::KeepalivePing => write!(f, "KeepalivePing"),
        }
    }
}

/// The flags accepted by [`Command::SetOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOptionFlags {
    /// Turn off the watchdog timer
    DisableCard,
    /// Turn on the watchdog timer
    EnableCard,
}

impl SetOptionFlags {
    pub fn value(&self) -> c_int {
        match self {
            Self::DisableCard   => 0x0001,
            Self::EnableCard    => 0x0002,
        }
    }

    pub fn is_set_in(&self, options: c_int) -> bool {
        (options & self.value()) != 0
    }
}

impl fmt::Display for SetOptionFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::DisableCard => write!(f, "DisableCard"),
            Self::EnableCard => write!(f, "EnableCard"),
        }
    }
}

/// A decoded watchdog ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetSupport,
    GetStatus,
    GetBootStatus,
    /// Bitmask of [`SetOptionFlags`].
    SetOptions(c_int),
    KeepAlive,
    /// New timeout in seconds.
    SetTimeout(c_int),
    GetTimeout,
}

impl Command {
    /// Decodes an ioctl request. `arg` is the integer the caller passed by pointer,
    /// ignored by the requests that only return data.
    ///
    /// Requests this driver does not implement (temperature, pretimeout, time left)
    /// and foreign requests fail with `ENOTTY`.
    pub fn decode(request: ioctl_num_type, arg: c_int) -> Result<Self, Errno> {
        [
            Self::GetSupport,
            Self::GetStatus,
            Self::GetBootStatus,
            Self::SetOptions(arg),
            Self::KeepAlive,
            Self::SetTimeout(arg),
            Self::GetTimeout,
        ]
        .into_iter()
        .find(|command| command.request_code() == request)
        .ok_or(Errno::ENOTTY)
    }

    /// The ioctl request number of this command.
    pub fn request_code(&self) -> ioctl_num_type {
        let int_size = size_of::<c_int>();
        match self {
            Self::GetSupport => read_code(WDIOC_GETSUPPORT, size_of::<watchdog_info>()),
            Self::GetStatus => read_code(WDIOC_GETSTATUS, int_size),
            Self::GetBootStatus => read_code(WDIOC_GETBOOTSTATUS, int_size),
            Self::SetOptions(_) => read_code(WDIOC_SETOPTIONS, int_size),
            Self::KeepAlive => read_code(WDIOC_KEEPALIVE, int_size),
            Self::SetTimeout(_) => {
                request_code_readwrite!(WATCHDOG_IOCTL_BASE, WDIOC_SETTIMEOUT, int_size)
            }
            Self::GetTimeout => read_code(WDIOC_GETTIMEOUT, int_size),
        }
    }
}

fn read_code(nr: u8, size: usize) -> ioctl_num_type {
    request_code_read!(WATCHDOG_IOCTL_BASE, nr, size)
}

/// What an ioctl hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Filled `watchdog_info`.
    Support(watchdog_info),
    /// Integer written back through the argument pointer.
    Value(c_int),
    /// Nothing to return.
    Done,
}
