//! Error type of the controller.

use std::fmt;
use nix::errno::Errno;

/// Errors reported by the controller and its configuration layer.
///
/// Warnings that are not failures (pinging a stopped watchdog, closing the device
/// without the magic character) are not errors: they are logged and reported
/// through [`PingOutcome`](crate::PingOutcome) and [`CloseOutcome`](crate::CloseOutcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested timeout is outside the 1..=512 seconds range of the hardware.
    TimeoutOutOfRange {
        /// The value that was rejected.
        requested: i64,
    },
    /// A configuration parameter has a value that cannot be parsed.
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },
    /// A configuration parameter that the driver does not know.
    UnknownParameter(String),
}

impl Error {
    pub(crate) fn invalid_parameter(name: &str, value: &str) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TimeoutOutOfRange { requested } => write!(
                f,
                "Timeout {requested} out of range ({} <= timeout <= {})",
                crate::timeout::MIN_TIMEOUT,
                crate::timeout::MAX_TIMEOUT
            ),
            Self::InvalidParameter { name, value } => {
                write!(f, "Invalid value '{value}' for parameter '{name}'")
            }
            Self::UnknownParameter(name) => write!(f, "Unknown parameter '{name}'"),
        }
    }
}

impl std::error::Error for Error {}

/// All controller errors are argument errors as far as a device caller is concerned.
impl From<Error> for Errno {
    fn from(_: Error) -> Self {
        Errno::EINVAL
    }
}

pub type Result<T> = std::result::Result<T, Error>;
