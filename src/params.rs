//! Driver parameters.
//!
//! The parameters are given the way module parameters are, as `name=value` words:
//! ```text
//! nowayout=1 timeout=30 early_enable=y signal=nmi
//! ```
//! A boolean parameter given without a value is switched on.

use crate::error::{Error, Result};
use crate::signal::Signal;
use crate::timeout::{TimeoutSeconds, DEFAULT_TIMEOUT};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// The watchdog cannot be stopped once started.
    /// Defaults to the `nowayout` cargo feature.
    pub nowayout: bool,
    /// Watchdog timeout in seconds, 1..=512.
    pub timeout: u32,
    /// Arm the watchdog when the driver is initialised instead of on first open.
    pub early_enable: bool,
    /// Recovery action on expiry.
    pub signal: Signal,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            nowayout: cfg!(feature = "nowayout"),
            timeout: DEFAULT_TIMEOUT,
            early_enable: false,
            signal: Signal::default(),
        }
    }
}

impl Params {
    /// Parses a whitespace separated parameter line.
    pub fn parse(line: &str) -> Result<Self> {
        Self::from_args(line.split_whitespace())
    }

    /// Builds parameters from `name=value` words, starting from the defaults.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::default();
        for arg in args {
            params.apply(arg.as_ref())?;
        }
        Ok(params)
    }

    /// Applies a single `name=value` word.
    pub fn apply(&mut self, arg: &str) -> Result<()> {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (arg.trim(), "y"),
        };
        match name {
            "nowayout" => self.nowayout = parse_bool(name, value)?,
            // `wdt_timeout` is the name older setups use.
            "timeout" | "wdt_timeout" => {
                self.timeout = value
                    .parse()
                    .map_err(|_| Error::invalid_parameter(name, value))?
            }
            "early_enable" => self.early_enable = parse_bool(name, value)?,
            "signal" => self.signal = value.parse()?,
            _ => return Err(Error::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// The configured timeout, checked against the hardware range.
    pub fn timeout_seconds(&self) -> Result<TimeoutSeconds> {
        TimeoutSeconds::new(self.timeout)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "nowayout={} timeout={} early_enable={} signal={}",
            u8::from(self.nowayout),
            self.timeout,
            u8::from(self.early_enable),
            self.signal
        )
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "true" | "on" => Ok(true),
        "0" | "n" | "no" | "false" | "off" => Ok(false),
        _ => Err(Error::invalid_parameter(name, value)),
    }
}
