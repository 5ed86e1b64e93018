//! # Canonical port keys.
//!
//! [`PortKey`] is the single representation used for every registry lookup,
//! event and channel name. It can only be constructed through validation, so
//! holding one proves the value is in `1..=65535`.
//!
//! Callers hand ports in whatever form they have (`u16`, `u32`, `"8545"`); the
//! [`IntoPortKey`] conversion is the port-format validator used by the
//! supervisor before it touches anything.
//!
//! ```
//! use nodevisor::{IntoPortKey, PortKey};
//!
//! assert_eq!(PortKey::parse(" 8545 ").unwrap().get(), 8545);
//! assert!("abc".into_port_key().is_err());
//! assert!(0u32.into_port_key().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::SupervisorError;

/// Validated TCP port (`1..=65535`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortKey(u16);

impl PortKey {
    /// Creates a key from a raw number; `None` for `0`.
    pub fn new(port: u16) -> Option<Self> {
        (port != 0).then_some(Self(port))
    }

    /// Parses a decimal port number, ignoring surrounding whitespace.
    ///
    /// Signs, empty strings, non-digits, `0` and values over 65535 are rejected.
    pub fn parse(input: &str) -> Result<Self, SupervisorError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(input));
        }
        trimmed
            .parse::<u16>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| invalid(input))
    }

    /// Returns the numeric port.
    #[inline]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PortKey {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(input: impl fmt::Display) -> SupervisorError {
    SupervisorError::InvalidPort {
        input: input.to_string(),
    }
}

/// Conversion of caller-supplied port values into a [`PortKey`].
pub trait IntoPortKey {
    /// Validates and converts the value.
    fn into_port_key(self) -> Result<PortKey, SupervisorError>;
}

impl IntoPortKey for PortKey {
    fn into_port_key(self) -> Result<PortKey, SupervisorError> {
        Ok(self)
    }
}

impl IntoPortKey for &str {
    fn into_port_key(self) -> Result<PortKey, SupervisorError> {
        PortKey::parse(self)
    }
}

impl IntoPortKey for String {
    fn into_port_key(self) -> Result<PortKey, SupervisorError> {
        PortKey::parse(&self)
    }
}

impl IntoPortKey for &String {
    fn into_port_key(self) -> Result<PortKey, SupervisorError> {
        PortKey::parse(self)
    }
}

macro_rules! int_into_port_key {
    ($($t:ty),*) => {$(
        impl IntoPortKey for $t {
            fn into_port_key(self) -> Result<PortKey, SupervisorError> {
                u16::try_from(self)
                    .ok()
                    .and_then(PortKey::new)
                    .ok_or_else(|| invalid(self))
            }
        }
    )*};
}

int_into_port_key!(u16, u32, u64, usize, i32, i64);
