//! Two-letter country codes used to bucket endpoints

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid country code '{0}': expected two letters or 'unknown'")]
pub struct CountryCodeError(pub String);

/// Country of an endpoint
///
/// ISO codes are stored lowercase. `Unknown` is used when neither the file's
/// metadata nor its name carry a code, and sorts after every real code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CountryCode {
    Iso([u8; 2]),
    Unknown,
}

impl CountryCode {
    /// Build a code from two ASCII letters, ignoring case
    pub fn from_letters(a: u8, b: u8) -> Option<Self> {
        if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() {
            Some(CountryCode::Iso([a.to_ascii_lowercase(), b.to_ascii_lowercase()]))
        } else {
            None
        }
    }

    /// Country prefix of an endpoint file stem
    ///
    /// `nl-01`, `us_ny_3`, `ch.example` and `de` all yield a code; `node-1`
    /// and `3x-01` do not.
    pub fn from_name_prefix(stem: &str) -> Option<Self> {
        let bytes = stem.as_bytes();
        if bytes.len() < 2 {
            return None;
        }
        match bytes.get(2) {
            None | Some(b'-') | Some(b'_') | Some(b'.') => Self::from_letters(bytes[0], bytes[1]),
            Some(_) => None,
        }
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountryCode::Iso([a, b]) => write!(f, "{}{}", *a as char, *b as char),
            CountryCode::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for CountryCode {
    type Err = CountryCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(CountryCode::Unknown);
        }
        match trimmed.as_bytes() {
            [a, b] => Self::from_letters(*a, *b).ok_or_else(|| CountryCodeError(s.to_string())),
            _ => Err(CountryCodeError(s.to_string())),
        }
    }
}
