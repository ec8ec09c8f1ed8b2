//! Implementation of the canonical identifier types.

use crate::{UuidError, UuidResult};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Canonical UUID representation (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is guaranteed to be in canonical form, so it can be
/// embedded in resource paths such as `audit/events/<id>.json` without further validation.
///
/// # Construction
/// - [`UuidService::new`] generates a fresh random (v4) identifier.
/// - [`UuidService::parse`] validates an externally supplied identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UuidService(Uuid);

impl Default for UuidService {
    fn default() -> Self {
        Self::new()
    }
}

impl UuidService {
    /// Generates a new random identifier in canonical form.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a UUID string that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not 32 lowercase hex characters.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid UUID '{}': {}", input, e)))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is exactly 32 characters of `0-9a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for UuidService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for UuidService {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UuidService::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for UuidService {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for UuidService {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        UuidService::parse(&s).map_err(serde::de::Error::custom)
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// UTC instant with millisecond precision, rendered as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wraps `instant`, truncating it to millisecond precision.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        let millis = instant.timestamp_millis();
        Self(DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(instant))
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.ends_with('Z') {
            return Err(UuidError::InvalidInput(format!(
                "Timestamp must end with 'Z': '{}'",
                s
            )));
        }
        let naive = NaiveDateTime::parse_from_str(&s[..s.len() - 1], "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| {
                UuidError::InvalidInput(format!("Invalid timestamp format '{}': {}", s, e))
            })?;
        Ok(Self::from_datetime(DateTime::<Utc>::from_naive_utc_and_offset(
            naive, Utc,
        )))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::from_str(&s).map_err(serde::de::Error::custom)
    }
}

static LAST_ISSUED: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

/// Issues process-wide strictly increasing timestamps.
///
/// If the wall clock has not advanced past the previously issued value, the new timestamp is the
/// previous one plus 1 ms. Records written by one process therefore never tie.
pub struct TimestampGenerator;

impl TimestampGenerator {
    pub fn now() -> Timestamp {
        let now = Timestamp::from_datetime(Utc::now()).0;
        let mut last = match LAST_ISSUED.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let issued = match *last {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(issued);
        Timestamp(issued)
    }
}

/// Lowercase hex SHA-256 digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    pub fn digest(bytes: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(Sha256::digest(bytes.as_ref())))
    }

    /// Validates a 64 character lowercase hex digest.
    pub fn parse(input: &str) -> UuidResult<Self> {
        let valid = input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(UuidError::InvalidInput(format!(
                "SHA-256 hash must be 64 lowercase hex characters, got: '{}'",
                input
            )));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` hex characters (clamped to the digest length).
    pub fn prefix(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Sha256Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Sha256Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha256Hash::parse(&s).map_err(serde::de::Error::custom)
    }
}
