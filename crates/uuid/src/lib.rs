//! Identifier, timestamp and content-hash utilities.
//!
//! Governance records are addressed by identifiers embedded in resource paths, so every
//! identifier has exactly one canonical textual form:
//!
//! - [`UuidService`]: **32 lowercase hexadecimal characters** (no hyphens), used for grant ids
//!   and audit event ids. Example: `550e8400e29b41d4a716446655440000`.
//! - [`Timestamp`]: ISO 8601 UTC with millisecond precision and a `Z` suffix, for example
//!   `2026-10-18T09:15:02.123Z`. The fixed width makes plain string comparison chronological,
//!   which audit listing relies on.
//! - [`Sha256Hash`]: 64 lowercase hexadecimal characters.
//!
//! Non-canonical inputs (uppercase, hyphenated, wrong length, other offsets) are rejected rather
//! than normalised.

mod service;

pub use service::{Sha256Hash, Timestamp, TimestampGenerator, Uuid, UuidService};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
