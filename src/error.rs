//! Error types for the watch registry.

use std::io;
use thiserror::Error;

use crate::value::ValueKind;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Error type for the watch registry.
///
/// Scheduling outcomes (`WaitTimer`, `Loading`, `ReloadFamily`, ...) are not
/// errors; they travel as [`crate::family::Status`] values. `WatchError`
/// covers API misuse and single-operation failures.
#[derive(Error, Debug)]
pub enum WatchError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed watch pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Named family is not registered
    #[error("Unknown family: {0}")]
    UnknownFamily(String),

    /// Family with the same name already registered
    #[error("Family already registered: {0}")]
    DuplicateFamily(String),

    /// Value kinds do not agree
    #[error("Value kind mismatch: expected {expected:?}, got {found:?}")]
    KindMismatch { expected: ValueKind, found: ValueKind },

    /// Numeric conversion would not fit the target type
    #[error("Numeric overflow converting {0:?}")]
    Overflow(ValueKind),

    /// Text could not be parsed as a number
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation has no meaning for this value kind
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A family callback reported failure
    #[error("Family '{family}' failed: {reason}")]
    Family { family: String, reason: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}
