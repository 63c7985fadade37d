//! Bridge error taxonomy
//!
//! Every conversion failure in the bridge maps to one of these variants. The
//! `Display` string is the script-visible exception message, so the literals
//! here are part of the user-facing contract and must stay stable.

use thiserror::Error;

/// Result alias used throughout the bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised while marshalling values between script and native code.
///
/// These are caller-input errors, not transient conditions: there is no retry
/// path. Each one surfaces as a catchable exception in the calling script.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A required argument slot had no corresponding value.
    #[error("missing argument")]
    MissingArgument,

    /// A value was present but had the wrong shape. Carries the exact
    /// message literal, e.g. `"expected a string"`.
    #[error("{0}")]
    ExpectedType(&'static str),

    /// A numeric value was out of representable range, fractional where an
    /// integer was required, or a lossy big-integer conversion.
    #[error("{0}")]
    ExpectedInteger(&'static str),

    /// A value could not be resolved to a native pointer.
    #[error("expected a pointer")]
    ExpectedPointer,

    /// Malformed hexadecimal or decimal text.
    #[error("{0}")]
    InvalidNumericString(&'static str),

    /// Byte-buffer coercion failed.
    #[error("unsupported data value")]
    UnsupportedDataValue,

    /// Match-pattern compilation failed.
    #[error("invalid match pattern")]
    InvalidPattern,

    /// An operation was applied to a value in the wrong state, e.g. a write
    /// through an immutable CPU-context handle.
    #[error("{0}")]
    InvalidOperation(&'static str),
}
