//! Tether Bridge - script ⇄ native marshalling core
//!
//! This library is the marshalling bridge between a native instrumentation
//! engine and an embedded, garbage-collected scripting runtime:
//! - Format-driven argument parsing with transactional rollback
//! - Numeric/pointer conversion across the 2^53 double-precision boundary
//! - GC-driven native resource cleanup via a finalizer registry
//! - CPU-context snapshot lifetimes across event boundaries
//! - Native error ⇄ script exception marshalling
//!
//! The instrumentation engine and the scripting engine itself are external
//! collaborators: the bridge only converts values, tracks native lifetimes
//! and reports errors across that one trust boundary.

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod args;
pub mod config;
pub mod core;
pub mod cpu;
pub mod error;
pub mod exception;
pub mod heap;
pub mod marshal;
pub mod object;
pub mod pattern;
pub mod protect;
pub mod registry;
pub mod scope;
pub mod value;

// Re-export commonly used types
pub use args::{
    CallbackSpec, NamedCallback, ParsedArg, ParsedArgs, ParsedCallback, Signature, SignatureError,
};
pub use config::{BridgeConfig, ConfigError, ConfigResult, DEFAULT_MAX_ARRAY_BYTES};
pub use crate::core::Core;
pub use cpu::{CpuContext, CpuContextValue};
pub use error::{BridgeError, BridgeResult};
pub use exception::{
    error_message_from_value, error_value_from_native, error_value_new, ExceptionDetails,
    ExceptionKind, MemoryAccessDetails, MemoryOperation, NativeError, ThreadState,
};
pub use heap::FinalizerRegistry;
pub use marshal::MemoryRange;
pub use pattern::{MatchPattern, PatternByte, PatternValue};
pub use protect::PageProtection;
pub use registry::DestroyNotify;
pub use scope::{AllocationStats, NativeString, ParseScope, RangeList};
pub use value::{
    Address, ByteBuffer, FunctionRef, Int64Value, PointerValue, ScriptObject, UInt64Value, Value,
    ValueArray,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        // Smoke test to verify the crate builds and tests run
        assert_eq!(VERSION, "0.1.0");
    }
}
