//! Exception and error marshalling
//!
//! Native error conditions become catchable script exceptions, and script
//! errors can be re-surfaced as native messages. Message casing follows the
//! long-standing convention: native messages are lower-case-first, so the
//! first character is lower-cased on the way in — unless the first two
//! characters are both uppercase, the heuristic for acronyms ("URL ..."),
//! in which case the message passes through verbatim. The inverse extraction
//! upper-cases the first character. The two-character check is deliberate
//! and must not be widened.

use crate::core::Core;
use crate::cpu::{CpuContext, CpuContextValue};
use crate::object;
use crate::value::{Address, ScriptObject, Value};
use std::fmt;
use strum::IntoStaticStr;
use thiserror::Error;

/// An error reported by the instrumentation engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NativeError {
    message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        NativeError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

/// Kind of a native exception event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ExceptionKind {
    Abort,
    AccessViolation,
    GuardPage,
    IllegalInstruction,
    StackOverflow,
    Arithmetic,
    Breakpoint,
    SingleStep,
    System,
}

/// Memory operation that triggered an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum MemoryOperation {
    Invalid,
    Read,
    Write,
    Execute,
}

/// Scheduling state of a native thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ThreadState {
    Running,
    Stopped,
    Waiting,
    Uninterruptible,
    Halted,
}

/// Memory access that caused an exception event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccessDetails {
    pub operation: MemoryOperation,
    pub address: Address,
}

/// A native exception event as delivered by the instrumentation engine.
#[derive(Debug, Clone)]
pub struct ExceptionDetails {
    pub kind: ExceptionKind,
    pub address: Address,
    pub memory: Option<MemoryAccessDetails>,
    pub context: CpuContext,
    pub native_context: Address,
}

impl fmt::Display for ExceptionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nick: &'static str = self.kind.into();
        let words = nick.replace('-', " ");
        match &self.memory {
            Some(memory) => write!(f, "{} accessing {:#x}", words, memory.address),
            None => write!(f, "{} at {:#x}", words, self.address),
        }
    }
}

/// Build a plain script exception object carrying `message` verbatim.
pub fn error_value_new(message: &str) -> Value {
    let exception = ScriptObject::new();
    object::set_utf8(&exception, "message", message);
    Value::Object(exception)
}

/// Convert a native error into a script exception value, applying the
/// casing convention described in the module docs.
pub fn error_value_from_native(error: NativeError) -> Value {
    let message = error.into_message();
    let adjusted = if probably_starts_with_acronym(&message) {
        message
    } else {
        lower_first(&message)
    };
    error_value_new(&adjusted)
}

/// Extract a script error's message for re-surfacing as a native error:
/// the first character is upper-cased.
pub fn error_message_from_value(value: &Value) -> String {
    let message = error_message_raw(value).unwrap_or_default();
    upper_first(&message)
}

/// The `message` property of a script error object, verbatim.
pub fn error_message_raw(value: &Value) -> Option<String> {
    match value {
        Value::Object(object) => match object.get("message") {
            Some(Value::String(s)) => Some(s.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn probably_starts_with_acronym(message: &str) -> bool {
    let mut chars = message.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase()
    )
}

fn lower_first(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn upper_first(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Core {
    /// Throw `error` if present. A present error is consumed exactly once:
    /// converted, thrown, and released. Returns whether anything was thrown.
    pub fn maybe_throw(&self, error: Option<NativeError>) -> bool {
        match error {
            Some(error) => {
                self.throw(error_value_from_native(error));
                true
            }
            None => false,
        }
    }

    /// Build the script exception object for a native exception event,
    /// together with the mutable CPU-context handle embedded in it.
    ///
    /// The object carries `message`, `type` (kind nickname), `address`,
    /// an optional `memory { operation, address }`, `context` and
    /// `nativeContext`.
    ///
    /// # Safety
    ///
    /// The returned context handle aliases `details.context`. `details` must
    /// stay valid until the handle is dropped or detached; throwing through
    /// [`Core::throw_native`] handles that automatically.
    pub unsafe fn exception_value_new(
        &self,
        details: &mut ExceptionDetails,
    ) -> (Value, CpuContextValue) {
        let exception = ScriptObject::new();
        object::set_utf8(&exception, "message", &details.to_string());
        object::set_enum(&exception, "type", details.kind);
        object::set_pointer(&exception, "address", details.address);

        if let Some(memory) = &details.memory {
            let memory_object = ScriptObject::new();
            object::set_enum(&memory_object, "operation", memory.operation);
            object::set_pointer(&memory_object, "address", memory.address);
            object::set(&exception, "memory", Value::Object(memory_object));
        }

        let context = CpuContextValue::new_mutable(&mut details.context);
        object::set(&exception, "context", Value::CpuContext(context.clone()));
        object::set_pointer(&exception, "nativeContext", details.native_context);

        (Value::Object(exception), context)
    }

    /// Throw a native exception event into script. The embedded CPU context
    /// is detached from the event storage before the throw, so the exception
    /// object stays valid after the event is torn down.
    pub fn throw_native(&self, details: &mut ExceptionDetails) {
        let (exception, context) = unsafe { self.exception_value_new(details) };
        self.cpu_context_free_later(&context);
        self.throw(exception);
    }
}
