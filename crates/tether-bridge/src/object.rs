//! Result-object construction helpers
//!
//! Typed property setters used by the engine-binding layer to assemble
//! script result objects out of native values: plain integers become
//! numbers, 64-bit values and addresses become wrapper objects, enums become
//! their string nicknames, page protections become specifier strings.

use crate::marshal::{self, MemoryRange};
use crate::protect::{protection_new, PageProtection};
use crate::value::{Address, ScriptObject, Value};

pub fn set(object: &ScriptObject, key: &str, value: Value) {
    object.set(key, value);
}

pub fn set_int(object: &ScriptObject, key: &str, value: i32) {
    object.set(key, Value::Number(value as f64));
}

pub fn set_uint(object: &ScriptObject, key: &str, value: u32) {
    object.set(key, Value::Number(value as f64));
}

pub fn set_uint64(object: &ScriptObject, key: &str, value: u64) {
    object.set(key, marshal::uint64_new(value));
}

pub fn set_pointer(object: &ScriptObject, key: &str, address: Address) {
    object.set(key, marshal::pointer_new(address));
}

/// Set an enum property as its string nickname.
pub fn set_enum<T: Into<&'static str>>(object: &ScriptObject, key: &str, value: T) {
    object.set(key, Value::string(value.into()));
}

/// Set an ASCII string property. Callers pass known-ASCII literals; this is
/// the cheap path next to [`set_utf8`].
pub fn set_ascii(object: &ScriptObject, key: &str, value: &str) {
    debug_assert!(value.is_ascii());
    object.set(key, Value::string(value));
}

pub fn set_utf8(object: &ScriptObject, key: &str, value: &str) {
    object.set(key, Value::string(value));
}

pub fn set_page_protection(object: &ScriptObject, key: &str, protection: PageProtection) {
    object.set(key, protection_new(protection));
}

/// Build a `{ base, size, protection }` result object for a memory range.
pub fn range_value_new(range: &MemoryRange, protection: PageProtection) -> ScriptObject {
    let object = ScriptObject::new();
    set_pointer(&object, "base", range.base);
    set_uint(&object, "size", range.size as u32);
    set_page_protection(&object, "protection", protection);
    object
}
