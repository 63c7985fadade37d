//! Page protection flags
//!
//! The textual form is exactly three characters in fixed read/write/execute
//! order, each position either its letter or `-` (`"rwx"`, `"r-x"`, `"---"`).

use crate::error::{BridgeError, BridgeResult};
use crate::value::Value;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Memory page protection bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageProtection: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl PageProtection {
    /// The fixed-order specifier string.
    pub fn to_spec(self) -> String {
        let mut spec = ['-', '-', '-'];
        if self.contains(PageProtection::READ) {
            spec[0] = 'r';
        }
        if self.contains(PageProtection::WRITE) {
            spec[1] = 'w';
        }
        if self.contains(PageProtection::EXECUTE) {
            spec[2] = 'x';
        }
        spec.iter().collect()
    }
}

impl fmt::Display for PageProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}

/// Build the script-side protection string value.
pub fn protection_new(protection: PageProtection) -> Value {
    Value::string(&protection.to_spec())
}

/// Parse a protection specifier out of a script value.
pub fn protection_get(value: &Value) -> BridgeResult<PageProtection> {
    let text = match value {
        Value::String(s) => s,
        _ => {
            return Err(BridgeError::ExpectedType(
                "expected a string specifying memory protection",
            ))
        }
    };

    const INVALID: BridgeError =
        BridgeError::ExpectedType("invalid character in memory protection specifier string");

    let chars: Vec<char> = text.chars().collect();
    if chars.len() != 3 {
        return Err(INVALID);
    }

    let mut protection = PageProtection::empty();
    for (ch, letter, flag) in [
        (chars[0], 'r', PageProtection::READ),
        (chars[1], 'w', PageProtection::WRITE),
        (chars[2], 'x', PageProtection::EXECUTE),
    ] {
        if ch == letter {
            protection |= flag;
        } else if ch != '-' {
            return Err(INVALID);
        }
    }

    Ok(protection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_round_trip() {
        for spec in ["---", "r--", "-w-", "--x", "rw-", "r-x", "-wx", "rwx"] {
            let parsed = protection_get(&Value::string(spec)).unwrap();
            assert_eq!(parsed.to_spec(), spec);
        }
    }

    #[test]
    fn test_rejects_non_string() {
        assert_eq!(
            protection_get(&Value::Number(7.0)),
            Err(BridgeError::ExpectedType(
                "expected a string specifying memory protection"
            ))
        );
    }

    #[test]
    fn test_rejects_wrong_width_and_order() {
        assert!(protection_get(&Value::string("rw")).is_err());
        assert!(protection_get(&Value::string("rwxr")).is_err());
        // Positions are fixed: 'x' in the read slot is invalid.
        assert!(protection_get(&Value::string("xwr")).is_err());
        assert!(protection_get(&Value::string("rrr")).is_err());
    }

    #[test]
    fn test_protection_new_is_string_value() {
        let value = protection_new(PageProtection::READ | PageProtection::EXECUTE);
        match value {
            Value::String(s) => assert_eq!(&*s, "r-x"),
            other => panic!("expected string, got {}", other.type_name()),
        }
    }
}
