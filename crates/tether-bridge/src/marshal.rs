//! Numeric, pointer and buffer marshalling
//!
//! Bidirectional conversion between native fixed-width integers/pointers and
//! the script value space, which only has double-precision numbers (exact to
//! 2^53), arbitrary-precision integers, and wrapper objects.
//!
//! Two conversion modes exist for the 64-bit and pointer types:
//! - *get* (exact): already-typed numeric or wrapper values only
//! - *parse* (fuzzy): additionally accepts textual forms — hexadecimal with
//!   a mandatory `0x` prefix, or bare decimal; no other base is recognized
//!
//! Constructors always produce a fresh wrapper object; callers that need
//! identity-stable wrappers must cache at a higher layer.

use crate::core::Core;
use crate::error::{BridgeError, BridgeResult};
use crate::scope::RangeList;
use crate::value::{Address, ByteBuffer, Int64Value, PointerValue, UInt64Value, Value};

/// A contiguous native memory range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub base: Address,
    pub size: usize,
}

/// Signed 32-bit conversion. Accepts an integral number in range or a
/// lossless big integer in range.
pub fn int_get(value: &Value) -> BridgeResult<i32> {
    match value {
        Value::Number(n)
            if n.fract() == 0.0 && *n >= i32::MIN as f64 && *n <= i32::MAX as f64 =>
        {
            Ok(*n as i32)
        }
        Value::BigInt(b) if *b >= i32::MIN as i128 && *b <= i32::MAX as i128 => Ok(*b as i32),
        _ => Err(BridgeError::ExpectedInteger("expected an integer")),
    }
}

/// Unsigned 32-bit conversion.
pub fn uint_get(value: &Value) -> BridgeResult<u32> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64 => {
            Ok(*n as u32)
        }
        Value::BigInt(b) if *b >= 0 && *b <= u32::MAX as i128 => Ok(*b as u32),
        _ => Err(BridgeError::ExpectedInteger("expected an unsigned integer")),
    }
}

/// Signed 64-bit exact get: a number (truncated to integer), a lossless big
/// integer, or a boxed signed 64-bit wrapper.
pub fn int64_get(value: &Value) -> BridgeResult<i64> {
    match value {
        Value::Number(n) => Ok(*n as i64),
        Value::BigInt(b) => i64::try_from(*b)
            .map_err(|_| BridgeError::ExpectedInteger("expected an integer")),
        Value::Int64(v) => Ok(v.get()),
        _ => Err(BridgeError::ExpectedInteger("expected an integer")),
    }
}

/// Signed 64-bit fuzzy parse: as [`int64_get`], plus hex/decimal strings.
pub fn int64_parse(value: &Value) -> BridgeResult<i64> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                i64::from_str_radix(hex, 16)
                    .map_err(|_| BridgeError::InvalidNumericString("invalid hexadecimal string"))
            } else {
                i64::from_str_radix(s, 10)
                    .map_err(|_| BridgeError::InvalidNumericString("invalid hexadecimal string"))
            }
        }
        _ => int64_get(value),
    }
}

/// Unsigned 64-bit exact get.
pub fn uint64_get(value: &Value) -> BridgeResult<u64> {
    match value {
        Value::Number(n) if *n >= 0.0 => Ok(*n as u64),
        Value::BigInt(b) => u64::try_from(*b)
            .map_err(|_| BridgeError::ExpectedInteger("expected an unsigned integer")),
        Value::UInt64(v) => Ok(v.get()),
        _ => Err(BridgeError::ExpectedInteger("expected an unsigned integer")),
    }
}

/// Unsigned 64-bit fuzzy parse.
pub fn uint64_parse(value: &Value) -> BridgeResult<u64> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16)
                    .map_err(|_| BridgeError::InvalidNumericString("invalid hexadecimal string"))
            } else {
                u64::from_str_radix(s, 10)
                    .map_err(|_| BridgeError::InvalidNumericString("invalid hexadecimal string"))
            }
        }
        _ => uint64_get(value),
    }
}

/// Unsigned pointer-width size. Accepts either boxed wrapper; the signed one
/// must carry a non-negative value.
pub fn size_get(value: &Value) -> BridgeResult<usize> {
    const EXPECTED: BridgeError = BridgeError::ExpectedInteger("expected an unsigned integer");
    match value {
        Value::Number(n) if *n >= 0.0 => Ok(*n as u64 as usize),
        Value::BigInt(b) => {
            let wide = u64::try_from(*b).map_err(|_| EXPECTED)?;
            usize::try_from(wide).map_err(|_| EXPECTED)
        }
        Value::UInt64(v) => usize::try_from(v.get()).map_err(|_| EXPECTED),
        Value::Int64(v) if v.get() >= 0 => usize::try_from(v.get() as u64).map_err(|_| EXPECTED),
        _ => Err(EXPECTED),
    }
}

/// Signed pointer-width size. The unsigned wrapper is reinterpreted as
/// two's-complement.
pub fn ssize_get(value: &Value) -> BridgeResult<isize> {
    const EXPECTED: BridgeError = BridgeError::ExpectedInteger("expected an integer");
    match value {
        Value::Number(n) => Ok(*n as i64 as isize),
        Value::BigInt(b) => {
            let wide = i64::try_from(*b).map_err(|_| EXPECTED)?;
            isize::try_from(wide).map_err(|_| EXPECTED)
        }
        Value::Int64(v) => isize::try_from(v.get()).map_err(|_| EXPECTED),
        Value::UInt64(v) => Ok(v.get() as i64 as isize),
        _ => Err(EXPECTED),
    }
}

/// Exact pointer get: a boxed pointer, or any object exposing a `handle`
/// property that resolves (one unwrap deep) to a boxed pointer.
pub fn pointer_get(value: &Value) -> BridgeResult<Address> {
    match value {
        Value::Pointer(p) => Ok(p.address()),
        Value::Object(object) => match object.get("handle") {
            Some(Value::Pointer(p)) => Ok(p.address()),
            _ => Err(BridgeError::ExpectedPointer),
        },
        _ => Err(BridgeError::ExpectedPointer),
    }
}

/// Fuzzy pointer parse: as [`pointer_get`], plus hex/decimal strings, plain
/// numbers (negative ones reinterpreted as two's-complement addresses), big
/// integers, and either boxed 64-bit wrapper.
pub fn pointer_parse(value: &Value) -> BridgeResult<Address> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16)
                    .map_err(|_| BridgeError::InvalidNumericString("invalid hexadecimal string"))
            } else {
                u64::from_str_radix(s, 10)
                    .map_err(|_| BridgeError::InvalidNumericString("invalid decimal string"))
            }
        }
        Value::Number(n) => {
            if *n < 0.0 {
                Ok((*n as i64) as u64)
            } else {
                Ok(*n as u64)
            }
        }
        Value::BigInt(b) => Ok(*b as u64),
        Value::UInt64(v) => Ok(v.get()),
        Value::Int64(v) => Ok(v.get() as u64),
        _ => pointer_get(value),
    }
}

/// Fresh boxed signed 64-bit value.
pub fn int64_new(value: i64) -> Value {
    Value::Int64(Int64Value::new(value))
}

/// Fresh boxed unsigned 64-bit value.
pub fn uint64_new(value: u64) -> Value {
    Value::UInt64(UInt64Value::new(value))
}

/// Fresh boxed pointer value.
pub fn pointer_new(address: Address) -> Value {
    Value::Pointer(PointerValue::new(address))
}

/// Exact byte-buffer get: binary-buffer values only.
pub fn bytes_get(value: &Value) -> BridgeResult<ByteBuffer> {
    bytes_try_get(value).ok_or(BridgeError::UnsupportedDataValue)
}

/// Fuzzy byte-buffer parse: as [`bytes_get`], plus a UTF-8 string (its raw
/// bytes) or a numeric array with at most `max_array_bytes` elements, each
/// an integral value in `[0, 255]`. A single bad element fails the whole
/// conversion; no partial buffer is produced.
pub fn bytes_parse(value: &Value, core: &Core) -> BridgeResult<ByteBuffer> {
    match value {
        Value::String(s) => Ok(ByteBuffer::tracked(s.as_bytes().to_vec(), core.stats())),
        Value::Array(array) => {
            let length = array.len();
            if length > core.config().max_array_bytes {
                return Err(BridgeError::UnsupportedDataValue);
            }
            let mut data = Vec::with_capacity(length);
            for index in 0..length {
                let element = array.get(index).unwrap_or(Value::Undefined);
                data.push(byte_from_element(&element)?);
            }
            Ok(ByteBuffer::tracked(data, core.stats()))
        }
        _ => bytes_get(value),
    }
}

fn bytes_try_get(value: &Value) -> Option<ByteBuffer> {
    match value {
        Value::Bytes(bytes) => Some(bytes.clone()),
        _ => None,
    }
}

fn byte_from_element(element: &Value) -> BridgeResult<u8> {
    match element {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= 255.0 => Ok(*n as u8),
        Value::BigInt(b) if (0..=255).contains(b) => Ok(*b as u8),
        _ => Err(BridgeError::UnsupportedDataValue),
    }
}

/// Parse a `{ base, size }` range object.
pub fn memory_range_get(value: &Value) -> BridgeResult<MemoryRange> {
    let object = match value {
        Value::Object(object) => object,
        _ => return Err(BridgeError::ExpectedType("expected a range object")),
    };

    let base = pointer_get(&object.get("base").unwrap_or(Value::Undefined))?;

    let size = match object.get("size") {
        Some(Value::Number(n)) if n.fract() == 0.0 && n >= 0.0 && n <= u32::MAX as f64 => {
            n as usize
        }
        _ => {
            return Err(BridgeError::ExpectedType(
                "range object has an invalid or missing size property",
            ))
        }
    };

    Ok(MemoryRange { base, size })
}

/// Parse one range object or an array of them into a staged range list.
pub fn memory_ranges_get(value: &Value, core: &Core) -> BridgeResult<RangeList> {
    match value {
        Value::Array(array) => {
            let mut ranges = Vec::with_capacity(array.len());
            for index in 0..array.len() {
                let element = array.get(index).unwrap_or(Value::Undefined);
                ranges.push(memory_range_get(&element)?);
            }
            Ok(RangeList::tracked(ranges, core.stats()))
        }
        Value::Object(_) => {
            let range = memory_range_get(value)?;
            Ok(RangeList::tracked(vec![range], core.stats()))
        }
        _ => Err(BridgeError::ExpectedType(
            "expected a range object or an array of range objects",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScriptObject;

    #[test]
    fn test_int_get_accepts_integral_number() {
        assert_eq!(int_get(&Value::Number(42.0)), Ok(42));
        assert_eq!(int_get(&Value::Number(-42.0)), Ok(-42));
        assert_eq!(int_get(&Value::BigInt(-7)), Ok(-7));
    }

    #[test]
    fn test_int_get_rejects_fractional_and_out_of_range() {
        assert!(int_get(&Value::Number(1.5)).is_err());
        assert!(int_get(&Value::Number(3e9)).is_err());
        assert!(int_get(&Value::BigInt(i64::MAX as i128)).is_err());
        assert!(int_get(&Value::string("42")).is_err());
    }

    #[test]
    fn test_uint_get_rejects_negative() {
        assert_eq!(uint_get(&Value::Number(7.0)), Ok(7));
        assert!(uint_get(&Value::Number(-1.0)).is_err());
        assert!(uint_get(&Value::BigInt(-1)).is_err());
    }

    #[test]
    fn test_int64_get_paths() {
        assert_eq!(int64_get(&Value::Number(-3.0)), Ok(-3));
        // Numbers truncate; only the wrapper and BigInt paths are lossless.
        assert_eq!(int64_get(&Value::Number(1.9)), Ok(1));
        assert_eq!(int64_get(&Value::BigInt(1 << 60)), Ok(1 << 60));
        assert_eq!(int64_get(&Value::Int64(Int64Value::new(i64::MIN))), Ok(i64::MIN));
        assert!(int64_get(&Value::UInt64(UInt64Value::new(1))).is_err());
        assert!(int64_get(&Value::BigInt(i128::from(i64::MAX) + 1)).is_err());
    }

    #[test]
    fn test_int64_parse_strings() {
        assert_eq!(int64_parse(&Value::string("0x10")), Ok(16));
        assert_eq!(int64_parse(&Value::string("-16")), Ok(-16));
        assert_eq!(
            int64_parse(&Value::string("0x")),
            Err(BridgeError::InvalidNumericString("invalid hexadecimal string"))
        );
        assert_eq!(
            int64_parse(&Value::string("")),
            Err(BridgeError::InvalidNumericString("invalid hexadecimal string"))
        );
    }

    #[test]
    fn test_uint64_above_double_precision() {
        // 2^53 + 1 is not representable as f64; the BigInt and wrapper paths
        // must carry it exactly.
        let value = (1u64 << 53) + 1;
        assert_eq!(uint64_get(&Value::BigInt(value as i128)), Ok(value));
        assert_eq!(uint64_get(&Value::UInt64(UInt64Value::new(value))), Ok(value));
        assert_eq!(uint64_parse(&Value::string("0x20000000000001")), Ok(value));
        assert_eq!(uint64_parse(&Value::string("9007199254740993")), Ok(value));
    }

    #[test]
    fn test_uint64_get_rejects_negative_number() {
        assert!(uint64_get(&Value::Number(-1.0)).is_err());
        assert!(uint64_get(&Value::Int64(Int64Value::new(1))).is_err());
    }

    #[test]
    fn test_size_get_accepts_either_wrapper() {
        assert_eq!(size_get(&Value::UInt64(UInt64Value::new(128))), Ok(128));
        assert_eq!(size_get(&Value::Int64(Int64Value::new(128))), Ok(128));
        assert!(size_get(&Value::Int64(Int64Value::new(-1))).is_err());
    }

    #[test]
    fn test_ssize_get_reinterprets_unsigned_wrapper() {
        assert_eq!(ssize_get(&Value::Int64(Int64Value::new(-5))), Ok(-5));
        assert_eq!(ssize_get(&Value::UInt64(UInt64Value::new(u64::MAX))), Ok(-1));
    }

    #[test]
    fn test_pointer_get_wrapper_and_handle_unwrap() {
        assert_eq!(pointer_get(&pointer_new(0x1000)), Ok(0x1000));

        let wrapper = ScriptObject::new();
        wrapper.set("handle", pointer_new(0xdead));
        assert_eq!(pointer_get(&Value::Object(wrapper)), Ok(0xdead));

        // One unwrap deep only: handle -> object -> handle is rejected.
        let outer = ScriptObject::new();
        let inner = ScriptObject::new();
        inner.set("handle", pointer_new(0xbeef));
        outer.set("handle", Value::Object(inner));
        assert_eq!(pointer_get(&Value::Object(outer)), Err(BridgeError::ExpectedPointer));

        assert_eq!(pointer_get(&Value::Number(4096.0)), Err(BridgeError::ExpectedPointer));
    }

    #[test]
    fn test_pointer_parse_textual_forms() {
        assert_eq!(pointer_parse(&Value::string("0x1000")), Ok(4096));
        assert_eq!(pointer_parse(&Value::string("4096")), Ok(4096));
        assert_eq!(
            pointer_parse(&Value::string("0xzz")),
            Err(BridgeError::InvalidNumericString("invalid hexadecimal string"))
        );
        assert_eq!(
            pointer_parse(&Value::string("four")),
            Err(BridgeError::InvalidNumericString("invalid decimal string"))
        );
    }

    #[test]
    fn test_pointer_parse_negative_number_is_twos_complement() {
        assert_eq!(pointer_parse(&Value::Number(-1.0)), Ok(u64::MAX));
        assert_eq!(pointer_parse(&Value::Number(-4096.0)), Ok(u64::MAX - 4095));
    }

    #[test]
    fn test_pointer_parse_numeric_paths() {
        assert_eq!(pointer_parse(&Value::Number(4096.0)), Ok(4096));
        assert_eq!(pointer_parse(&Value::BigInt(0x1234)), Ok(0x1234));
        assert_eq!(pointer_parse(&Value::UInt64(UInt64Value::new(u64::MAX))), Ok(u64::MAX));
        assert_eq!(pointer_parse(&Value::Int64(Int64Value::new(-1))), Ok(u64::MAX));
    }

    #[test]
    fn test_bytes_parse_from_string() {
        let core = Core::new();
        let bytes = bytes_parse(&Value::string("abc"), &core).unwrap();
        assert_eq!(bytes.as_slice(), b"abc");
    }

    #[test]
    fn test_bytes_parse_array_rejects_bad_elements() {
        let core = Core::new();
        let array = crate::value::ValueArray::from_vec(vec![
            Value::Number(1.0),
            Value::Number(256.0),
        ]);
        assert_eq!(
            bytes_parse(&Value::Array(array), &core),
            Err(BridgeError::UnsupportedDataValue)
        );

        let array = crate::value::ValueArray::from_vec(vec![Value::string("1")]);
        assert_eq!(
            bytes_parse(&Value::Array(array), &core),
            Err(BridgeError::UnsupportedDataValue)
        );
    }

    #[test]
    fn test_bytes_get_exact_mode() {
        let buffer = ByteBuffer::from_vec(vec![1, 2]);
        assert!(bytes_get(&Value::Bytes(buffer)).is_ok());
        assert_eq!(
            bytes_get(&Value::string("not fuzzy")),
            Err(BridgeError::UnsupportedDataValue)
        );
    }

    #[test]
    fn test_memory_range_get() {
        let object = ScriptObject::new();
        object.set("base", pointer_new(0x4000));
        object.set("size", Value::Number(512.0));
        assert_eq!(
            memory_range_get(&Value::Object(object)),
            Ok(MemoryRange { base: 0x4000, size: 512 })
        );
    }

    #[test]
    fn test_memory_range_get_errors() {
        assert_eq!(
            memory_range_get(&Value::Number(1.0)),
            Err(BridgeError::ExpectedType("expected a range object"))
        );

        let object = ScriptObject::new();
        object.set("base", pointer_new(0x4000));
        assert_eq!(
            memory_range_get(&Value::Object(object)),
            Err(BridgeError::ExpectedType(
                "range object has an invalid or missing size property"
            ))
        );

        let object = ScriptObject::new();
        object.set("size", Value::Number(16.0));
        assert_eq!(
            memory_range_get(&Value::Object(object)),
            Err(BridgeError::ExpectedPointer)
        );
    }
}
