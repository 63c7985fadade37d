//! Format-driven argument parsing
//!
//! A call arrives from the scripting engine with an argument list and a
//! target native operation. The binding layer describes the expected shape
//! with a compact format string, compiled once at registration time into a
//! [`Signature`]; per call, [`Signature::parse_args`] walks the compiled
//! slots and the argument list in lockstep, converting each argument into a
//! typed native value.
//!
//! Tag alphabet:
//!
//! | tag | output | modifiers |
//! |-----|--------|-----------|
//! | `i` / `u` | i32 / u32 | |
//! | `q` / `Q` | i64 / u64 | `~` fuzzy |
//! | `z` / `Z` | isize / usize | |
//! | `n` / `t` | f64 / bool | |
//! | `p` | address | `~` fuzzy |
//! | `X` | raw external handle | |
//! | `s` | string | `?` nullable |
//! | `r` / `R` | memory range / range list | |
//! | `m` | page protection | |
//! | `V` | raw value | |
//! | `O` / `A` | object / array | `?` nullable |
//! | `F` | callback | `*` also accepts pointer, `?` nullable, `{a,b?}` named list |
//! | `B` | byte buffer | `~` fuzzy, `?` nullable |
//! | `C` | CPU context | `?` nullable |
//! | `M` | match pattern | |
//! | `\|` | tags after it are optional | |
//!
//! Modifiers are part of the preceding tag and never consume an argument.
//! A missing argument (or the explicit `Undefined` sentinel) at a required
//! tag fails with `MissingArgument`; at an optional tag it stops processing
//! without error. The first conversion failure is raised into the engine and
//! aborts the parse; the transactional scope guarantees nothing staged by
//! earlier tags leaks.

use crate::core::Core;
use crate::cpu::CpuContextValue;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{self, MemoryRange};
use crate::pattern::{MatchPattern, PatternValue};
use crate::protect::{self, PageProtection};
use crate::scope::{NativeString, ParseScope, RangeList};
use crate::value::{Address, ByteBuffer, FunctionRef, ScriptObject, Value, ValueArray};
use smallvec::SmallVec;
use thiserror::Error;

/// Malformed format strings are registration-time errors, caught when the
/// binding layer compiles its signatures, never at call time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unknown argument tag '{0}'")]
    UnknownTag(char),

    #[error("unterminated callback list")]
    UnterminatedCallbackList,

    #[error("empty callback name")]
    EmptyCallbackName,

    #[error("duplicate optional separator")]
    DuplicateOptionalSeparator,
}

/// One named entry of an `F{...}` callback list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSpec {
    pub name: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotKind {
    Int,
    Uint,
    Number,
    Boolean,
    Int64 { fuzzy: bool },
    Uint64 { fuzzy: bool },
    SSize,
    Size,
    Pointer { fuzzy: bool },
    External,
    Str { nullable: bool },
    Range,
    RangeArray,
    Protection,
    Raw,
    Object { nullable: bool },
    Array { nullable: bool },
    Callback { accepts_pointer: bool, nullable: bool },
    CallbackObject { accepts_pointer: bool, callbacks: Vec<CallbackSpec> },
    Bytes { fuzzy: bool, nullable: bool },
    CpuContext { nullable: bool },
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    kind: SlotKind,
    required: bool,
}

/// A compiled argument format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    slots: SmallVec<[Slot; 8]>,
}

impl Signature {
    /// Compile a format string. Done once, at registration time.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_bridge::Signature;
    ///
    /// let sig = Signature::parse("pZ|s?").unwrap();
    /// assert_eq!(sig.slot_count(), 3);
    /// ```
    pub fn parse(format: &str) -> Result<Signature, SignatureError> {
        let chars: Vec<char> = format.chars().collect();
        let mut slots = SmallVec::new();
        let mut required = true;
        let mut i = 0;

        while i < chars.len() {
            let tag = chars[i];
            i += 1;

            if tag == '|' {
                if !required {
                    return Err(SignatureError::DuplicateOptionalSeparator);
                }
                required = false;
                continue;
            }

            let kind = match tag {
                'i' => SlotKind::Int,
                'u' => SlotKind::Uint,
                'n' => SlotKind::Number,
                't' => SlotKind::Boolean,
                'q' => SlotKind::Int64 { fuzzy: eat(&chars, &mut i, '~') },
                'Q' => SlotKind::Uint64 { fuzzy: eat(&chars, &mut i, '~') },
                'z' => SlotKind::SSize,
                'Z' => SlotKind::Size,
                'p' => SlotKind::Pointer { fuzzy: eat(&chars, &mut i, '~') },
                'X' => SlotKind::External,
                's' => SlotKind::Str { nullable: eat(&chars, &mut i, '?') },
                'r' => SlotKind::Range,
                'R' => SlotKind::RangeArray,
                'm' => SlotKind::Protection,
                'V' => SlotKind::Raw,
                'O' => SlotKind::Object { nullable: eat(&chars, &mut i, '?') },
                'A' => SlotKind::Array { nullable: eat(&chars, &mut i, '?') },
                'F' => parse_callback_slot(&chars, &mut i)?,
                'B' => {
                    let fuzzy = eat(&chars, &mut i, '~');
                    let nullable = eat(&chars, &mut i, '?');
                    SlotKind::Bytes { fuzzy, nullable }
                }
                'C' => SlotKind::CpuContext { nullable: eat(&chars, &mut i, '?') },
                'M' => SlotKind::Pattern,
                other => return Err(SignatureError::UnknownTag(other)),
            };

            slots.push(Slot { kind, required });
        }

        Ok(Signature { slots })
    }

    /// Number of argument-consuming slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots that must be satisfied.
    pub fn required_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.required).count()
    }

    /// Parse an argument list against this signature.
    ///
    /// On success every processed slot has a corresponding entry in the
    /// returned [`ParsedArgs`], in format order, and all staged allocations
    /// are committed. On failure the error has already been raised into the
    /// engine, nothing staged survives, and no output is produced.
    pub fn parse_args(&self, core: &Core, args: &[Value]) -> BridgeResult<ParsedArgs> {
        let mut scope = ParseScope::new(core);
        let mut values = Vec::with_capacity(self.slots.len());
        let mut index = 0;

        for slot in &self.slots {
            let arg = match args.get(index) {
                Some(value) if !value.is_undefined() => value,
                _ => {
                    if slot.required {
                        let error = BridgeError::MissingArgument;
                        core.throw_error(&error);
                        return Err(error);
                    }
                    break;
                }
            };

            match convert(&slot.kind, arg, core, &mut scope) {
                Ok(parsed) => values.push(parsed),
                Err(error) => {
                    core.throw_error(&error);
                    return Err(error);
                }
            }

            index += 1;
        }

        scope.commit();
        Ok(ParsedArgs { values })
    }
}

fn eat(chars: &[char], i: &mut usize, modifier: char) -> bool {
    if chars.get(*i) == Some(&modifier) {
        *i += 1;
        true
    } else {
        false
    }
}

fn parse_callback_slot(chars: &[char], i: &mut usize) -> Result<SlotKind, SignatureError> {
    let accepts_pointer = eat(chars, i, '*');

    if !eat(chars, i, '{') {
        let nullable = eat(chars, i, '?');
        return Ok(SlotKind::Callback {
            accepts_pointer,
            nullable,
        });
    }

    let mut callbacks = Vec::new();
    loop {
        let mut name = String::new();
        while let Some(&c) = chars.get(*i) {
            if c == ',' || c == '}' {
                break;
            }
            name.push(c);
            *i += 1;
        }
        let terminator = match chars.get(*i) {
            Some(&c) => c,
            None => return Err(SignatureError::UnterminatedCallbackList),
        };
        *i += 1;

        let optional = name.ends_with('?');
        if optional {
            name.pop();
        }
        if name.is_empty() {
            return Err(SignatureError::EmptyCallbackName);
        }
        callbacks.push(CallbackSpec { name, optional });

        if terminator == '}' {
            break;
        }
    }

    Ok(SlotKind::CallbackObject {
        accepts_pointer,
        callbacks,
    })
}

/// A parsed callback slot: a script function, a raw native function
/// pointer, or (for nullable/optional entries) neither.
#[derive(Debug, Clone, Default)]
pub struct ParsedCallback {
    pub function: Option<FunctionRef>,
    pub native: Option<Address>,
}

/// One entry of a parsed `F{...}` callback list.
#[derive(Debug, Clone)]
pub struct NamedCallback {
    pub name: String,
    pub callback: ParsedCallback,
}

/// A converted argument, one per processed slot.
#[derive(Debug, Clone)]
pub enum ParsedArg {
    Int(i32),
    Uint(u32),
    Number(f64),
    Boolean(bool),
    Int64(i64),
    Uint64(u64),
    SSize(isize),
    Size(usize),
    Pointer(Address),
    External(Address),
    Str(Option<NativeString>),
    Range(MemoryRange),
    Ranges(RangeList),
    Protection(PageProtection),
    Raw(Value),
    Object(Option<ScriptObject>),
    Array(Option<ValueArray>),
    Callback(ParsedCallback),
    Callbacks(Vec<NamedCallback>),
    Bytes(Option<ByteBuffer>),
    CpuContext(Option<CpuContextValue>),
    Pattern(PatternValue),
}

impl ParsedArg {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParsedArg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            ParsedArg::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParsedArg::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParsedArg::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match self {
            ParsedArg::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint64(&self) -> Option<u64> {
        match self {
            ParsedArg::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_size(&self) -> Option<usize> {
        match self {
            ParsedArg::Size(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Address> {
        match self {
            ParsedArg::Pointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParsedArg::Str(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ParsedArg::Bytes(Some(b)) => Some(b.as_slice()),
            _ => None,
        }
    }
}

/// Output of a successful parse: the converted arguments in format order.
#[derive(Debug)]
pub struct ParsedArgs {
    values: Vec<ParsedArg>,
}

impl ParsedArgs {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParsedArg> {
        self.values.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParsedArg> {
        self.values.iter()
    }
}

impl std::ops::Index<usize> for ParsedArgs {
    type Output = ParsedArg;

    fn index(&self, index: usize) -> &ParsedArg {
        &self.values[index]
    }
}

fn convert(
    kind: &SlotKind,
    arg: &Value,
    core: &Core,
    scope: &mut ParseScope,
) -> BridgeResult<ParsedArg> {
    match kind {
        SlotKind::Int => Ok(ParsedArg::Int(marshal::int_get(arg)?)),

        SlotKind::Uint => Ok(ParsedArg::Uint(marshal::uint_get(arg)?)),

        SlotKind::Number => match arg {
            Value::Number(n) => Ok(ParsedArg::Number(*n)),
            _ => Err(BridgeError::ExpectedType("expected a number")),
        },

        SlotKind::Boolean => match arg {
            Value::Bool(b) => Ok(ParsedArg::Boolean(*b)),
            _ => Err(BridgeError::ExpectedType("expected a boolean")),
        },

        SlotKind::Int64 { fuzzy } => {
            let value = if *fuzzy {
                marshal::int64_parse(arg)?
            } else {
                marshal::int64_get(arg)?
            };
            Ok(ParsedArg::Int64(value))
        }

        SlotKind::Uint64 { fuzzy } => {
            let value = if *fuzzy {
                marshal::uint64_parse(arg)?
            } else {
                marshal::uint64_get(arg)?
            };
            Ok(ParsedArg::Uint64(value))
        }

        SlotKind::SSize => Ok(ParsedArg::SSize(marshal::ssize_get(arg)?)),

        SlotKind::Size => Ok(ParsedArg::Size(marshal::size_get(arg)?)),

        SlotKind::Pointer { fuzzy } => {
            let address = if *fuzzy {
                marshal::pointer_parse(arg)?
            } else {
                marshal::pointer_get(arg)?
            };
            Ok(ParsedArg::Pointer(address))
        }

        SlotKind::External => match arg {
            Value::External(address) => Ok(ParsedArg::External(*address)),
            _ => Err(BridgeError::ExpectedType("expected an external pointer")),
        },

        SlotKind::Str { nullable } => match arg {
            Value::Null if *nullable => Ok(ParsedArg::Str(None)),
            Value::String(s) => Ok(ParsedArg::Str(Some(scope.strdup(s)))),
            _ => Err(BridgeError::ExpectedType("expected a string")),
        },

        SlotKind::Range => Ok(ParsedArg::Range(marshal::memory_range_get(arg)?)),

        SlotKind::RangeArray => {
            let ranges = marshal::memory_ranges_get(arg, core)?;
            scope.add_range_list(ranges.clone());
            Ok(ParsedArg::Ranges(ranges))
        }

        SlotKind::Protection => Ok(ParsedArg::Protection(protect::protection_get(arg)?)),

        SlotKind::Raw => Ok(ParsedArg::Raw(arg.clone())),

        SlotKind::Object { nullable } => match arg {
            Value::Null if *nullable => Ok(ParsedArg::Object(None)),
            Value::Object(object) => Ok(ParsedArg::Object(Some(object.clone()))),
            _ => Err(BridgeError::ExpectedType("expected an object")),
        },

        SlotKind::Array { nullable } => match arg {
            Value::Array(array) => Ok(ParsedArg::Array(Some(array.clone()))),
            Value::Null if *nullable => Ok(ParsedArg::Array(None)),
            _ => Err(BridgeError::ExpectedType("expected an array")),
        },

        SlotKind::Callback {
            accepts_pointer,
            nullable,
        } => Ok(ParsedArg::Callback(convert_callback(
            arg,
            *accepts_pointer,
            *nullable,
        )?)),

        SlotKind::CallbackObject {
            accepts_pointer,
            callbacks,
        } => Ok(ParsedArg::Callbacks(convert_callback_object(
            arg,
            *accepts_pointer,
            callbacks,
        )?)),

        SlotKind::Bytes { fuzzy, nullable } => match arg {
            Value::Null if *nullable => Ok(ParsedArg::Bytes(None)),
            _ => {
                let bytes = if *fuzzy {
                    marshal::bytes_parse(arg, core)?
                } else {
                    marshal::bytes_get(arg)?
                };
                scope.add_bytes(bytes.clone());
                Ok(ParsedArg::Bytes(Some(bytes)))
            }
        },

        SlotKind::CpuContext { nullable } => match arg {
            Value::Null if *nullable => Ok(ParsedArg::CpuContext(None)),
            Value::CpuContext(context) => Ok(ParsedArg::CpuContext(Some(context.clone()))),
            _ => Err(BridgeError::ExpectedType("expected a CpuContext object")),
        },

        SlotKind::Pattern => match arg {
            Value::String(s) => {
                let pattern = MatchPattern::compile(s, core.stats())?;
                scope.add_pattern(pattern.clone());
                Ok(ParsedArg::Pattern(PatternValue::new(pattern)))
            }
            Value::Pattern(existing) => {
                let pattern = existing.pattern().clone();
                scope.add_pattern(pattern.clone());
                Ok(ParsedArg::Pattern(PatternValue::new(pattern)))
            }
            _ => Err(BridgeError::ExpectedType(
                "expected either a pattern string or a MatchPattern object",
            )),
        },
    }
}

fn convert_callback(
    arg: &Value,
    accepts_pointer: bool,
    nullable: bool,
) -> BridgeResult<ParsedCallback> {
    match arg {
        Value::Function(function) => Ok(ParsedCallback {
            function: Some(function.clone()),
            native: None,
        }),
        Value::Null if nullable => Ok(ParsedCallback::default()),
        Value::Pointer(pointer) if accepts_pointer => Ok(ParsedCallback {
            function: None,
            native: Some(pointer.address()),
        }),
        _ => Err(BridgeError::ExpectedType("expected a function")),
    }
}

fn convert_callback_object(
    arg: &Value,
    accepts_pointer: bool,
    specs: &[CallbackSpec],
) -> BridgeResult<Vec<NamedCallback>> {
    let object = match arg {
        Value::Object(object) => object,
        _ => {
            return Err(BridgeError::ExpectedType(
                "expected an object containing callbacks",
            ))
        }
    };

    let mut callbacks = Vec::with_capacity(specs.len());
    for spec in specs {
        let value = object.get(&spec.name).unwrap_or(Value::Undefined);
        let callback = match value {
            Value::Function(function) => ParsedCallback {
                function: Some(function),
                native: None,
            },
            Value::Undefined if spec.optional => ParsedCallback::default(),
            Value::Pointer(pointer) if accepts_pointer => ParsedCallback {
                function: None,
                native: Some(pointer.address()),
            },
            _ => return Err(BridgeError::ExpectedType("expected a callback value")),
        };
        callbacks.push(NamedCallback {
            name: spec.name.clone(),
            callback,
        });
    }

    Ok(callbacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PointerValue;

    #[test]
    fn test_signature_counts() {
        let sig = Signature::parse("ius|tn").unwrap();
        assert_eq!(sig.slot_count(), 5);
        assert_eq!(sig.required_count(), 3);
    }

    #[test]
    fn test_signature_modifiers_belong_to_tags() {
        let sig = Signature::parse("q~Q~p~s?B~?O?A?C?").unwrap();
        assert_eq!(sig.slot_count(), 8);
    }

    #[test]
    fn test_signature_callback_sub_grammar() {
        let sig = Signature::parse("pF*{onEnter?,onLeave?}").unwrap();
        assert_eq!(sig.slot_count(), 2);
        match &sig.slots[1].kind {
            SlotKind::CallbackObject {
                accepts_pointer,
                callbacks,
            } => {
                assert!(accepts_pointer);
                assert_eq!(
                    callbacks.as_slice(),
                    &[
                        CallbackSpec { name: "onEnter".into(), optional: true },
                        CallbackSpec { name: "onLeave".into(), optional: true },
                    ]
                );
            }
            other => panic!("unexpected slot: {other:?}"),
        }
    }

    #[test]
    fn test_signature_rejects_unknown_tag() {
        assert_eq!(Signature::parse("ix"), Err(SignatureError::UnknownTag('x')));
    }

    #[test]
    fn test_signature_rejects_unterminated_callback_list() {
        assert_eq!(
            Signature::parse("F{onEnter"),
            Err(SignatureError::UnterminatedCallbackList)
        );
        assert_eq!(
            Signature::parse("F{}"),
            Err(SignatureError::EmptyCallbackName)
        );
    }

    #[test]
    fn test_signature_rejects_double_separator() {
        assert_eq!(
            Signature::parse("i|u|t"),
            Err(SignatureError::DuplicateOptionalSeparator)
        );
    }

    #[test]
    fn test_parse_args_simple() {
        let core = Core::new();
        let sig = Signature::parse("iun").unwrap();
        let parsed = sig
            .parse_args(
                &core,
                &[Value::Number(-3.0), Value::Number(4.0), Value::Number(1.5)],
            )
            .unwrap();
        assert_eq!(parsed[0].as_int(), Some(-3));
        assert_eq!(parsed[1].as_uint(), Some(4));
        assert_eq!(parsed[2].as_number(), Some(1.5));
    }

    #[test]
    fn test_parse_args_missing_required() {
        let core = Core::new();
        let sig = Signature::parse("ii").unwrap();
        let result = sig.parse_args(&core, &[Value::Number(1.0)]);
        assert_eq!(result.unwrap_err(), BridgeError::MissingArgument);
        assert!(core.has_pending_exception());
    }

    #[test]
    fn test_parse_args_undefined_counts_as_missing() {
        let core = Core::new();
        let sig = Signature::parse("i").unwrap();
        let result = sig.parse_args(&core, &[Value::Undefined]);
        assert_eq!(result.unwrap_err(), BridgeError::MissingArgument);
    }

    #[test]
    fn test_parse_args_optional_boundary_stops_cleanly() {
        let core = Core::new();
        let sig = Signature::parse("i|ut").unwrap();
        let parsed = sig.parse_args(&core, &[Value::Number(9.0)]).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!core.has_pending_exception());

        // A supplied optional argument is still converted and checked.
        let result = sig.parse_args(&core, &[Value::Number(9.0), Value::string("no")]);
        assert!(result.is_err());
        core.take_exception();
    }

    #[test]
    fn test_parse_args_positional_callback() {
        let core = Core::new();
        let sig = Signature::parse("F*?").unwrap();

        let parsed = sig
            .parse_args(&core, &[Value::Function(FunctionRef::new("cb"))])
            .unwrap();
        match &parsed[0] {
            ParsedArg::Callback(cb) => {
                assert_eq!(cb.function.as_ref().map(|f| f.name()), Some("cb"));
                assert_eq!(cb.native, None);
            }
            other => panic!("unexpected parse: {other:?}"),
        }

        let parsed = sig
            .parse_args(&core, &[Value::Pointer(PointerValue::new(0x1234))])
            .unwrap();
        match &parsed[0] {
            ParsedArg::Callback(cb) => {
                assert!(cb.function.is_none());
                assert_eq!(cb.native, Some(0x1234));
            }
            other => panic!("unexpected parse: {other:?}"),
        }

        let parsed = sig.parse_args(&core, &[Value::Null]).unwrap();
        match &parsed[0] {
            ParsedArg::Callback(cb) => {
                assert!(cb.function.is_none() && cb.native.is_none());
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_args_pointer_without_star_rejects_pointer_callback() {
        let core = Core::new();
        let sig = Signature::parse("F").unwrap();
        let result = sig.parse_args(&core, &[Value::Pointer(PointerValue::new(0x1))]);
        assert_eq!(
            result.unwrap_err(),
            BridgeError::ExpectedType("expected a function")
        );
        core.take_exception();
    }
}
