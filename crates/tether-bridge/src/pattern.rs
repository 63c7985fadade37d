//! Match patterns
//!
//! Byte-level search patterns as supplied by script code: space-separated
//! tokens of two hex nibbles, either of which may be the `?` wildcard
//! (`"13 37 ?? 4?"`). Compilation is the only part the bridge owns; the
//! scanning machinery lives in the instrumentation engine and consumes the
//! compiled form.

use crate::error::{BridgeError, BridgeResult};
use crate::scope::{AllocationKind, AllocationStats, Gauge};
use std::fmt;
use std::rc::Rc;

/// One compiled pattern byte: `candidate & mask == value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternByte {
    pub value: u8,
    pub mask: u8,
}

/// A compiled, refcounted match pattern.
pub struct MatchPattern {
    source: Box<str>,
    bytes: Vec<PatternByte>,
    _gauge: Gauge,
}

impl MatchPattern {
    /// Compile `source` into a pattern, registering it with the given
    /// allocation gauges. Fails with `InvalidPattern` on empty or malformed
    /// input.
    pub fn compile(source: &str, stats: &AllocationStats) -> BridgeResult<Rc<MatchPattern>> {
        let mut bytes = Vec::new();
        for token in source.split_whitespace() {
            bytes.push(parse_token(token)?);
        }
        if bytes.is_empty() {
            return Err(BridgeError::InvalidPattern);
        }
        Ok(Rc::new(MatchPattern {
            source: source.into(),
            bytes,
            _gauge: stats.gauge(AllocationKind::Pattern),
        }))
    }

    /// The text the pattern was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[PatternByte] {
        &self.bytes
    }

    /// Whether the window starting at `candidate` matches. The window must
    /// be at least `len()` bytes.
    pub fn matches_at(&self, candidate: &[u8]) -> bool {
        if candidate.len() < self.bytes.len() {
            return false;
        }
        self.bytes
            .iter()
            .zip(candidate)
            .all(|(p, b)| b & p.mask == p.value)
    }
}

impl fmt::Debug for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchPattern({:?})", self.source)
    }
}

fn parse_token(token: &str) -> BridgeResult<PatternByte> {
    let mut chars = token.chars();
    let (hi, lo) = match (chars.next(), chars.next(), chars.next()) {
        (Some(hi), Some(lo), None) => (hi, lo),
        _ => return Err(BridgeError::InvalidPattern),
    };
    let (hi_value, hi_mask) = parse_nibble(hi)?;
    let (lo_value, lo_mask) = parse_nibble(lo)?;
    Ok(PatternByte {
        value: (hi_value << 4) | lo_value,
        mask: (hi_mask << 4) | lo_mask,
    })
}

fn parse_nibble(c: char) -> BridgeResult<(u8, u8)> {
    if c == '?' {
        return Ok((0, 0));
    }
    match c.to_digit(16) {
        Some(digit) => Ok((digit as u8, 0xf)),
        None => Err(BridgeError::InvalidPattern),
    }
}

/// Script-side wrapper around a compiled pattern.
#[derive(Debug, Clone)]
pub struct PatternValue(Rc<MatchPattern>);

impl PatternValue {
    pub fn new(pattern: Rc<MatchPattern>) -> Self {
        PatternValue(pattern)
    }

    pub fn pattern(&self) -> &Rc<MatchPattern> {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> BridgeResult<Rc<MatchPattern>> {
        MatchPattern::compile(source, &AllocationStats::new())
    }

    #[test]
    fn test_compile_plain_bytes() {
        let p = compile("13 37").unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.bytes()[0], PatternByte { value: 0x13, mask: 0xff });
        assert!(p.matches_at(&[0x13, 0x37]));
        assert!(!p.matches_at(&[0x13, 0x38]));
    }

    #[test]
    fn test_compile_wildcards() {
        let p = compile("13 ?? 4?").unwrap();
        assert!(p.matches_at(&[0x13, 0xaa, 0x42]));
        assert!(p.matches_at(&[0x13, 0x00, 0x4f]));
        assert!(!p.matches_at(&[0x13, 0xaa, 0x52]));
    }

    #[test]
    fn test_compile_rejects_malformed_input() {
        assert!(matches!(compile(""), Err(BridgeError::InvalidPattern)));
    }

    #[test]
    fn test_compile_rejects_bad_tokens() {
        assert!(compile("1").is_err());
        assert!(compile("133").is_err());
        assert!(compile("zz").is_err());
        assert!(compile("   ").is_err());
    }

    #[test]
    fn test_window_too_short_never_matches() {
        let p = compile("aa bb cc").unwrap();
        assert!(!p.matches_at(&[0xaa, 0xbb]));
    }

    #[test]
    fn test_pattern_gauge() {
        let stats = AllocationStats::new();
        let p = MatchPattern::compile("00 11", &stats).unwrap();
        assert_eq!(stats.live_patterns(), 1);
        let extra_ref = Rc::clone(&p);
        assert_eq!(stats.live_patterns(), 1);
        drop(p);
        drop(extra_ref);
        assert_eq!(stats.live_patterns(), 0);
    }
}
