//! Transactional parse scope
//!
//! Argument parsing stages every intermediate native allocation (duplicated
//! strings, byte buffers, range lists, match patterns) in a [`ParseScope`].
//! On full parse success the scope is committed and becomes inert; if the
//! scope is dropped without commit, every staged allocation is released
//! through its destructor. An allocation is staged in exactly one collection
//! and never released twice.
//!
//! [`AllocationStats`] keeps live-allocation gauges so rollback is observable
//! from tests and from memory-pressure diagnostics.

use crate::core::Core;
use crate::marshal::MemoryRange;
use crate::pattern::MatchPattern;
use crate::value::ByteBuffer;
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use tracing::trace;

/// The four kinds of allocation a parse can stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    String,
    ByteBuffer,
    RangeList,
    Pattern,
}

#[derive(Default)]
pub(crate) struct StatsInner {
    strings: Cell<usize>,
    byte_buffers: Cell<usize>,
    range_lists: Cell<usize>,
    patterns: Cell<usize>,
}

impl StatsInner {
    fn counter(&self, kind: AllocationKind) -> &Cell<usize> {
        match kind {
            AllocationKind::String => &self.strings,
            AllocationKind::ByteBuffer => &self.byte_buffers,
            AllocationKind::RangeList => &self.range_lists,
            AllocationKind::Pattern => &self.patterns,
        }
    }
}

/// Live-allocation counters for bridge-owned native allocations.
///
/// Cloning shares the underlying counters. Each tracked allocation holds a
/// [`Gauge`] that decrements its counter exactly once on destruction, so a
/// counter reads the number of such allocations currently alive.
#[derive(Clone, Default)]
pub struct AllocationStats {
    inner: Rc<StatsInner>,
}

impl AllocationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_strings(&self) -> usize {
        self.inner.strings.get()
    }

    pub fn live_byte_buffers(&self) -> usize {
        self.inner.byte_buffers.get()
    }

    pub fn live_range_lists(&self) -> usize {
        self.inner.range_lists.get()
    }

    pub fn live_patterns(&self) -> usize {
        self.inner.patterns.get()
    }

    /// Sum of all four gauges.
    pub fn live_total(&self) -> usize {
        self.live_strings() + self.live_byte_buffers() + self.live_range_lists()
            + self.live_patterns()
    }

    pub(crate) fn gauge(&self, kind: AllocationKind) -> Gauge {
        let counter = self.inner.counter(kind);
        counter.set(counter.get() + 1);
        Gauge {
            stats: Some((Rc::clone(&self.inner), kind)),
        }
    }
}

/// Decrements its [`AllocationStats`] counter exactly once, on drop.
pub(crate) struct Gauge {
    stats: Option<(Rc<StatsInner>, AllocationKind)>,
}

impl Gauge {
    /// A gauge that counts nothing. Used for allocations created outside any
    /// runtime context, e.g. literal buffers in tests.
    pub(crate) fn untracked() -> Self {
        Gauge { stats: None }
    }
}

impl Drop for Gauge {
    fn drop(&mut self) {
        if let Some((inner, kind)) = self.stats.take() {
            let counter = inner.counter(kind);
            counter.set(counter.get().saturating_sub(1));
        }
    }
}

struct StrInner {
    text: Box<str>,
    _gauge: Gauge,
}

/// A duplicated script string handed to native code.
///
/// Refcounted; the final clone dropping releases the allocation and its
/// gauge.
#[derive(Clone)]
pub struct NativeString(Rc<StrInner>);

impl NativeString {
    pub(crate) fn tracked(text: &str, stats: &AllocationStats) -> Self {
        NativeString(Rc::new(StrInner {
            text: text.into(),
            _gauge: stats.gauge(AllocationKind::String),
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0.text
    }
}

impl Deref for NativeString {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0.text, f)
    }
}

impl PartialEq<str> for NativeString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for NativeString {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

struct RangesInner {
    ranges: Vec<MemoryRange>,
    _gauge: Gauge,
}

/// A parsed list of memory ranges.
#[derive(Clone)]
pub struct RangeList(Rc<RangesInner>);

impl RangeList {
    pub(crate) fn tracked(ranges: Vec<MemoryRange>, stats: &AllocationStats) -> Self {
        RangeList(Rc::new(RangesInner {
            ranges,
            _gauge: stats.gauge(AllocationKind::RangeList),
        }))
    }

    pub fn as_slice(&self) -> &[MemoryRange] {
        &self.0.ranges
    }

    pub fn len(&self) -> usize {
        self.0.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.ranges.is_empty()
    }
}

impl fmt::Debug for RangeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Staging area for allocations created while parsing one argument list.
///
/// Mirrors the lifecycle in the module docs: stage during the parse,
/// [`commit`](ParseScope::commit) on success, rollback on drop otherwise.
/// The staged clones keep every allocation alive until the commit decision
/// even when a later conversion fails.
pub struct ParseScope {
    stats: AllocationStats,
    committed: bool,
    strings: Vec<NativeString>,
    range_lists: Vec<RangeList>,
    byte_buffers: Vec<ByteBuffer>,
    patterns: Vec<Rc<MatchPattern>>,
}

impl ParseScope {
    pub fn new(core: &Core) -> Self {
        ParseScope {
            stats: core.stats().clone(),
            committed: false,
            strings: Vec::new(),
            range_lists: Vec::new(),
            byte_buffers: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Duplicate a script string into a staged native allocation.
    pub fn strdup(&mut self, text: &str) -> NativeString {
        let result = NativeString::tracked(text, &self.stats);
        self.strings.push(result.clone());
        result
    }

    pub fn add_bytes(&mut self, bytes: ByteBuffer) {
        self.byte_buffers.push(bytes);
    }

    pub fn add_range_list(&mut self, ranges: RangeList) {
        self.range_lists.push(ranges);
    }

    /// Stage a pattern reference. Compiled patterns and re-referenced
    /// existing patterns both go through here.
    pub fn add_pattern(&mut self, pattern: Rc<MatchPattern>) {
        self.patterns.push(pattern);
    }

    /// Number of allocations currently staged.
    pub fn staged_len(&self) -> usize {
        self.strings.len() + self.range_lists.len() + self.byte_buffers.len()
            + self.patterns.len()
    }

    /// Mark the parse as successful. Staged allocations stay alive through
    /// the references already handed to the parse output; the scope itself
    /// becomes inert.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ParseScope {
    fn drop(&mut self) {
        if !self.committed && self.staged_len() > 0 {
            trace!(staged = self.staged_len(), "rolling back parse scope");
        }
        // Dropping the staged vectors releases each allocation through its
        // own destructor; committed scopes hold no unique references.
    }
}
