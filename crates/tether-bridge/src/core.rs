//! Runtime context
//!
//! [`Core`] is the spine every bridge component hangs off: the finalizer
//! registry, allocation gauges, external-memory accounting, the
//! pending-exception slot and the native/kernel resource sets. One `Core`
//! exists per scripting-engine execution context, owned and driven by the
//! engine thread.

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::exception;
use crate::heap::FinalizerRegistry;
use crate::registry::ResourceRecord;
use crate::scope::AllocationStats;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

pub(crate) struct CoreInner {
    pub(crate) config: BridgeConfig,
    pub(crate) stats: AllocationStats,
    pub(crate) heap: FinalizerRegistry,
    pub(crate) external_bytes: Cell<i64>,
    pub(crate) pending_exception: RefCell<Option<Value>>,
    pub(crate) native_resources: RefCell<HashMap<u64, ResourceRecord>>,
    pub(crate) kernel_resources: RefCell<HashMap<u64, ResourceRecord>>,
    pub(crate) next_resource_id: Cell<u64>,
}

impl CoreInner {
    pub(crate) fn adjust_external_memory(&self, delta: i64) {
        let total = self.external_bytes.get() + delta;
        self.external_bytes.set(total);
        trace!(delta, total, "adjusted external memory accounting");
    }
}

/// Per-execution-context runtime state.
///
/// Cloning is cheap and shares the context. Everything is single-threaded:
/// the engine thread owns the `Core` and every value created through it.
///
/// # Examples
///
/// ```
/// use tether_bridge::Core;
///
/// let core = Core::new();
/// assert_eq!(core.external_memory(), 0);
/// ```
#[derive(Clone)]
pub struct Core {
    inner: Rc<CoreInner>,
}

impl Core {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Core {
            inner: Rc::new(CoreInner {
                config,
                stats: AllocationStats::new(),
                heap: FinalizerRegistry::new(),
                external_bytes: Cell::new(0),
                pending_exception: RefCell::new(None),
                native_resources: RefCell::new(HashMap::new()),
                kernel_resources: RefCell::new(HashMap::new()),
                next_resource_id: Cell::new(1),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Live-allocation gauges for bridge-owned native allocations.
    pub fn stats(&self) -> &AllocationStats {
        &self.inner.stats
    }

    /// The finalizer registry backing GC-driven cleanup.
    pub fn finalizers(&self) -> &FinalizerRegistry {
        &self.inner.heap
    }

    /// Run pending finalizers for unreachable handles. The embedding engine
    /// calls this from its GC safepoints. Returns the number finalized.
    pub fn collect_garbage(&self) -> usize {
        self.inner.heap.collect()
    }

    /// Externally-allocated bytes currently reported to the engine's GC
    /// pressure heuristics.
    pub fn external_memory(&self) -> i64 {
        self.inner.external_bytes.get()
    }

    /// Report a change in externally-allocated memory to the engine. Larger
    /// totals should make the engine collect sooner.
    pub fn adjust_external_memory(&self, delta: i64) {
        self.inner.adjust_external_memory(delta);
    }

    /// Raise an exception value into the engine. A later throw replaces an
    /// earlier one that script code never observed.
    pub fn throw(&self, exception: Value) {
        *self.inner.pending_exception.borrow_mut() = Some(exception);
    }

    /// Raise a conversion failure as a script exception.
    pub fn throw_error(&self, error: &BridgeError) {
        self.throw(exception::error_value_new(&error.to_string()));
    }

    pub fn has_pending_exception(&self) -> bool {
        self.inner.pending_exception.borrow().is_some()
    }

    /// Fetch and clear the pending exception. The engine-binding layer calls
    /// this after a bridge entry point reports failure.
    pub fn take_exception(&self) -> Option<Value> {
        self.inner.pending_exception.borrow_mut().take()
    }

    pub(crate) fn inner(&self) -> &Rc<CoreInner> {
        &self.inner
    }

    pub(crate) fn next_resource_id(&self) -> u64 {
        let id = self.inner.next_resource_id.get();
        self.inner.next_resource_id.set(id + 1);
        id
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}
