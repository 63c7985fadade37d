//! Finalizer registry — the GC bridge
//!
//! The scripting engine decides when a handle becomes unreachable; native
//! cleanup must follow exactly once. This module is the abstract capability
//! the rest of the bridge depends on: register a finalizer against a
//! handle's reachability, and let the engine pump [`collect`] from its GC
//! safepoints.
//!
//! Reachability is probed through `std::rc::Weak`: a handle is dead once its
//! last strong reference is gone. Finalizers run on the engine thread, never
//! concurrently with script code, and are restricted to native-side
//! bookkeeping — they must not allocate script values.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{debug, warn};

struct FinalizerEntry {
    dead: Box<dyn Fn() -> bool>,
    finalize: Option<Box<dyn FnOnce()>>,
}

/// Registry of pending finalizers.
#[derive(Default)]
pub struct FinalizerRegistry {
    entries: RefCell<Vec<FinalizerEntry>>,
}

impl FinalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `finalize` to run once `target` has no strong references
    /// left. The registry holds only a weak reference; registration does not
    /// keep the target alive.
    pub fn register_finalizer<T: 'static>(
        &self,
        target: &Rc<T>,
        finalize: impl FnOnce() + 'static,
    ) {
        let probe = Rc::downgrade(target);
        self.entries.borrow_mut().push(FinalizerEntry {
            dead: Box::new(move || probe.strong_count() == 0),
            finalize: Some(Box::new(finalize)),
        });
    }

    /// Number of finalizers not yet run.
    pub fn pending(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Run the finalizers of all dead targets. Called by the embedding
    /// engine at its GC safepoints; tests call it directly.
    ///
    /// Returns the number of finalizers that ran. A panicking finalizer is
    /// contained and logged; it never propagates into the engine.
    pub fn collect(&self) -> usize {
        // Dead entries are moved out before any finalizer runs, so the
        // entry list is not borrowed while user callbacks execute.
        let mut ready = Vec::new();
        {
            let mut entries = self.entries.borrow_mut();
            let mut index = 0;
            while index < entries.len() {
                if (entries[index].dead)() {
                    ready.push(entries.swap_remove(index));
                } else {
                    index += 1;
                }
            }
        }

        let count = ready.len();
        for mut entry in ready {
            if let Some(finalize) = entry.finalize.take() {
                if panic::catch_unwind(AssertUnwindSafe(finalize)).is_err() {
                    warn!("finalizer panicked; continuing");
                }
            }
        }
        if count > 0 {
            debug!(finalized = count, "collected dead handles");
        }
        count
    }
}
