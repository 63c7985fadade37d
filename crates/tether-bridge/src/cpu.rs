//! CPU-context snapshots
//!
//! Register state captured at an interception or exception event, exposed to
//! script through a handle with two observable states:
//!
//! - **mutable**: aliases the live register storage owned by the
//!   instrumentation engine; writes land in the state about to be restored.
//!   Valid only for the duration of the originating synchronous callback.
//! - **immutable**: read-only. Either still aliasing transient engine
//!   memory, or owning a private copy that lives as long as the handle.
//!
//! When an event is torn down while script code may still hold the handle,
//! [`Core::cpu_context_free_later`] deep-copies the aliased register file
//! into owned storage, re-points the handle and clears mutability. The owned
//! copy is freed exactly once, by `Drop`.

use crate::core::Core;
use crate::error::{BridgeError, BridgeResult};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Native register file. Architecture-neutral projection: program counter,
/// stack pointer, flags and sixteen general-purpose registers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuContext {
    pub pc: u64,
    pub sp: u64,
    pub flags: u64,
    pub gpr: [u64; 16],
}

enum Backing {
    /// Aliases live engine-owned register storage; writable.
    Mutable(*mut CpuContext),
    /// Aliases transient engine-owned storage; read-only.
    Aliased(*const CpuContext),
    /// Private copy owned by the handle.
    Owned(Box<CpuContext>),
}

pub(crate) struct CpuContextCell {
    backing: RefCell<Backing>,
}

/// Script-side handle to a CPU-context snapshot.
#[derive(Clone)]
pub struct CpuContextValue(pub(crate) Rc<CpuContextCell>);

impl CpuContextValue {
    /// Wrap live register storage for the duration of a synchronous event.
    ///
    /// # Safety
    ///
    /// `context` must be valid and not aliased elsewhere until the handle is
    /// either dropped or detached via [`Core::cpu_context_free_later`].
    pub unsafe fn new_mutable(context: *mut CpuContext) -> Self {
        CpuContextValue(Rc::new(CpuContextCell {
            backing: RefCell::new(Backing::Mutable(context)),
        }))
    }

    /// Wrap transient register storage read-only.
    ///
    /// # Safety
    ///
    /// `context` must be valid until the handle is dropped or detached.
    pub unsafe fn new_immutable(context: *const CpuContext) -> Self {
        CpuContextValue(Rc::new(CpuContextCell {
            backing: RefCell::new(Backing::Aliased(context)),
        }))
    }

    /// Snapshot that owns its storage from the start.
    pub fn from_owned(context: CpuContext) -> Self {
        CpuContextValue(Rc::new(CpuContextCell {
            backing: RefCell::new(Backing::Owned(Box::new(context))),
        }))
    }

    pub fn is_mutable(&self) -> bool {
        matches!(*self.0.backing.borrow(), Backing::Mutable(_))
    }

    pub fn is_owned(&self) -> bool {
        matches!(*self.0.backing.borrow(), Backing::Owned(_))
    }

    /// Copy the current register values out of the snapshot.
    pub fn read(&self) -> CpuContext {
        self.with(|context| *context)
    }

    /// Run `f` against the snapshot's register file.
    pub fn with<R>(&self, f: impl FnOnce(&CpuContext) -> R) -> R {
        let backing = self.0.backing.borrow();
        match &*backing {
            // Validity is the constructor's safety contract.
            Backing::Mutable(ptr) => f(unsafe { &**ptr }),
            Backing::Aliased(ptr) => f(unsafe { &**ptr }),
            Backing::Owned(context) => f(context),
        }
    }

    /// Run `f` against the live register file. Fails on an immutable
    /// snapshot.
    pub fn try_with_mut<R>(&self, f: impl FnOnce(&mut CpuContext) -> R) -> BridgeResult<R> {
        let backing = self.0.backing.borrow();
        match &*backing {
            Backing::Mutable(ptr) => Ok(f(unsafe { &mut **ptr })),
            _ => Err(BridgeError::InvalidOperation(
                "invalid operation on an immutable cpu context",
            )),
        }
    }

    /// Whether script code still holds references beyond the one the
    /// originating event owns.
    pub fn is_retained(&self) -> bool {
        Rc::strong_count(&self.0) > 1
    }

    /// Detach from engine-owned storage: copy the register file into owned
    /// storage, re-point the handle and clear mutability. No-op when the
    /// snapshot already owns its storage.
    pub fn detach(&self) {
        let mut backing = self.0.backing.borrow_mut();
        let copied = match &*backing {
            Backing::Mutable(ptr) => unsafe { **ptr },
            Backing::Aliased(ptr) => unsafe { **ptr },
            Backing::Owned(_) => return,
        };
        *backing = Backing::Owned(Box::new(copied));
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for CpuContextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.0.backing.borrow() {
            Backing::Mutable(_) => "mutable",
            Backing::Aliased(_) => "immutable/aliased",
            Backing::Owned(_) => "immutable/owned",
        };
        write!(f, "CpuContextValue({state})")
    }
}

impl Core {
    /// Tear-down hook for event-scoped snapshots: capture the aliased
    /// register file into owned storage before the originating native event
    /// goes away. Call this when the synchronous callback returns and the
    /// handle may have been retained by script code.
    pub fn cpu_context_free_later(&self, context: &CpuContextValue) {
        context.detach();
    }

    /// Fresh script value wrapping a snapshot handle.
    pub fn cpu_context_value(&self, context: CpuContextValue) -> Value {
        Value::CpuContext(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> CpuContext {
        let mut context = CpuContext::default();
        context.pc = 0x4010;
        context.sp = 0x7fff_0000;
        context.gpr[0] = 11;
        context
    }

    #[test]
    fn test_mutable_snapshot_writes_through() {
        let mut native = sample_context();
        let snapshot = unsafe { CpuContextValue::new_mutable(&mut native) };
        assert!(snapshot.is_mutable());

        snapshot.try_with_mut(|context| context.gpr[0] = 99).unwrap();
        drop(snapshot);
        assert_eq!(native.gpr[0], 99);
    }

    #[test]
    fn test_immutable_snapshot_rejects_writes() {
        let native = sample_context();
        let snapshot = unsafe { CpuContextValue::new_immutable(&native) };
        assert!(!snapshot.is_mutable());
        let result = snapshot.try_with_mut(|context| context.pc = 0);
        assert!(matches!(result, Err(BridgeError::InvalidOperation(_))));
    }

    #[test]
    fn test_detach_captures_values_at_detach_time() {
        let mut native = sample_context();
        let snapshot = unsafe { CpuContextValue::new_mutable(&mut native) };
        snapshot.detach();
        assert!(snapshot.is_owned());
        assert!(!snapshot.is_mutable());

        // Later native register changes must not be visible.
        native.gpr[0] = 1234;
        assert_eq!(snapshot.read().gpr[0], 11);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let snapshot = CpuContextValue::from_owned(sample_context());
        snapshot.detach();
        assert!(snapshot.is_owned());
        assert_eq!(snapshot.read().pc, 0x4010);
    }

    #[test]
    fn test_retention_probe() {
        let snapshot = CpuContextValue::from_owned(sample_context());
        assert!(!snapshot.is_retained());
        let script_ref = snapshot.clone();
        assert!(snapshot.is_retained());
        drop(script_ref);
        assert!(!snapshot.is_retained());
    }
}
