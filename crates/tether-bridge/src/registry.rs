//! Native resource registry
//!
//! Native allocations handed to script code as opaque handles. Registration
//! reports the allocation to the engine's GC pressure accounting and ties
//! destruction to the handle's reachability: once the engine finds the
//! handle unreachable, the registry — exactly once — reverses the
//! accounting, invokes the destructor and drops the record. There is no
//! `free`/`release` entry point; ownership is entirely GC-driven.
//!
//! The kernel variant has the same contract but hands out a plain 64-bit
//! address handle for kernel-space regions.

use crate::core::{Core, CoreInner};
use crate::value::{Address, PointerValue, UInt64Value, Value};
use std::rc::{Rc, Weak};
use tracing::debug;

/// Destructor callback for a registered resource. Invoked with the native
/// address, at most once, during finalization.
pub type DestroyNotify = Box<dyn FnOnce(Address)>;

/// Record of one registered native allocation. Keyed by its own identity in
/// the owning context's tracking set.
pub(crate) struct ResourceRecord {
    address: Address,
    size: usize,
    destructor: Option<DestroyNotify>,
}

#[derive(Clone, Copy)]
enum ResourceSet {
    Native,
    Kernel,
}

impl Core {
    /// Expose a native allocation to script as an opaque pointer handle.
    ///
    /// External-memory accounting grows by `size` immediately; it shrinks by
    /// the same amount exactly once, when the engine finalizes the handle.
    /// The destructor, if any, runs at that point with `address`.
    pub fn register_native_resource(
        &self,
        address: Address,
        size: usize,
        destructor: Option<DestroyNotify>,
    ) -> Value {
        let handle = PointerValue::new(address);
        self.register_resource(ResourceSet::Native, &handle.0, address, size, destructor);
        Value::Pointer(handle)
    }

    /// Kernel-space variant: the handle is a boxed unsigned 64-bit address
    /// rather than a pointer wrapper.
    pub fn register_kernel_resource(
        &self,
        address: Address,
        size: usize,
        destructor: Option<DestroyNotify>,
    ) -> Value {
        let handle = UInt64Value::new(address);
        self.register_resource(ResourceSet::Kernel, &handle.0, address, size, destructor);
        Value::UInt64(handle)
    }

    /// Number of live native resource records.
    pub fn native_resource_count(&self) -> usize {
        self.inner().native_resources.borrow().len()
    }

    /// Number of live kernel resource records.
    pub fn kernel_resource_count(&self) -> usize {
        self.inner().kernel_resources.borrow().len()
    }

    fn register_resource<T: 'static>(
        &self,
        set: ResourceSet,
        handle: &Rc<T>,
        address: Address,
        size: usize,
        destructor: Option<DestroyNotify>,
    ) {
        let inner = self.inner();
        let id = self.next_resource_id();
        let record = ResourceRecord {
            address,
            size,
            destructor,
        };
        match set {
            ResourceSet::Native => inner.native_resources.borrow_mut().insert(id, record),
            ResourceSet::Kernel => inner.kernel_resources.borrow_mut().insert(id, record),
        };
        inner.adjust_external_memory(size as i64);

        let weak_core: Weak<CoreInner> = Rc::downgrade(inner);
        inner
            .heap
            .register_finalizer(handle, move || finalize_resource(&weak_core, set, id));
    }
}

/// Finalization notification: runs on the engine thread once the handle is
/// unreachable. Native-side bookkeeping only.
fn finalize_resource(core: &Weak<CoreInner>, set: ResourceSet, id: u64) {
    let core = match core.upgrade() {
        Some(core) => core,
        // The whole context went away first; its records went with it.
        None => return,
    };

    let record = match set {
        ResourceSet::Native => core.native_resources.borrow_mut().remove(&id),
        ResourceSet::Kernel => core.kernel_resources.borrow_mut().remove(&id),
    };

    if let Some(record) = record {
        core.adjust_external_memory(-(record.size as i64));
        if core.config.log_finalizers {
            debug!(address = record.address, size = record.size, "finalizing resource");
        }
        if let Some(destructor) = record.destructor {
            destructor(record.address);
        }
    }
}
