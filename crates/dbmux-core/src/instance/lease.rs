//! Holder identity and the exclusive-access lease.

use super::engine::Engine;
use super::managed::ManagedInstance;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identity of one connection competing for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HolderId(u64);

impl HolderId {
    /// Allocate a process-unique holder id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HolderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "holder-{}", self.0)
    }
}

/// Exclusive access to a [`ManagedInstance`], granted to one holder.
///
/// The lease releases the instance exactly once: on the first call to
/// [`InstanceLease::release`] or when dropped, whichever comes first. A
/// connection's clean-close and error-close paths can both call `release`
/// through a shared `Arc<InstanceLease>` without double-releasing.
pub struct InstanceLease {
    instance: Arc<ManagedInstance>,
    holder: HolderId,
    released: AtomicBool,
}

impl InstanceLease {
    pub(crate) fn new(instance: Arc<ManagedInstance>, holder: HolderId) -> Self {
        Self {
            instance,
            holder,
            released: AtomicBool::new(false),
        }
    }

    pub fn holder(&self) -> HolderId {
        self.holder
    }

    pub fn instance(&self) -> &Arc<ManagedInstance> {
        &self.instance
    }

    /// Logical name of the leased instance.
    pub fn name(&self) -> &str {
        self.instance.name()
    }

    /// The engine handle, if the instance is booted and not closed.
    pub fn engine(&self) -> Option<Arc<dyn Engine>> {
        self.instance.engine()
    }

    /// Whether this lease has already been given back.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Give access back and promote the next waiter.
    ///
    /// Returns `true` only for the call that actually released the instance.
    pub fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.instance.release(self.holder)
        } else {
            false
        }
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for InstanceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLease")
            .field("instance", &self.instance.name())
            .field("holder", &self.holder)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_ids_are_unique() {
        let a = HolderId::next();
        let b = HolderId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("holder-"));
    }
}
