//! Per-kind mutual exclusion for bulk operations

use crate::checkpoint::OperationKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Running flags, one per operation kind. Both start cleared.
#[derive(Debug, Default)]
pub struct OperationGuard {
    import: AtomicBool,
    delete: AtomicBool,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, kind: OperationKind) -> &AtomicBool {
        match kind {
            OperationKind::Import => &self.import,
            OperationKind::Delete => &self.delete,
        }
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    /// Mark `kind` as running. Returns `None` when it already is.
    pub fn try_acquire(self: &Arc<Self>, kind: OperationKind) -> Option<GuardTicket> {
        self.flag(kind)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(GuardTicket {
            guard: Arc::clone(self),
            kind,
        })
    }
}

/// Clears the running flag when dropped
#[derive(Debug)]
pub struct GuardTicket {
    guard: Arc<OperationGuard>,
    kind: OperationKind,
}

impl GuardTicket {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        self.guard.flag(self.kind).store(false, Ordering::Release);
    }
}
