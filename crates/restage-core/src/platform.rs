//! Platform abstraction for routing changeset application.
//!
//! Diffing and reconciliation are pure and may run on any thread, but
//! applying a changeset has to happen on whatever thread owns the
//! rendering surface. That affinity is the host's constraint, so the
//! host injects it: the scheduler routes every apply step through an
//! [`ApplyContext`] instead of assuming an ambient main thread.

/// Executes apply steps on the thread that owns the rendering surface.
///
/// Implementations must run posted tasks in submission order on a
/// single thread; the scheduler relies on that to keep transitions
/// applied in issuance order.
pub trait ApplyContext: Send + Sync {
    /// Run `task` on the surface-owning thread.
    ///
    /// May execute the task inline when the caller already is on that
    /// thread.
    fn post(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs every posted task immediately on the calling thread.
///
/// Suitable for tests and for hosts that drive scheduling from the
/// surface-owning thread themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineApplyContext;

impl ApplyContext for InlineApplyContext {
    fn post(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}
