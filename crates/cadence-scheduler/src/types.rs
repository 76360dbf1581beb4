//! Scheduler types.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::Scheduler;

/// Error returned by a scheduled callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a scheduled callback.
pub type CallbackResult = Result<(), CallbackError>;

/// Something that can be called once per tick.
///
/// Implement this on a target type to use [`Scheduler::schedule_update`],
/// or pass a closure to the `*_with`/[`Scheduler::schedule`] variants.
pub trait Tickable: Send + Sync {
    /// Called with the time-scaled delta for this tick.
    fn update(&self, scheduler: &Scheduler, dt: f32) -> CallbackResult;
}

impl<F> Tickable for F
where
    F: Fn(&Scheduler, f32) -> CallbackResult + Send + Sync,
{
    fn update(&self, scheduler: &Scheduler, dt: f32) -> CallbackResult {
        self(scheduler, dt)
    }
}

/// Identity of a target: the address of its shared allocation.
///
/// Clones of one `Arc` share an identity; equal values in different
/// allocations do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    /// Identity of the allocation behind `target`.
    pub fn of<T: ?Sized>(target: &Arc<T>) -> Self {
        Self(Arc::as_ptr(target) as *const () as usize)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{:x}", self.0)
    }
}

/// Non-owning handle to a target.
///
/// Holding the `Weak` keeps the allocation (and so the `TargetId`)
/// reserved without keeping the target alive.
#[derive(Clone)]
pub(crate) struct TargetRef {
    id: TargetId,
    handle: Weak<dyn Any + Send + Sync>,
}

impl TargetRef {
    pub(crate) fn new<T: Any + Send + Sync>(target: &Arc<T>) -> Self {
        let strong: Arc<dyn Any + Send + Sync> = target.clone();
        Self {
            id: TargetId::of(target),
            handle: Arc::downgrade(&strong),
        }
    }

    pub(crate) fn id(&self) -> TargetId {
        self.id
    }

    /// Whether the owner still holds the target.
    pub(crate) fn is_alive(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetRef")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Identity of an interval callback on a target.
///
/// Compared by identity, not by name: two selectors created from the same
/// string are different selectors. Clone a selector to refer to it again.
#[derive(Clone)]
pub struct Selector(Arc<str>);

impl Selector {
    /// Create a new, distinct selector.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The name, used for logging only.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Selector {}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({:?}@{:p})", &*self.0, Arc::as_ptr(&self.0) as *const ())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serial numbers for timers and update entries.
pub(crate) fn next_serial() -> u64 {
    static SERIAL: AtomicU64 = AtomicU64::new(1);
    SERIAL.fetch_add(1, Ordering::Relaxed)
}
