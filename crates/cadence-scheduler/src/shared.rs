//! Process-wide scheduler instance.
//!
//! Created on first access, dropped by [`purge_shared`]. Construction is
//! guarded so concurrent first accesses still produce one instance; after
//! that the owning frame loop is expected to be the only caller.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::{Scheduler, SchedulerConfig, SchedulerError};

static SHARED: RwLock<Option<Arc<Scheduler>>> = parking_lot::const_rwlock(None);

/// The shared scheduler, created with default settings if needed.
pub fn get_shared() -> Arc<Scheduler> {
    if let Some(scheduler) = SHARED.read().as_ref() {
        return Arc::clone(scheduler);
    }

    let mut slot = SHARED.write();
    Arc::clone(slot.get_or_insert_with(|| {
        debug!("creating shared scheduler");
        Arc::new(Scheduler::new())
    }))
}

/// Create the shared scheduler with `config`.
///
/// Fails if it already exists; call [`purge_shared`] first to replace it.
pub fn init_shared(config: SchedulerConfig) -> Result<Arc<Scheduler>, SchedulerError> {
    let mut slot = SHARED.write();
    if slot.is_some() {
        return Err(SchedulerError::AlreadyInitialized);
    }

    let scheduler = Arc::new(Scheduler::with_config(config)?);
    debug!(?scheduler, "initialized shared scheduler");
    *slot = Some(Arc::clone(&scheduler));
    Ok(scheduler)
}

/// Unschedule everything on the shared scheduler and drop it.
///
/// The next [`get_shared`] creates a fresh instance. Handles obtained
/// earlier stay usable but are no longer shared.
pub fn purge_shared() {
    let purged = SHARED.write().take();
    if let Some(scheduler) = purged {
        scheduler.unschedule_all();
        debug!("purged shared scheduler");
    }
}
