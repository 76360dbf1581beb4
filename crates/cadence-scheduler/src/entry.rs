//! Per-target scheduling records.

use std::sync::{Arc, Weak};

use tracing::trace;

use crate::types::{TargetRef, next_serial};
use crate::{Selector, Tickable, Timer};

/// Priority partition for update callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bucket {
    Negative,
    Zero,
    Positive,
}

impl Bucket {
    /// Walk order during a tick.
    pub(crate) const ORDER: [Bucket; 3] = [Bucket::Negative, Bucket::Zero, Bucket::Positive];

    /// Only the sign of the priority matters.
    pub(crate) fn for_priority(priority: i32) -> Self {
        match priority.signum() {
            -1 => Bucket::Negative,
            0 => Bucket::Zero,
            _ => Bucket::Positive,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Bucket::Negative => 0,
            Bucket::Zero => 1,
            Bucket::Positive => 2,
        }
    }
}

/// Where an update callback comes from.
pub(crate) enum UpdateCallback {
    /// The target's own `Tickable` impl, held weakly.
    Owner(Weak<dyn Tickable>),
    /// A closure registered alongside the target.
    Bound(Arc<dyn Tickable>),
}

impl UpdateCallback {
    /// `None` once the owning target is gone.
    pub(crate) fn resolve(&self) -> Option<Arc<dyn Tickable>> {
        match self {
            UpdateCallback::Owner(weak) => weak.upgrade(),
            UpdateCallback::Bound(callback) => Some(Arc::clone(callback)),
        }
    }
}

/// Per-frame update record for one target.
pub(crate) struct UpdateEntry {
    pub target: TargetRef,
    pub priority: i32,
    pub paused: bool,
    pub serial: u64,
    pub callback: UpdateCallback,
}

impl UpdateEntry {
    pub(crate) fn new(
        target: TargetRef,
        priority: i32,
        paused: bool,
        callback: UpdateCallback,
    ) -> Self {
        Self {
            target,
            priority,
            paused,
            serial: next_serial(),
            callback,
        }
    }

    pub(crate) fn bucket(&self) -> Bucket {
        Bucket::for_priority(self.priority)
    }
}

/// Interval timers for one target, plus the bookkeeping that keeps
/// the timer walk valid while callbacks mutate the list.
pub(crate) struct SelectorEntry {
    pub target: TargetRef,
    /// Registration order.
    pub timers: Vec<Timer>,
    /// Index of the next timer the walk will visit.
    pub timer_cursor: usize,
    /// Serial of the timer whose callback is running.
    pub current_timer: Option<u64>,
    /// Set when the running timer was removed from under the walk.
    pub current_timer_salvaged: bool,
    pub paused: bool,
}

impl SelectorEntry {
    pub(crate) fn new(target: TargetRef, paused: bool) -> Self {
        Self {
            target,
            timers: Vec::new(),
            timer_cursor: 0,
            current_timer: None,
            current_timer_salvaged: false,
            paused,
        }
    }

    /// Remove the first timer registered under `selector`.
    ///
    /// Keeps `timer_cursor` pointing at the same next timer.
    pub(crate) fn remove_timer(&mut self, selector: &Selector) -> Option<Timer> {
        let index = self.timers.iter().position(|t| t.selector() == selector)?;

        if self.current_timer == Some(self.timers[index].serial()) && !self.current_timer_salvaged {
            trace!(target_id = %self.target.id(), selector = %selector, "salvaging running timer");
            self.current_timer_salvaged = true;
        }

        let removed = self.timers.remove(index);
        if index < self.timer_cursor {
            self.timer_cursor -= 1;
        }
        Some(removed)
    }

    /// Take every timer, salvaging the running one if any.
    pub(crate) fn clear_timers(&mut self) -> Vec<Timer> {
        if self.current_timer.is_some() {
            self.current_timer_salvaged = true;
        }
        self.timer_cursor = 0;
        std::mem::take(&mut self.timers)
    }
}
