//! Scheduler implementation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::entry::{Bucket, SelectorEntry, UpdateCallback, UpdateEntry};
use crate::registry::{SelectorRegistry, UpdateRegistry};
use crate::types::TargetRef;
use crate::{
    CallbackResult, CatchUp, SchedulerConfig, SchedulerError, Selector, TargetId, Tickable, Timer,
};

/// Selector name reported for update callbacks.
const UPDATE_SELECTOR: &str = "update";

/// Counts of everything currently scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Targets with at least one interval timer.
    pub selector_targets: usize,
    /// Interval timers across all targets.
    pub timers: usize,
    /// Update callbacks with negative priority.
    pub updates_negative: usize,
    /// Update callbacks with zero priority.
    pub updates_zero: usize,
    /// Update callbacks with positive priority.
    pub updates_positive: usize,
}

impl SchedulerStats {
    /// Update callbacks across all buckets.
    pub fn updates(&self) -> usize {
        self.updates_negative + self.updates_zero + self.updates_positive
    }
}

/// Something unscheduled, kept until the state lock is released so that
/// callbacks and their captures never drop while it is held.
#[allow(dead_code)] // held only to be dropped
enum Retired {
    Timer(Timer),
    Timers(Vec<Timer>),
    Update(UpdateEntry),
    Entry(SelectorEntry),
}

struct SchedulerState {
    selectors: SelectorRegistry,
    updates: UpdateRegistry,
    time_scale: f32,
    catch_up: CatchUp,
    /// Target whose timers the current tick is walking.
    current_target: Option<TargetId>,
    /// Set when the current target lost its last timer mid-walk.
    current_target_salvaged: bool,
    ticking: bool,
    /// Removed since the lock was taken; dropped after it is released.
    retired: Vec<Retired>,
}

impl SchedulerState {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            selectors: SelectorRegistry::default(),
            updates: UpdateRegistry::default(),
            time_scale: config.time_scale,
            catch_up: config.catch_up,
            current_target: None,
            current_target_salvaged: false,
            ticking: false,
            retired: Vec::new(),
        }
    }

    fn unschedule(&mut self, selector: &Selector, id: TargetId) {
        let Some(entry) = self.selectors.get_mut(id) else {
            trace!(target_id = %id, selector = %selector, "no timers for target");
            return;
        };

        let Some(timer) = entry.remove_timer(selector) else {
            trace!(target_id = %id, selector = %selector, "selector not found");
            return;
        };
        let emptied = entry.timers.is_empty();
        self.retired.push(Retired::Timer(timer));

        if emptied {
            self.release_selector_entry(id);
        }
    }

    /// Drop an emptied entry, or defer it if the tick is walking it.
    fn release_selector_entry(&mut self, id: TargetId) {
        if self.current_target == Some(id) {
            self.current_target_salvaged = true;
        } else if let Some(entry) = self.selectors.remove(id) {
            self.retired.push(Retired::Entry(entry));
        }
    }

    fn unschedule_update(&mut self, id: TargetId) {
        if let Some(entry) = self.updates.remove(id) {
            self.retired.push(Retired::Update(entry));
        }
    }

    fn unschedule_all_for(&mut self, id: TargetId) {
        if let Some(entry) = self.selectors.get_mut(id) {
            let timers = entry.clear_timers();
            self.retired.push(Retired::Timers(timers));
            self.release_selector_entry(id);
        }
        self.unschedule_update(id);
    }

    fn unschedule_all(&mut self) {
        let mut ids = self.selectors.snapshot();
        ids.extend(self.updates.ids());
        for id in ids {
            self.unschedule_all_for(id);
        }
    }

    fn set_paused(&mut self, id: TargetId, paused: bool) {
        if let Some(entry) = self.selectors.get_mut(id) {
            entry.paused = paused;
        }
        if let Some(entry) = self.updates.get_mut(id) {
            entry.paused = paused;
        }
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            selector_targets: self.selectors.len(),
            timers: self.selectors.timer_count(),
            updates_negative: self.updates.bucket_len(Bucket::Negative),
            updates_zero: self.updates.bucket_len(Bucket::Zero),
            updates_positive: self.updates.bucket_len(Bucket::Positive),
        }
    }
}

/// Report a broken precondition: fatal with debug assertions, otherwise
/// logged before the caller recovers as described by `recovery`.
fn precondition_failed(error: SchedulerError, recovery: &str) {
    error!(error = %error, "scheduler precondition violated");
    debug_assert!(false, "{error}");
    warn!(recovery, "recovering from precondition violation");
}

/// `seconds` if finite and non-negative, otherwise zero.
fn checked_seconds(seconds: f32, invalid: fn(f32) -> SchedulerError) -> f32 {
    if seconds.is_finite() && seconds >= 0.0 {
        seconds
    } else {
        precondition_failed(invalid(seconds), "using zero");
        0.0
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The per-frame callback scheduler.
///
/// Every method takes `&self` and may be called from inside a callback the
/// scheduler is currently running, except [`Scheduler::tick`] itself.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Scheduler")
            .field("time_scale", &state.time_scale)
            .field("catch_up", &state.catch_up)
            .field("stats", &state.stats())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with default settings.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState::new(&SchedulerConfig::default())),
        }
    }

    /// Create a scheduler from validated settings.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(SchedulerState::new(&config)),
        })
    }

    /// Multiplier applied to every tick delta.
    pub fn time_scale(&self) -> f32 {
        self.state.lock().time_scale
    }

    /// Set the multiplier for every subsequent tick. Values below 1.0 slow
    /// everything down, above 1.0 speed it up.
    pub fn set_time_scale(&self, time_scale: f32) {
        if !time_scale.is_finite() || time_scale < 0.0 {
            precondition_failed(
                SchedulerError::InvalidTimeScale(time_scale),
                "keeping the current time scale",
            );
            return;
        }
        self.state.lock().time_scale = time_scale;
    }

    /// Call `callback` on `target` every `interval` seconds.
    ///
    /// An interval of zero fires every tick. A target may carry any number of
    /// timers, including several under the same selector. All of a target's
    /// timers share one pause state, so `paused` must match it when the target
    /// already has timers.
    pub fn schedule<T, F>(
        &self,
        selector: &Selector,
        target: &Arc<T>,
        interval: f32,
        paused: bool,
        callback: F,
    ) where
        T: Any + Send + Sync,
        F: Fn(&Scheduler, f32) -> CallbackResult + Send + Sync + 'static,
    {
        let target = TargetRef::new(target);
        let id = target.id();
        let timer = Timer::from_parts(
            id,
            selector.clone(),
            checked_seconds(interval, SchedulerError::InvalidInterval),
            Arc::new(callback),
        );

        let mut state = self.state.lock();
        let entry = state.selectors.get_or_insert(target, paused);
        if entry.paused != paused {
            precondition_failed(
                SchedulerError::PauseMismatch {
                    target: id,
                    existing: entry.paused,
                    requested: paused,
                },
                "keeping the target's pause state",
            );
        }
        entry.timers.push(timer);
    }

    /// Remove the first timer registered on `target` under `selector`.
    ///
    /// Unknown targets and selectors are ignored.
    pub fn unschedule<T: ?Sized>(&self, selector: &Selector, target: &Arc<T>) {
        self.mutate(|state| state.unschedule(selector, TargetId::of(target)));
    }

    /// Call the target's own [`Tickable::update`] every tick.
    ///
    /// The scheduler holds the target weakly. Lower priorities run first, but
    /// only the sign of the priority is significant: within the negative, zero
    /// and positive groups callbacks run in registration order.
    pub fn schedule_update<T>(&self, target: &Arc<T>, priority: i32, paused: bool)
    where
        T: Tickable + Any,
    {
        let owner: Arc<dyn Tickable> = target.clone();
        self.insert_update(
            TargetRef::new(target),
            priority,
            paused,
            UpdateCallback::Owner(Arc::downgrade(&owner)),
        );
    }

    /// Like [`Scheduler::schedule_update`], calling `callback` instead.
    pub fn schedule_update_with<T, F>(
        &self,
        target: &Arc<T>,
        priority: i32,
        paused: bool,
        callback: F,
    ) where
        T: Any + Send + Sync,
        F: Fn(&Scheduler, f32) -> CallbackResult + Send + Sync + 'static,
    {
        self.insert_update(
            TargetRef::new(target),
            priority,
            paused,
            UpdateCallback::Bound(Arc::new(callback)),
        );
    }

    fn insert_update(
        &self,
        target: TargetRef,
        priority: i32,
        paused: bool,
        callback: UpdateCallback,
    ) {
        self.mutate(|state| {
            if cfg!(debug_assertions) && state.updates.contains(target.id()) {
                precondition_failed(
                    SchedulerError::UpdateAlreadyScheduled(target.id()),
                    "replacing the existing update",
                );
            }
            let entry = UpdateEntry::new(target, priority, paused, callback);
            if let Some(replaced) = state.updates.insert(entry) {
                state.retired.push(Retired::Update(replaced));
            }
        });
    }

    /// Stop calling the target's update callback.
    pub fn unschedule_update<T: ?Sized>(&self, target: &Arc<T>) {
        self.mutate(|state| state.unschedule_update(TargetId::of(target)));
    }

    /// Remove every timer and the update callback of `target`.
    pub fn unschedule_all_for_target<T: ?Sized>(&self, target: &Arc<T>) {
        self.mutate(|state| state.unschedule_all_for(TargetId::of(target)));
    }

    /// Remove everything from every target. Meant for teardown.
    pub fn unschedule_all(&self) {
        self.mutate(SchedulerState::unschedule_all);
    }

    /// Run `f` under the state lock, then drop whatever it unscheduled once
    /// the lock is released.
    fn mutate<R>(&self, f: impl FnOnce(&mut SchedulerState) -> R) -> R {
        let (result, retired) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, std::mem::take(&mut state.retired))
        };
        drop(retired);
        result
    }

    /// Stop ticking the target's timers and update callback.
    pub fn pause<T: ?Sized>(&self, target: &Arc<T>) {
        self.state.lock().set_paused(TargetId::of(target), true);
    }

    /// Undo [`Scheduler::pause`].
    pub fn resume<T: ?Sized>(&self, target: &Arc<T>) {
        self.state.lock().set_paused(TargetId::of(target), false);
    }

    /// Whether `target` has a timer under exactly this selector.
    pub fn is_scheduled<T: ?Sized>(&self, selector: &Selector, target: &Arc<T>) -> bool {
        self.state
            .lock()
            .selectors
            .get(TargetId::of(target))
            .is_some_and(|entry| entry.timers.iter().any(|t| t.selector() == selector))
    }

    /// Whether `target` has an update callback.
    pub fn is_update_scheduled<T: ?Sized>(&self, target: &Arc<T>) -> bool {
        self.state.lock().updates.contains(TargetId::of(target))
    }

    /// Pause state of the target's timers, falling back to its update
    /// callback. Unknown targets are not paused.
    pub fn is_paused<T: ?Sized>(&self, target: &Arc<T>) -> bool {
        let id = TargetId::of(target);
        let state = self.state.lock();
        state
            .selectors
            .get(id)
            .map(|entry| entry.paused)
            .or_else(|| state.updates.get(id).map(|entry| entry.paused))
            .unwrap_or(false)
    }

    /// Number of timers on `target`.
    pub fn timer_count<T: ?Sized>(&self, target: &Arc<T>) -> usize {
        self.state
            .lock()
            .selectors
            .get(TargetId::of(target))
            .map_or(0, |entry| entry.timers.len())
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().stats()
    }

    /// Advance every scheduled callback by `dt` seconds, scaled by the time
    /// scale.
    ///
    /// Update callbacks run first, negative bucket to positive, then each
    /// unpaused target's timers in registration order. Callback errors and
    /// panics are logged and do not stop the tick.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn tick(&self, dt: f32) {
        let dt = checked_seconds(dt, SchedulerError::InvalidDelta);
        let (dt, catch_up, updates) = {
            let mut state = self.state.lock();
            if state.ticking {
                drop(state);
                precondition_failed(SchedulerError::ReentrantTick, "ignoring the nested tick");
                return;
            }
            state.ticking = true;
            (dt * state.time_scale, state.catch_up, state.updates.snapshot())
        };

        // Targets whose owner has been dropped
        let mut stale = Vec::new();

        for (id, serial) in updates {
            let callback = {
                let state = self.state.lock();
                match state.updates.get(id) {
                    Some(entry) if entry.serial == serial => {
                        // Dropped targets are swept even while paused
                        let callback = entry
                            .callback
                            .resolve()
                            .filter(|_| entry.target.is_alive());
                        if callback.is_none() {
                            stale.push(id);
                        }
                        callback.filter(|_| !entry.paused)
                    }
                    _ => None,
                }
            };

            if let Some(callback) = callback {
                self.dispatch(callback.as_ref(), dt, id, UPDATE_SELECTOR);
            }
        }

        let targets = self.state.lock().selectors.snapshot();
        let mut emptied = Vec::new();

        for id in targets {
            if !self.begin_target(id, &mut stale) {
                continue;
            }

            self.fire_timers(id, dt, catch_up);

            let state = self.state.lock();
            if state.current_target_salvaged
                && state.selectors.get(id).is_some_and(|e| e.timers.is_empty())
            {
                emptied.push(id);
            }
        }

        self.mutate(|state| {
            for id in emptied {
                // A later callback may have scheduled on it again
                if state.selectors.get(id).is_some_and(|e| e.timers.is_empty()) {
                    debug!(target_id = %id, "removing emptied target");
                    if let Some(entry) = state.selectors.remove(id) {
                        state.retired.push(Retired::Entry(entry));
                    }
                }
            }
            state.current_target = None;
            state.current_target_salvaged = false;

            for id in stale {
                debug!(target_id = %id, "target dropped, unscheduling");
                state.unschedule_all_for(id);
            }

            state.ticking = false;
        });
    }

    /// Make `id` the current target. Returns false if it should be skipped.
    fn begin_target(&self, id: TargetId, stale: &mut Vec<TargetId>) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.selectors.get_mut(id) else {
            return false;
        };
        if !entry.target.is_alive() {
            stale.push(id);
            return false;
        }
        if entry.paused {
            return false;
        }

        entry.timer_cursor = 0;
        state.current_target = Some(id);
        state.current_target_salvaged = false;
        true
    }

    /// Walk the current target's timers. The list may change under the walk.
    fn fire_timers(&self, id: TargetId, dt: f32, catch_up: CatchUp) {
        loop {
            let (callback, firing, selector) = {
                let mut state = self.state.lock();
                let Some(entry) = state.selectors.get_mut(id) else {
                    return;
                };
                let cursor = entry.timer_cursor;
                let Some(timer) = entry.timers.get_mut(cursor) else {
                    return;
                };

                let firing = timer.advance(dt, catch_up);
                let serial = timer.serial();
                let callback = timer.callback();
                let selector = timer.selector().clone();

                entry.timer_cursor = cursor + 1;
                entry.current_timer = Some(serial);
                entry.current_timer_salvaged = false;
                (callback, firing, selector)
            };

            for n in 0..firing.count {
                if n > 0 && self.current_timer_salvaged(id) {
                    trace!(target_id = %id, %selector, "timer unscheduled, skipping catch-up");
                    break;
                }
                self.dispatch(callback.as_ref(), firing.dt, id, selector.name());
            }

            if let Some(entry) = self.state.lock().selectors.get_mut(id) {
                entry.current_timer = None;
            }
        }
    }

    fn current_timer_salvaged(&self, id: TargetId) -> bool {
        self.state
            .lock()
            .selectors
            .get(id)
            .is_none_or(|entry| entry.current_timer_salvaged)
    }

    /// Run one callback with no lock held, containing errors and panics.
    fn dispatch(&self, callback: &dyn Tickable, dt: f32, target: TargetId, selector: &str) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback.update(self, dt)));

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(source)) => SchedulerError::Callback {
                target,
                selector: selector.to_string(),
                source,
            },
            Err(payload) => SchedulerError::CallbackPanicked {
                target,
                selector: selector.to_string(),
                message: panic_message(payload.as_ref()),
            },
        };

        error!(target_id = %target, selector, error = %failure, "scheduled callback failed");
    }

    /// Not supported; use [`Scheduler::schedule`].
    #[deprecated(note = "use Scheduler::schedule")]
    pub fn schedule_timer(&self, _timer: Timer) {
        unimplemented!("schedule_timer is not supported, use Scheduler::schedule");
    }

    /// Not supported; use [`Scheduler::unschedule`].
    #[deprecated(note = "use Scheduler::unschedule")]
    pub fn unschedule_timer(&self, _timer: &Timer) {
        unimplemented!("unschedule_timer is not supported, use Scheduler::unschedule");
    }

    /// Not supported; use [`Scheduler::unschedule_all`].
    #[deprecated(note = "use Scheduler::unschedule_all")]
    pub fn unschedule_all_timers(&self) {
        unimplemented!("unschedule_all_timers is not supported, use Scheduler::unschedule_all");
    }
}
