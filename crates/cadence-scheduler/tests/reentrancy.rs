//! Callbacks that reshape the schedule while the tick that runs them is in
//! progress.

use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use cadence_scheduler::{CallbackResult, Scheduler, SchedulerStats, Selector};

/// Ordered log of callback labels.
#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, label: impl Into<String>) {
        self.0.lock().push(label.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    fn recorder(
        &self,
        label: &'static str,
    ) -> impl Fn(&Scheduler, f32) -> CallbackResult + Send + Sync + 'static {
        let log = self.clone();
        move |_, _| {
            log.push(label);
            Ok(())
        }
    }
}

#[test]
fn test_unschedule_all_inside_own_update() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let x = Arc::new("x");

    let target = Arc::clone(&x);
    let inner = log.clone();
    scheduler.schedule_update_with(&x, 0, false, move |s, _| {
        inner.push("update");
        s.unschedule_all_for_target(&target);
        Ok(())
    });
    scheduler.schedule(&Selector::new("a"), &x, 0.0, false, log.recorder("a"));
    scheduler.schedule(&Selector::new("b"), &x, 0.0, false, log.recorder("b"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["update"]);

    for _ in 0..3 {
        scheduler.tick(0.016);
    }
    assert!(log.take().is_empty());
    assert_eq!(scheduler.stats(), SchedulerStats::default());
}

#[test]
fn test_unschedule_all_inside_own_timer() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let x = Arc::new("x");

    let target = Arc::clone(&x);
    let inner = log.clone();
    scheduler.schedule(&Selector::new("first"), &x, 0.0, false, move |s, _| {
        inner.push("first");
        s.unschedule_all_for_target(&target);
        Ok(())
    });
    scheduler.schedule(&Selector::new("second"), &x, 0.0, false, log.recorder("second"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["first"]);
    assert_eq!(scheduler.stats().selector_targets, 0);

    scheduler.tick(0.016);
    assert!(log.take().is_empty());
}

#[test]
fn test_self_unschedule_keeps_siblings_firing() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let x = Arc::new("x");
    let once = Selector::new("once");

    scheduler.schedule(&Selector::new("before"), &x, 0.0, false, log.recorder("before"));
    let (selector, target, inner) = (once.clone(), Arc::clone(&x), log.clone());
    scheduler.schedule(&once, &x, 0.0, false, move |s, _| {
        inner.push("once");
        s.unschedule(&selector, &target);
        Ok(())
    });
    scheduler.schedule(&Selector::new("after"), &x, 0.0, false, log.recorder("after"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["before", "once", "after"]);

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["before", "after"]);
    assert!(!scheduler.is_scheduled(&once, &x));
}

#[test]
fn test_unscheduling_earlier_sibling_does_not_skip_next() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let x = Arc::new("x");
    let first = Selector::new("first");

    scheduler.schedule(&first, &x, 0.0, false, log.recorder("first"));
    let (selector, target, inner) = (first.clone(), Arc::clone(&x), log.clone());
    scheduler.schedule(&Selector::new("second"), &x, 0.0, false, move |s, _| {
        inner.push("second");
        s.unschedule(&selector, &target);
        Ok(())
    });
    scheduler.schedule(&Selector::new("third"), &x, 0.0, false, log.recorder("third"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["first", "second", "third"]);

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["second", "third"]);
}

#[test]
fn test_unscheduling_later_sibling_skips_it_this_tick() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let x = Arc::new("x");
    let last = Selector::new("last");

    let (selector, target, inner) = (last.clone(), Arc::clone(&x), log.clone());
    scheduler.schedule(&Selector::new("first"), &x, 0.0, false, move |s, _| {
        inner.push("first");
        s.unschedule(&selector, &target);
        Ok(())
    });
    scheduler.schedule(&last, &x, 0.0, false, log.recorder("last"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["first"]);
    assert_eq!(scheduler.timer_count(&x), 1);
}

#[test]
fn test_timer_added_to_current_target_runs_same_tick() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let x = Arc::new("x");
    let spawn = Selector::new("spawn");

    let (selector, target, inner, spawned) =
        (spawn.clone(), Arc::clone(&x), log.clone(), log.recorder("spawned"));
    let spawned = Arc::new(spawned);
    scheduler.schedule(&spawn, &x, 0.0, false, move |s, _| {
        inner.push("spawn");
        s.unschedule(&selector, &target);
        let spawned = Arc::clone(&spawned);
        s.schedule(&Selector::new("spawned"), &target, 0.0, false, move |s, dt| {
            spawned(s, dt)
        });
        Ok(())
    });

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["spawn", "spawned"]);
    assert_eq!(scheduler.timer_count(&x), 1);
    assert_eq!(scheduler.stats().selector_targets, 1);

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["spawned"]);
}

#[test]
fn test_other_target_unscheduled_mid_tick() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let killer = Arc::new("killer");
    let victim = Arc::new("victim");

    let (target, inner) = (Arc::clone(&victim), log.clone());
    scheduler.schedule_update_with(&killer, -1, false, move |s, _| {
        inner.push("killer");
        s.unschedule_all_for_target(&target);
        Ok(())
    });
    scheduler.schedule_update_with(&victim, 1, false, log.recorder("victim-update"));
    scheduler.schedule(&Selector::new("t"), &victim, 0.0, false, log.recorder("victim-timer"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["killer"]);
    assert!(!scheduler.is_update_scheduled(&victim));
    assert_eq!(scheduler.timer_count(&victim), 0);
}

#[test]
fn test_timers_of_other_target_removed_from_timer_callback() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let targets: Vec<Arc<usize>> = (0..6).map(Arc::new).collect();

    // Every target tries to wipe out every other target
    for target in &targets {
        let (others, inner) = (targets.clone(), log.clone());
        let me = Arc::clone(target);
        scheduler.schedule(&Selector::new("wipe"), target, 0.0, false, move |s, _| {
            inner.push(format!("wipe-{me}"));
            for other in others.iter().filter(|o| !Arc::ptr_eq(o, &me)) {
                s.unschedule_all_for_target(other);
            }
            Ok(())
        });
    }

    scheduler.tick(0.016);
    // Whichever target went first removed the rest
    assert_eq!(log.take().len(), 1);
    assert_eq!(scheduler.stats().selector_targets, 1);

    scheduler.tick(0.016);
    assert_eq!(log.take().len(), 1);
}

#[test]
fn test_update_scheduled_mid_tick_starts_next_tick() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let spawner = Arc::new("spawner");
    let child = Arc::new("child");

    let (target, inner) = (Arc::clone(&child), log.clone());
    let record = Arc::new(log.recorder("child"));
    scheduler.schedule_update_with(&spawner, 0, false, move |s, _| {
        inner.push("spawner");
        if !s.is_update_scheduled(&target) {
            let record = Arc::clone(&record);
            s.schedule_update_with(&target, 5, false, move |s, dt| record(s, dt));
        }
        Ok(())
    });

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["spawner"]);

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["spawner", "child"]);
}

#[test]
fn test_pause_from_callback_skips_later_update() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let pauser = Arc::new("pauser");
    let sleeper = Arc::new("sleeper");

    let (target, inner) = (Arc::clone(&sleeper), log.clone());
    scheduler.schedule_update_with(&pauser, -1, false, move |s, _| {
        inner.push("pauser");
        s.pause(&target);
        Ok(())
    });
    scheduler.schedule_update_with(&sleeper, 1, false, log.recorder("sleeper"));

    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["pauser"]);

    scheduler.unschedule_update(&pauser);
    scheduler.resume(&sleeper);
    scheduler.tick(0.016);
    assert_eq!(log.take(), vec!["sleeper"]);
}

#[test]
fn test_unschedule_all_from_callback() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let targets: Vec<Arc<usize>> = (0..4).map(Arc::new).collect();
    for target in &targets {
        scheduler.schedule(&Selector::new("t"), target, 0.0, false, log.recorder("timer"));
    }
    let nuke = Arc::new("nuke");
    scheduler.schedule_update_with(&nuke, -1, false, |s, _| {
        s.unschedule_all();
        Ok(())
    });

    scheduler.tick(0.016);
    assert!(log.take().is_empty());
    assert_eq!(scheduler.stats(), SchedulerStats::default());
}

/// Queries the scheduler when dropped, like a node whose cleanup touches
/// the scheduler that owned its callbacks.
struct Cleanup {
    scheduler: Weak<Scheduler>,
    log: Log,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            let stats = scheduler.stats();
            self.log.push(format!("cleanup sees {}", stats.timers + stats.updates()));
        }
    }
}

fn cleanup_callback(
    scheduler: &Arc<Scheduler>,
    log: &Log,
) -> impl Fn(&Scheduler, f32) -> CallbackResult + Send + Sync + 'static {
    let cleanup = Cleanup {
        scheduler: Arc::downgrade(scheduler),
        log: log.clone(),
    };
    move |_, _| {
        let _cleanup = &cleanup;
        Ok(())
    }
}

/// Run `f` on another thread and fail if it does not return promptly.
fn returns_promptly(f: impl FnOnce() + Send + 'static) {
    let (done, finished) = mpsc::channel();
    thread::spawn(move || {
        f();
        let _ = done.send(());
    });
    assert!(
        finished.recv_timeout(Duration::from_secs(5)).is_ok(),
        "scheduler call did not return"
    );
}

#[test]
fn test_unschedule_drops_callback_after_unlocking() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Log::default();
    let x = Arc::new("x");
    let selector = Selector::new("t");
    scheduler.schedule(&selector, &x, 0.0, false, cleanup_callback(&scheduler, &log));

    let (s, target) = (Arc::clone(&scheduler), Arc::clone(&x));
    returns_promptly(move || s.unschedule(&selector, &target));
    assert_eq!(log.take(), vec!["cleanup sees 0"]);
}

#[test]
fn test_unschedule_update_drops_callback_after_unlocking() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Log::default();
    let x = Arc::new("x");
    scheduler.schedule_update_with(&x, 0, false, cleanup_callback(&scheduler, &log));

    let (s, target) = (Arc::clone(&scheduler), Arc::clone(&x));
    returns_promptly(move || s.unschedule_update(&target));
    assert_eq!(log.take(), vec!["cleanup sees 0"]);
}

#[test]
fn test_unschedule_all_for_target_drops_callbacks_after_unlocking() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Log::default();
    let x = Arc::new("x");
    scheduler.schedule(&Selector::new("t"), &x, 0.0, false, cleanup_callback(&scheduler, &log));
    scheduler.schedule_update_with(&x, 1, false, cleanup_callback(&scheduler, &log));

    let (s, target) = (Arc::clone(&scheduler), Arc::clone(&x));
    returns_promptly(move || s.unschedule_all_for_target(&target));
    assert_eq!(log.take(), vec!["cleanup sees 0", "cleanup sees 0"]);
}

#[test]
fn test_unschedule_all_drops_callbacks_after_unlocking() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Log::default();
    let targets: Vec<Arc<usize>> = (0..3).map(Arc::new).collect();
    for target in &targets {
        let callback = cleanup_callback(&scheduler, &log);
        scheduler.schedule(&Selector::new("t"), target, 0.0, false, callback);
    }

    let s = Arc::clone(&scheduler);
    returns_promptly(move || s.unschedule_all());
    assert_eq!(log.take(), vec!["cleanup sees 0"; 3]);
}

#[test]
fn test_stale_sweep_drops_callbacks_after_unlocking() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Log::default();
    let x = Arc::new("x");
    scheduler.schedule(&Selector::new("t"), &x, 0.0, true, cleanup_callback(&scheduler, &log));
    scheduler.schedule_update_with(&x, -1, true, cleanup_callback(&scheduler, &log));
    drop(x);

    let s = Arc::clone(&scheduler);
    returns_promptly(move || s.tick(0.016));
    assert_eq!(log.take(), vec!["cleanup sees 0", "cleanup sees 0"]);
    assert_eq!(scheduler.stats(), SchedulerStats::default());
}

#[test]
fn test_self_unschedule_drops_callback_after_unlocking() {
    let scheduler = Arc::new(Scheduler::new());
    let log = Log::default();
    let x = Arc::new("x");
    let selector = Selector::new("once");

    let cleanup = cleanup_callback(&scheduler, &log);
    let (sel, target) = (selector.clone(), Arc::clone(&x));
    scheduler.schedule(&selector, &x, 0.0, false, move |s, dt| {
        s.unschedule(&sel, &target);
        cleanup(s, dt)
    });

    let s = Arc::clone(&scheduler);
    returns_promptly(move || s.tick(0.016));
    assert_eq!(log.take(), vec!["cleanup sees 0"]);
}
