//! Demonstration targets driven by the frame loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use cadence_scheduler::{CallbackResult, Scheduler, Selector, Tickable};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, trace};

/// Rotates at a fixed angular speed, once per frame before anything else.
pub struct Spinner {
    degrees_per_second: f32,
    angle: Mutex<f32>,
    frames: AtomicU32,
}

impl Spinner {
    pub fn new(degrees_per_second: f32) -> Self {
        Self {
            degrees_per_second,
            angle: Mutex::new(0.0),
            frames: AtomicU32::new(0),
        }
    }

    pub fn angle(&self) -> f32 {
        *self.angle.lock()
    }
}

impl Tickable for Spinner {
    fn update(&self, _scheduler: &Scheduler, dt: f32) -> CallbackResult {
        let mut angle = self.angle.lock();
        *angle = (*angle + self.degrees_per_second * dt).rem_euclid(360.0);
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Summary printed when the loop stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoReport {
    pub spinner_frames: u32,
    pub spinner_angle: f32,
    pub heartbeats: u32,
    pub hud_frames: u32,
    pub fuse_burned: bool,
}

/// Owns the demo targets. The scheduler only holds them weakly, so
/// dropping this stops their callbacks.
pub struct Demo {
    spinner: Arc<Spinner>,
    clock: Arc<&'static str>,
    hud: Arc<&'static str>,
    fuse: Arc<&'static str>,
    heartbeats: Arc<AtomicU32>,
    hud_frames: Arc<AtomicU32>,
    fuse_selector: Selector,
}

impl Demo {
    /// Register the demo targets on `scheduler`.
    pub fn install(scheduler: &Scheduler, heartbeat_interval: f32, fuse_delay: f32) -> Self {
        let demo = Self {
            spinner: Arc::new(Spinner::new(90.0)),
            clock: Arc::new("clock"),
            hud: Arc::new("hud"),
            fuse: Arc::new("fuse"),
            heartbeats: Arc::new(AtomicU32::new(0)),
            hud_frames: Arc::new(AtomicU32::new(0)),
            fuse_selector: Selector::new("burn"),
        };

        scheduler.schedule_update(&demo.spinner, -1, false);

        let hud_frames = Arc::clone(&demo.hud_frames);
        let spinner = Arc::downgrade(&demo.spinner);
        scheduler.schedule_update_with(&demo.hud, 1, false, move |_, dt| {
            let frame = hud_frames.fetch_add(1, Ordering::Relaxed) + 1;
            let angle = spinner.upgrade().map(|s| s.angle());
            trace!(frame, dt, ?angle, "hud");
            Ok(())
        });

        let heartbeats = Arc::clone(&demo.heartbeats);
        scheduler.schedule(
            &Selector::new("heartbeat"),
            &demo.clock,
            heartbeat_interval,
            false,
            move |_, dt| {
                let count = heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
                info!(count, dt, "heartbeat");
                Ok(())
            },
        );

        let selector = demo.fuse_selector.clone();
        let fuse: Weak<&'static str> = Arc::downgrade(&demo.fuse);
        scheduler.schedule(&demo.fuse_selector, &demo.fuse, fuse_delay, false, move |s, dt| {
            info!(dt, "fuse burned");
            if let Some(fuse) = fuse.upgrade() {
                s.unschedule(&selector, &fuse);
            }
            Ok(())
        });

        demo
    }

    pub fn report(&self, scheduler: &Scheduler) -> DemoReport {
        DemoReport {
            spinner_frames: self.spinner.frames.load(Ordering::Relaxed),
            spinner_angle: self.spinner.angle(),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            hud_frames: self.hud_frames.load(Ordering::Relaxed),
            fuse_burned: !scheduler.is_scheduled(&self.fuse_selector, &self.fuse),
        }
    }
}
