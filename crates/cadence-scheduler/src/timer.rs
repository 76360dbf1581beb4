//! Interval timers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::next_serial;
use crate::{CallbackResult, CatchUp, Scheduler, Selector, TargetId, Tickable};

/// Firings produced by one [`Timer::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Firing {
    /// How many times to invoke the callback.
    pub count: u32,
    /// Delta passed to each invocation.
    pub dt: f32,
}

impl Firing {
    const NONE: Self = Self { count: 0, dt: 0.0 };
}

/// A single interval-driven callback bound to one target and one selector.
pub struct Timer {
    serial: u64,
    target: TargetId,
    selector: Selector,
    interval: f32,
    elapsed: f32,
    callback: Arc<dyn Tickable>,
}

impl Timer {
    /// Create a timer firing `callback` every `interval` seconds.
    ///
    /// An interval of zero fires on every update.
    pub fn new<T, F>(target: &Arc<T>, selector: Selector, interval: f32, callback: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scheduler, f32) -> CallbackResult + Send + Sync + 'static,
    {
        Self::from_parts(TargetId::of(target), selector, interval, Arc::new(callback))
    }

    pub(crate) fn from_parts(
        target: TargetId,
        selector: Selector,
        interval: f32,
        callback: Arc<dyn Tickable>,
    ) -> Self {
        Self {
            serial: next_serial(),
            target,
            selector,
            interval,
            elapsed: 0.0,
            callback,
        }
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// The target this timer is bound to.
    pub fn target(&self) -> TargetId {
        self.target
    }

    /// The selector used to unschedule this timer.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Seconds between firings.
    pub fn interval(&self) -> f32 {
        self.interval
    }

    /// Time accumulated towards the next firing.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub(crate) fn callback(&self) -> Arc<dyn Tickable> {
        Arc::clone(&self.callback)
    }

    /// Accumulate `dt` and decide how many times to fire.
    pub(crate) fn advance(&mut self, dt: f32, catch_up: CatchUp) -> Firing {
        self.elapsed += dt;

        if self.interval <= 0.0 {
            let firing = Firing {
                count: 1,
                dt: self.elapsed,
            };
            self.elapsed = 0.0;
            return firing;
        }

        if self.elapsed < self.interval {
            return Firing::NONE;
        }

        match catch_up {
            CatchUp::Reset => {
                let firing = Firing {
                    count: 1,
                    dt: self.elapsed,
                };
                self.elapsed = 0.0;
                firing
            }
            CatchUp::Carry { max_fires } => {
                let due = (self.elapsed / self.interval).floor();
                let count = if due >= max_fires as f32 {
                    // Drop the backlog past the cap
                    self.elapsed %= self.interval;
                    max_fires
                } else {
                    self.elapsed -= due * self.interval;
                    due as u32
                };
                Firing {
                    count,
                    dt: self.interval,
                }
            }
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("target", &self.target)
            .field("selector", &self.selector)
            .field("interval", &self.interval)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}
