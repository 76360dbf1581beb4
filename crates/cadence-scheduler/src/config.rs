//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// How an interval timer catches up when a tick's delta spans more than
/// one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CatchUp {
    /// Fire once with the accumulated time, then start over from zero.
    #[default]
    Reset,
    /// Fire once per elapsed interval (up to `max_fires` per tick) and
    /// carry the remainder into the next tick.
    Carry { max_fires: u32 },
}

/// Construction-time settings for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Initial multiplier applied to every tick delta.
    pub time_scale: f32,
    /// Catch-up policy for interval timers.
    pub catch_up: CatchUp,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            catch_up: CatchUp::Reset,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SchedulerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(SchedulerError::InvalidTimeScale(self.time_scale));
        }
        if let CatchUp::Carry { max_fires: 0 } = self.catch_up {
            return Err(SchedulerError::InvalidCatchUp);
        }
        Ok(())
    }
}
