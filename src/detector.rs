//! Threshold-based fall heuristic.
//!
//! Compares each accelerometer sample with the previous one and flags a
//! possible fall when the jump exceeds the threshold. A cooldown window and
//! an alert-active flag keep one physical fall from raising several alerts.

use crate::config::DetectorConfig;
use crate::types::AccelerationSample;
use serde::Serialize;

/// A sample transition that crossed the threshold while armed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trigger {
    pub delta: f64,
    pub at_ms: i64,
}

/// Identifies one alert so a stale sequence cannot clear a newer one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertToken(u64);

pub struct FallDetector {
    threshold: f64,
    cooldown_ms: i64,
    last_sample: Option<AccelerationSample>,
    last_fall_at: Option<i64>,
    active_alert: Option<AlertToken>,
    next_alert: u64,
}

impl FallDetector {
    pub fn new(threshold: f64, cooldown_ms: i64) -> Self {
        Self {
            threshold,
            cooldown_ms,
            last_sample: None,
            last_fall_at: None,
            active_alert: None,
            next_alert: 0,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.threshold, config.cooldown_ms)
    }

    /// Feed one sample taken at `now_ms`. Returns a trigger when the sample
    /// qualifies as a possible fall.
    pub fn process(&mut self, sample: AccelerationSample, now_ms: i64) -> Option<Trigger> {
        // First sample only establishes the reference point
        let previous = match self.last_sample.replace(sample) {
            Some(previous) => previous,
            None => return None,
        };

        let delta = sample.delta_from(&previous);

        if self.in_cooldown(now_ms) || self.is_alert_active() {
            return None;
        }

        if delta > self.threshold {
            self.last_fall_at = Some(now_ms);
            log::debug!("delta {:.2} over threshold {:.2}", delta, self.threshold);
            return Some(Trigger {
                delta,
                at_ms: now_ms,
            });
        }

        None
    }

    fn in_cooldown(&self, now_ms: i64) -> bool {
        self.last_fall_at
            .map(|t| now_ms - t < self.cooldown_ms)
            .unwrap_or(false)
    }

    /// Mark an alert as active. Returns `None` if one already is.
    pub fn begin_alert(&mut self) -> Option<AlertToken> {
        if self.active_alert.is_some() {
            return None;
        }
        self.next_alert += 1;
        let token = AlertToken(self.next_alert);
        self.active_alert = Some(token);
        Some(token)
    }

    /// Clear the active alert if `token` still names it.
    pub fn end_alert(&mut self, token: AlertToken) -> bool {
        if self.active_alert == Some(token) {
            self.active_alert = None;
            true
        } else {
            false
        }
    }

    pub fn is_alert_active(&self) -> bool {
        self.active_alert.is_some()
    }

    pub fn last_fall_at(&self) -> Option<i64> {
        self.last_fall_at
    }

    pub fn last_sample(&self) -> Option<AccelerationSample> {
        self.last_sample
    }

    /// Forget the reference sample and any active alert.
    pub fn reset(&mut self) {
        self.last_sample = None;
        self.active_alert = None;
    }
}

impl Default for FallDetector {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}
