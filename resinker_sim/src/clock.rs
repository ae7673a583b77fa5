//! Synthetic simulation clock.
//!
//! The clock is owned by the scheduler and advanced between events; it
//! never moves backward and never throttles generation. `time_multiplier`
//! scales each advance, so payload timestamps stretch or compress without
//! affecting throughput.

use chrono::{DateTime, Duration, Utc};

use resinker_core::spec::TimeProgression;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct SimClock {
    start: DateTime<Utc>,
    current: DateTime<Utc>,
    multiplier: f64,
}

impl SimClock {
    /// Resolves `start_time` (once, at construction) and positions the
    /// clock there. `"now"` captures the wall clock.
    pub fn from_settings(progression: &TimeProgression) -> Result<Self, EngineError> {
        let start = if progression.start_time.eq_ignore_ascii_case("now") {
            Utc::now()
        } else {
            DateTime::parse_from_rfc3339(&progression.start_time)
                .map_err(|e| {
                    EngineError::InvalidStartTime(progression.start_time.clone(), e.to_string())
                })?
                .with_timezone(&Utc)
        };
        Ok(Self {
            start,
            current: start,
            multiplier: progression.time_multiplier,
        })
    }

    /// Current synthetic timestamp. Reading never advances the clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.current
    }

    /// Advances by `delta_seconds`, scaled by the time multiplier.
    /// Negative deltas are ignored; the clock is monotonic.
    pub fn advance(&mut self, delta_seconds: f64) {
        if delta_seconds <= 0.0 || !delta_seconds.is_finite() {
            return;
        }
        let scaled_ms = (delta_seconds * self.multiplier * 1000.0) as i64;
        self.current += Duration::milliseconds(scaled_ms);
    }

    /// Synthetic seconds elapsed since the run started.
    pub fn elapsed_seconds(&self) -> f64 {
        (self.current - self.start).num_milliseconds() as f64 / 1000.0
    }
}
