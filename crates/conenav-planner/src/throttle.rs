//! [`SignalThrottle`] – drop-on-overflow rate limiter for one-shot signals.
//!
//! Signals arriving faster than the minimum interval are suppressed, not
//! queued. Time comes from message stamps, so replayed logs throttle the same
//! way live data does.

use conenav_types::{Timestamp, seconds_between};

/// Allows at most one signal per `min_interval` seconds.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use conenav_planner::throttle::SignalThrottle;
///
/// let mut t = SignalThrottle::new(0.5);
/// let t0 = Utc::now();
/// assert!(t.try_fire(t0));
/// assert!(!t.try_fire(t0 + Duration::milliseconds(200)));
/// assert!(t.try_fire(t0 + Duration::milliseconds(600)));
/// ```
#[derive(Debug, Clone)]
pub struct SignalThrottle {
    min_interval: f64,
    last_fired: Option<Timestamp>,
}

impl SignalThrottle {
    pub fn new(min_interval: f64) -> Self {
        Self {
            min_interval,
            last_fired: None,
        }
    }

    /// Record and allow a signal at `now` if the interval has passed since
    /// the last allowed one.
    pub fn try_fire(&mut self, now: Timestamp) -> bool {
        let allowed = self
            .last_fired
            .is_none_or(|last| seconds_between(now, last) > self.min_interval);
        if allowed {
            self.last_fired = Some(now);
        }
        allowed
    }

    pub fn last_fired(&self) -> Option<Timestamp> {
        self.last_fired
    }
}
