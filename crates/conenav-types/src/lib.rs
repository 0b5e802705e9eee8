//! `conenav-types` – shared vocabulary of the ConeNav stack.
//!
//! Geometry primitives live in [`geometry`], bus messages in [`messages`].
//! This root module defines the time base, the [`Event`] envelope routed over
//! the event bus, and the crate-spanning [`NavError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod geometry;
pub mod messages;

pub use geometry::{Point2D, Pose, Transform2D, normalize_angle};
pub use messages::{
    Command, ConeBearing, ConeMarkers, Goal, GridSnapshot, LaserScan, Odometry, ParamUpdate,
    ParamValue, PathPreview, TransformStamped, Twist,
};

/// Message timestamps. Every time-dependent decision in the core is made
/// against message stamps, never the wall clock.
pub type Timestamp = DateTime<Utc>;

/// Seconds elapsed from `earlier` to `later` (negative if `later` is
/// actually earlier).
pub fn seconds_between(later: Timestamp, earlier: Timestamp) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_microseconds() {
        Some(us) => us as f64 * 1e-6,
        None => delta.num_milliseconds() as f64 * 1e-3,
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: Timestamp,
    /// e.g., "conenav-hal::sim"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the wall clock.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // ── inbound ────────────────────────────────────────────────────────────
    Odometry(Odometry),
    Scan(LaserScan),
    Goal(Goal),
    /// Contact (bump) switch state.
    Contact(bool),
    ConeBearing(ConeBearing),
    Transform(TransformStamped),
    /// A batch of parameter assignments applied atomically.
    Reconfigure(Vec<ParamUpdate>),
    // ── outbound ───────────────────────────────────────────────────────────
    CmdVel(Twist),
    Path(PathPreview),
    Map(GridSnapshot),
    ConeMarkers(ConeMarkers),
    GoalReached(bool),
}

/// Global error type spanning transform failures, configuration problems and
/// bus plumbing.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Transform Unavailable: {source_frame} -> {target_frame}: {reason}")]
    TransformUnavailable {
        target_frame: String,
        source_frame: String,
        reason: String,
    },

    #[error("Invalid Parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown Parameter: {0}")]
    UnknownParameter(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Parsing Error: {0}")]
    Parsing(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn seconds_between_handles_sub_second_spans() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(1_250);
        assert!((seconds_between(t1, t0) - 1.25).abs() < 1e-9);
        assert!((seconds_between(t0, t1) + 1.25).abs() < 1e-9);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "conenav-hal::sim",
            EventPayload::Odometry(Odometry {
                stamp: Utc::now(),
                frame_id: "odom".to_string(),
                pose: Pose::new(1.0, 2.0, 0.5),
                linear_speed: 0.3,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::Odometry(odom) => assert_eq!(odom.pose, Pose::new(1.0, 2.0, 0.5)),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn reconfigure_payload_roundtrip() {
        let payload = EventPayload::Reconfigure(vec![
            ParamUpdate::new("track_cones", ParamValue::Bool(true)),
            ParamUpdate::new("max_speed", ParamValue::Float(0.8)),
        ]);
        let json = serde_json::to_string(&payload).unwrap();
        let back: EventPayload = serde_json::from_str(&json).unwrap();
        match back {
            EventPayload::Reconfigure(updates) => {
                assert_eq!(updates.len(), 2);
                assert_eq!(updates[0].value, ParamValue::Bool(true));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn nav_error_display() {
        let err = NavError::TransformUnavailable {
            target_frame: "odom".to_string(),
            source_frame: "laser".to_string(),
            reason: "no path".to_string(),
        };
        assert!(err.to_string().contains("laser -> odom"));

        let err2 = NavError::UnknownParameter("warp_speed".to_string());
        assert!(err2.to_string().contains("warp_speed"));
    }
}
