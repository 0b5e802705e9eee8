//! Transform Frame (TF) buffer.
//!
//! Maintains a graph of named 2-D reference frames and the time-stamped
//! rigid-body transforms ([`Transform2D`]) that relate them.  Given two frame
//! names and a stamp, the buffer composes a chain of transforms via BFS,
//! interpolating each edge at the requested time.
//!
//! Unlike a strictly directed graph, every edge can be walked in both
//! directions: `parent → child` uses the stored transform and `child → parent`
//! uses its inverse.
//!
//! # Time
//!
//! Each dynamic edge keeps a bounded history of samples.  A lookup at `stamp`
//! interpolates between the two samples bracketing it; outside the recorded
//! span the nearest sample is used only if it lies within the caller's
//! tolerance.  Static edges are valid at every time.
//!
//! The buffer lives on the same serialized execution context as its consumers,
//! so a lookup can never be satisfied by data arriving "later" during a wait.
//! The `timeout` of [`TransformService::lookup_transform`] is therefore the
//! extrapolation tolerance: the age a sample may have and still answer for
//! `stamp`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::Utc;
//! use conenav_perception::transform::{TfBuffer, TransformService};
//! use conenav_types::{Transform2D, TransformStamped};
//!
//! let now = Utc::now();
//! let mut tf = TfBuffer::new();
//!
//! // base_link is 1 m forward of odom.
//! tf.set_transform(&TransformStamped {
//!     stamp: now,
//!     parent_frame: "odom".into(),
//!     child_frame: "base_link".into(),
//!     transform: Transform2D::new(1.0, 0.0, 0.0),
//!     is_static: false,
//! });
//! // laser is mounted 0.26 m forward of base_link.
//! tf.set_transform(&TransformStamped {
//!     stamp: now,
//!     parent_frame: "base_link".into(),
//!     child_frame: "laser".into(),
//!     transform: Transform2D::new(0.26, 0.0, 0.0),
//!     is_static: true,
//! });
//!
//! let t = tf
//!     .lookup_transform("odom", "laser", now, Duration::from_millis(500))
//!     .unwrap();
//! assert!((t.x - 1.26).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use conenav_types::{
    NavError, Point2D, Timestamp, Transform2D, TransformStamped, normalize_angle, seconds_between,
};

/// Samples retained per dynamic edge.
pub const DEFAULT_HISTORY: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// TransformService
// ────────────────────────────────────────────────────────────────────────────

/// Resolves the transform between two frames at a point in time.
///
/// The planner and the cone detector depend on this trait, not on a concrete
/// buffer, so tests can substitute fixed or failing services.
pub trait TransformService {
    /// Transform mapping points expressed in `source_frame` into
    /// `target_frame` at `stamp`.
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Timestamp,
        timeout: Duration,
    ) -> Result<Transform2D, NavError>;

    /// Convert `point` from `source_frame` into `target_frame` at `stamp`.
    fn transform_point(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Timestamp,
        timeout: Duration,
        point: Point2D,
    ) -> Result<Point2D, NavError> {
        Ok(self
            .lookup_transform(target_frame, source_frame, stamp, timeout)?
            .apply(point))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Edge history
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct EdgeHistory {
    is_static: bool,
    /// Samples sorted by stamp, oldest first.
    samples: VecDeque<(Timestamp, Transform2D)>,
}

impl EdgeHistory {
    fn insert(&mut self, stamp: Timestamp, transform: Transform2D, is_static: bool, cap: usize) {
        if is_static {
            self.is_static = true;
            self.samples.clear();
            self.samples.push_back((stamp, transform));
            return;
        }
        self.is_static = false;
        let idx = self.samples.partition_point(|(s, _)| *s <= stamp);
        if idx > 0 && self.samples[idx - 1].0 == stamp {
            self.samples[idx - 1].1 = transform;
        } else {
            self.samples.insert(idx, (stamp, transform));
        }
        while self.samples.len() > cap.max(1) {
            self.samples.pop_front();
        }
    }

    /// Transform valid at `stamp`, interpolated where possible.
    fn sample(&self, stamp: Timestamp, tolerance: f64) -> Option<Transform2D> {
        if self.is_static {
            return self.samples.back().map(|(_, t)| *t);
        }
        let idx = self.samples.partition_point(|(s, _)| *s <= stamp);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        let after = self.samples.get(idx);
        match (before, after) {
            (Some((t0, a)), Some((t1, b))) => {
                let span = seconds_between(*t1, *t0);
                if span <= 0.0 {
                    return Some(*a);
                }
                let f = seconds_between(stamp, *t0) / span;
                Some(interpolate(a, b, f))
            }
            (Some((t0, a)), None) => (seconds_between(stamp, *t0) <= tolerance).then_some(*a),
            (None, Some((t1, b))) => (seconds_between(*t1, stamp) <= tolerance).then_some(*b),
            (None, None) => None,
        }
    }
}

fn interpolate(a: &Transform2D, b: &Transform2D, f: f64) -> Transform2D {
    Transform2D::new(
        a.x + (b.x - a.x) * f,
        a.y + (b.y - a.y) * f,
        normalize_angle(a.theta + normalize_angle(b.theta - a.theta) * f),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// A graph of named frames with time-stamped [`Transform2D`] edges.
///
/// [`TfBuffer::lookup_transform`] performs BFS from the target frame to the
/// source frame and returns the composed transform.
#[derive(Debug, Clone)]
pub struct TfBuffer {
    /// `edges[parent][child] = history`
    edges: HashMap<String, HashMap<String, EdgeHistory>>,
    history: usize,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl TfBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer retaining `history` samples per dynamic edge.
    pub fn with_history(history: usize) -> Self {
        Self {
            edges: HashMap::new(),
            history,
        }
    }

    /// Record a transform sample.
    pub fn set_transform(&mut self, msg: &TransformStamped) {
        self.edges
            .entry(msg.parent_frame.clone())
            .or_default()
            .entry(msg.child_frame.clone())
            .or_default()
            .insert(msg.stamp, msg.transform, msg.is_static, self.history);
    }

    /// `true` if `frame` appears on either end of any edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.edges.values().any(|c| c.contains_key(frame))
    }

    /// Frames adjacent to `frame`, each with the transform mapping the
    /// neighbour's coordinates into `frame`.
    fn neighbours(&self, frame: &str, stamp: Timestamp, tolerance: f64) -> Vec<(&str, Transform2D)> {
        let mut out = Vec::new();
        for (parent, children) in &self.edges {
            if parent == frame {
                for (child, history) in children {
                    if let Some(t) = history.sample(stamp, tolerance) {
                        out.push((child.as_str(), t));
                    }
                }
            } else if let Some(history) = children.get(frame)
                && let Some(t) = history.sample(stamp, tolerance)
            {
                out.push((parent.as_str(), t.inverse()));
            }
        }
        out
    }

    fn unavailable(target: &str, source: &str, reason: impl Into<String>) -> NavError {
        NavError::TransformUnavailable {
            target_frame: target.to_string(),
            source_frame: source.to_string(),
            reason: reason.into(),
        }
    }
}

impl TransformService for TfBuffer {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Timestamp,
        timeout: Duration,
    ) -> Result<Transform2D, NavError> {
        if target_frame == source_frame {
            return Ok(Transform2D::identity());
        }
        for frame in [target_frame, source_frame] {
            if !self.has_frame(frame) {
                return Err(Self::unavailable(
                    target_frame,
                    source_frame,
                    format!("frame '{frame}' does not exist"),
                ));
            }
        }

        let tolerance = timeout.as_secs_f64();

        // Each queue item carries T_target_current.
        let mut queue: VecDeque<(&str, Transform2D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((target_frame, Transform2D::identity()));
        visited.insert(target_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            for (next, edge) in self.neighbours(current, stamp, tolerance) {
                if !visited.insert(next) {
                    continue;
                }
                let composed = accumulated.compose(&edge);
                if next == source_frame {
                    return Ok(composed);
                }
                queue.push_back((next, composed));
            }
        }

        Err(Self::unavailable(
            target_frame,
            source_frame,
            format!("no transform chain valid at {stamp} within {tolerance:.3} s"),
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::f64::consts::FRAC_PI_2;

    const WAIT: Duration = Duration::from_millis(500);

    fn edge(stamp: Timestamp, parent: &str, child: &str, t: Transform2D) -> TransformStamped {
        TransformStamped {
            stamp,
            parent_frame: parent.to_string(),
            child_frame: child.to_string(),
            transform: t,
            is_static: false,
        }
    }

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfBuffer::new();
        let t = tf.lookup_transform("odom", "odom", Utc::now(), WAIT).unwrap();
        assert_eq!(t, Transform2D::identity());
    }

    #[test]
    fn lookup_direct_edge() {
        let now = Utc::now();
        let mut tf = TfBuffer::new();
        tf.set_transform(&edge(now, "odom", "base_link", Transform2D::new(1.0, 2.0, 0.0)));
        let t = tf.lookup_transform("odom", "base_link", now, WAIT).unwrap();
        assert!((t.x - 1.0).abs() < 1e-9);
        assert!((t.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_walks_edges_in_reverse() {
        let now = Utc::now();
        let mut tf = TfBuffer::new();
        tf.set_transform(&edge(now, "odom", "base_link", Transform2D::new(1.0, 0.0, FRAC_PI_2)));
        let t = tf.lookup_transform("base_link", "odom", now, WAIT).unwrap();
        // The odom origin seen from base_link: 1 m behind, rotated -90°.
        let p = t.apply(Point2D::new(0.0, 0.0));
        assert!(p.x.abs() < 1e-9, "x={}", p.x);
        assert!((p.y - 1.0).abs() < 1e-9, "y={}", p.y);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // base_link at the odom origin facing +Y; laser 1 m ahead of it.
        let now = Utc::now();
        let mut tf = TfBuffer::new();
        tf.set_transform(&edge(now, "odom", "base_link", Transform2D::new(0.0, 0.0, FRAC_PI_2)));
        tf.set_transform(&TransformStamped {
            is_static: true,
            ..edge(now, "base_link", "laser", Transform2D::new(1.0, 0.0, 0.0))
        });
        let p = tf
            .transform_point("odom", "laser", now, WAIT, Point2D::new(0.0, 0.0))
            .unwrap();
        assert!(p.x.abs() < 1e-9, "x={}", p.x);
        assert!((p.y - 1.0).abs() < 1e-9, "y={}", p.y);
    }

    #[test]
    fn lookup_interpolates_between_samples() {
        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(1);
        let mut tf = TfBuffer::new();
        tf.set_transform(&edge(t0, "odom", "base_link", Transform2D::new(0.0, 0.0, 0.0)));
        tf.set_transform(&edge(t1, "odom", "base_link", Transform2D::new(2.0, 0.0, 0.4)));
        let mid = t0 + ChronoDuration::milliseconds(250);
        let t = tf.lookup_transform("odom", "base_link", mid, WAIT).unwrap();
        assert!((t.x - 0.5).abs() < 1e-9);
        assert!((t.theta - 0.1).abs() < 1e-9);
    }

    #[test]
    fn stale_sample_beyond_tolerance_fails() {
        let t0 = Utc::now();
        let mut tf = TfBuffer::new();
        tf.set_transform(&edge(t0, "odom", "base_link", Transform2D::identity()));
        let later = t0 + ChronoDuration::seconds(2);
        let err = tf.lookup_transform("odom", "base_link", later, WAIT).unwrap_err();
        assert!(matches!(err, NavError::TransformUnavailable { .. }));
        // Within the tolerance the newest sample answers.
        let close = t0 + ChronoDuration::milliseconds(400);
        assert!(tf.lookup_transform("odom", "base_link", close, WAIT).is_ok());
    }

    #[test]
    fn static_edges_are_valid_at_any_time() {
        let t0 = Utc::now();
        let mut tf = TfBuffer::new();
        tf.set_transform(&TransformStamped {
            is_static: true,
            ..edge(t0, "base_link", "laser", Transform2D::new(0.26, 0.0, 0.0))
        });
        let much_later = t0 + ChronoDuration::hours(1);
        assert!(tf.lookup_transform("base_link", "laser", much_later, WAIT).is_ok());
    }

    #[test]
    fn unknown_frame_reports_reason() {
        let mut tf = TfBuffer::new();
        tf.set_transform(&edge(Utc::now(), "odom", "base_link", Transform2D::identity()));
        let err = tf
            .lookup_transform("odom", "ghost", Utc::now(), WAIT)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn history_is_bounded() {
        let t0 = Utc::now();
        let mut tf = TfBuffer::with_history(3);
        for i in 0..10 {
            let stamp = t0 + ChronoDuration::milliseconds(100 * i);
            tf.set_transform(&edge(stamp, "odom", "base_link", Transform2D::new(i as f64, 0.0, 0.0)));
        }
        // Only the last three samples (700..900 ms) survive.
        let early = t0 + ChronoDuration::milliseconds(100);
        assert!(tf.lookup_transform("odom", "base_link", early, Duration::ZERO).is_err());
        let late = t0 + ChronoDuration::milliseconds(800);
        let t = tf.lookup_transform("odom", "base_link", late, Duration::ZERO).unwrap();
        assert!((t.x - 8.0).abs() < 1e-9);
    }
}
