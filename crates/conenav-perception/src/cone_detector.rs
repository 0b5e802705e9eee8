//! Range-scan cone detector.
//!
//! Finds small circular objects in a planar scan by fitting circles to
//! clusters of consecutive returns, and keeps a short-lived registry of the
//! cones seen recently.
//!
//! # Per-scan cycle
//!
//! 1. Every real return is converted into the fixed frame through a
//!    [`TransformService`]. If the transform is unavailable the whole scan is
//!    dropped and the registry is left untouched.
//! 2. Consecutive points closer than `grouping_threshold` form a cluster.
//! 3. Each cluster with more than `min_circle_size` points goes through
//!    [`fit_circle`]: the inscribed angle at every interior point, subtended by
//!    the cluster's end points, is near-constant on a circular arc.
//! 4. Accepted circles replace any registry entry within
//!    `same_cone_threshold`; entries unseen for [`VISIBILITY_WINDOW_SECS`]
//!    expire.
//!
//! # Example
//!
//! ```rust
//! use conenav_perception::cone_detector::{DetectorParams, fit_circle};
//! use conenav_types::Point2D;
//!
//! // Near side of a 0.1 m circle centred at (1, 0), seen from the origin.
//! let arc: Vec<Point2D> = (-5..=5)
//!     .map(|k| {
//!         let a = std::f64::consts::PI + k as f64 * 0.2;
//!         Point2D::new(1.0 + 0.1 * a.cos(), 0.1 * a.sin())
//!     })
//!     .collect();
//!
//! let fit = fit_circle(&arc, Point2D::new(0.0, 0.0), &DetectorParams::default()).unwrap();
//! assert!((fit.radius - 0.1).abs() < 1e-6);
//! assert!((fit.center.x - 1.0).abs() < 1e-6);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use conenav_types::{ConeMarkers, LaserScan, NavError, Point2D, Timestamp, seconds_between};

use crate::transform::TransformService;

/// Registry entries not refreshed for longer than this are dropped.
pub const VISIBILITY_WINDOW_SECS: f64 = 2.0;

// ────────────────────────────────────────────────────────────────────────────
// DetectorParams
// ────────────────────────────────────────────────────────────────────────────

/// Live-tunable detector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Maximum gap (metres) between consecutive points of one cluster.
    pub grouping_threshold: f64,
    /// Clusters need strictly more points than this to be considered.
    pub min_circle_size: usize,
    /// Maximum standard deviation of the inscribed angles, in degrees.
    pub std_dev_threshold: f64,
    /// Detections closer than this (metres) are the same cone.
    pub same_cone_threshold: f64,
    pub min_cone_radius: f64,
    pub max_cone_radius: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            grouping_threshold: 0.05,
            min_circle_size: 4,
            std_dev_threshold: 15.0,
            same_cone_threshold: 0.3,
            min_cone_radius: 0.05,
            max_cone_radius: 0.25,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), NavError> {
        let invalid = |name: &str, reason: &str| NavError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        for (name, value) in [
            ("grouping_threshold", self.grouping_threshold),
            ("std_dev_threshold", self.std_dev_threshold),
            ("same_cone_threshold", self.same_cone_threshold),
            ("min_cone_radius", self.min_cone_radius),
            ("max_cone_radius", self.max_cone_radius),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(name, "must be a non-negative number"));
            }
        }
        if self.min_cone_radius > self.max_cone_radius {
            return Err(invalid("min_cone_radius", "must not exceed max_cone_radius"));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Clustering & circle fitting
// ────────────────────────────────────────────────────────────────────────────

/// Split an ordered point sequence wherever consecutive points are more than
/// `threshold` apart.
pub fn cluster_points(points: &[Point2D], threshold: f64) -> Vec<Vec<Point2D>> {
    let mut clusters: Vec<Vec<Point2D>> = Vec::new();
    let mut current: Vec<Point2D> = Vec::new();
    for &p in points {
        if let Some(prev) = current.last()
            && prev.distance(&p) > threshold
        {
            clusters.push(std::mem::take(&mut current));
        }
        current.push(p);
    }
    if !current.is_empty() {
        clusters.push(current);
    }
    clusters
}

/// A circle accepted by [`fit_circle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFit {
    pub center: Point2D,
    pub radius: f64,
    /// Mean inscribed angle in radians.
    pub mean_angle: f64,
    /// Standard deviation of the inscribed angles in degrees.
    pub std_dev_deg: f64,
}

fn cross(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Fit a circle to `cluster`, observed from `viewpoint`.
///
/// Returns `None` unless the cluster is large enough, bulges toward the
/// viewpoint by 10–70 % of its chord, has near-constant inscribed angles and
/// yields a radius inside the configured cone bounds.
pub fn fit_circle(cluster: &[Point2D], viewpoint: Point2D, params: &DetectorParams) -> Option<CircleFit> {
    let n = cluster.len();
    if n <= params.min_circle_size || n < 3 {
        return None;
    }
    let first = cluster[0];
    let last = cluster[n - 1];
    let (dx, dy) = (last.x - first.x, last.y - first.y);
    let chord = dx.hypot(dy);
    if chord <= f64::EPSILON {
        return None;
    }

    // Circle-likeness pre-filter on the middle point.
    let mid = cluster[n / 2];
    let chord_mid = Point2D::new((first.x + last.x) / 2.0, (first.y + last.y) / 2.0);
    let side = cross(dx, dy, mid.x - first.x, mid.y - first.y);
    let offset = side.abs() / chord;
    let toward_viewer = (mid.x - chord_mid.x) * (viewpoint.x - chord_mid.x)
        + (mid.y - chord_mid.y) * (viewpoint.y - chord_mid.y);
    if toward_viewer <= 0.0 || offset < 0.1 * chord || offset > 0.7 * chord {
        return None;
    }

    let angles: Vec<f64> = cluster[1..n - 1]
        .iter()
        .map(|p| {
            let (ax, ay) = (first.x - p.x, first.y - p.y);
            let (bx, by) = (last.x - p.x, last.y - p.y);
            cross(ax, ay, bx, by).abs().atan2(ax * bx + ay * by)
        })
        .collect();
    let mean = angles.iter().sum::<f64>() / angles.len() as f64;
    let variance = angles.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / angles.len() as f64;
    let std_dev_deg = variance.sqrt().to_degrees();
    if std_dev_deg >= params.std_dev_threshold {
        return None;
    }

    let sin_mean = mean.sin();
    if sin_mean <= f64::EPSILON {
        return None;
    }
    let radius = chord / (2.0 * sin_mean);

    // Unit normal to the chord on the side the arc bulges to.
    let sign = side.signum();
    let (nx, ny) = (-dy / chord * sign, dx / chord * sign);
    let h = radius * mean.cos();
    let center = Point2D::new(chord_mid.x + nx * h, chord_mid.y + ny * h);

    if radius < params.min_cone_radius || radius > params.max_cone_radius {
        debug!(radius, "circle rejected by radius bounds");
        return None;
    }
    Some(CircleFit {
        center,
        radius,
        mean_angle: mean,
        std_dev_deg,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// ConeRegistry
// ────────────────────────────────────────────────────────────────────────────

/// A cone seen recently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedCone {
    pub last_seen: Timestamp,
    pub center: Point2D,
}

/// Short-lived set of tracked cones.
///
/// No two entries are ever closer than the threshold last used to insert or
/// re-collapse.
#[derive(Debug, Clone, Default)]
pub struct ConeRegistry {
    cones: Vec<TrackedCone>,
}

impl ConeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a detection, superseding every entry within `threshold`.
    pub fn insert(&mut self, center: Point2D, stamp: Timestamp, threshold: f64) {
        self.cones.retain(|c| c.center.distance(&center) >= threshold);
        self.cones.push(TrackedCone {
            last_seen: stamp,
            center,
        });
    }

    /// Drop entries not seen within the visibility window before `now`.
    pub fn expire(&mut self, now: Timestamp) {
        self.cones
            .retain(|c| seconds_between(now, c.last_seen) <= VISIBILITY_WINDOW_SECS);
    }

    /// Re-establish the spacing invariant for a new `threshold`; the most
    /// recently inserted of two close entries survives.
    pub fn recollapse(&mut self, threshold: f64) {
        let mut kept: Vec<TrackedCone> = Vec::with_capacity(self.cones.len());
        for cone in self.cones.iter().rev() {
            if kept.iter().all(|k| k.center.distance(&cone.center) >= threshold) {
                kept.push(*cone);
            }
        }
        kept.reverse();
        self.cones = kept;
    }

    /// The tracked cone nearest to `p` within `max_distance`.
    pub fn nearest_within(&self, p: Point2D, max_distance: f64) -> Option<&TrackedCone> {
        self.cones
            .iter()
            .map(|c| (c, c.center.distance(&p)))
            .filter(|(_, d)| *d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }

    pub fn centers(&self) -> Vec<Point2D> {
        self.cones.iter().map(|c| c.center).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedCone> {
        self.cones.iter()
    }

    pub fn len(&self) -> usize {
        self.cones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cones.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ConeDetector
// ────────────────────────────────────────────────────────────────────────────

/// Scan-to-registry pipeline.
#[derive(Debug, Clone)]
pub struct ConeDetector {
    params: DetectorParams,
    fixed_frame: String,
    transform_timeout: Duration,
    registry: ConeRegistry,
}

impl ConeDetector {
    pub fn new(params: DetectorParams, fixed_frame: impl Into<String>, transform_timeout: Duration) -> Self {
        Self {
            params,
            fixed_frame: fixed_frame.into(),
            transform_timeout,
            registry: ConeRegistry::new(),
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    pub fn registry(&self) -> &ConeRegistry {
        &self.registry
    }

    pub fn fixed_frame(&self) -> &str {
        &self.fixed_frame
    }

    /// Swap in new thresholds; the registry is re-collapsed if the merge
    /// distance changed.
    pub fn set_params(&mut self, params: DetectorParams) {
        if params.same_cone_threshold != self.params.same_cone_threshold {
            self.registry.recollapse(params.same_cone_threshold);
        }
        self.params = params;
    }

    /// Process one scan and return the resulting marker set.
    ///
    /// On a transform failure the scan is dropped: the registry is untouched
    /// and the error is returned for the caller to log.
    pub fn process_scan<T>(&mut self, scan: &LaserScan, tf: &T) -> Result<ConeMarkers, NavError>
    where
        T: TransformService + ?Sized,
    {
        let to_fixed = tf.lookup_transform(
            &self.fixed_frame,
            &scan.frame_id,
            scan.stamp,
            self.transform_timeout,
        )?;
        let viewpoint = to_fixed.apply(Point2D::default());

        let points: Vec<Point2D> = scan
            .ranges
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_finite() && **r >= scan.range_min)
            .map(|(i, &r)| {
                let (s, c) = scan.angle_of(i).sin_cos();
                to_fixed.apply(Point2D::new(r * c, r * s))
            })
            .collect();

        for cluster in cluster_points(&points, self.params.grouping_threshold) {
            if let Some(fit) = fit_circle(&cluster, viewpoint, &self.params) {
                debug!(
                    x = fit.center.x,
                    y = fit.center.y,
                    radius = fit.radius,
                    std_dev_deg = fit.std_dev_deg,
                    "cone detected"
                );
                self.registry
                    .insert(fit.center, scan.stamp, self.params.same_cone_threshold);
            }
        }
        self.registry.expire(scan.stamp);

        Ok(self.markers(scan.stamp))
    }

    /// The registry as a marker set.
    pub fn markers(&self, stamp: Timestamp) -> ConeMarkers {
        ConeMarkers {
            stamp,
            frame_id: self.fixed_frame.clone(),
            points: self.registry.centers(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
