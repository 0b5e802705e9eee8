//! Occupancy grid: obstacle memory built from range scans.
//!
//! Each scan is raytraced into a small **local** grid anchored at the robot's
//! cell, dilated by the robot radius, then merged into the large **global**
//! grid, where each cell holds an obstacle confidence level in `[0, 4]`.
//!
//! # Pipeline
//!
//! | Step | What happens |
//! |------|--------------|
//! | interpret | raw ranges pass through [`interpret_range`] (status codes, invalid readings) |
//! | raytrace  | cells along each beam are marked [`CLEARED`], the end cell [`OBSTACLE`] |
//! | dilate    | [`dilate`] grows obstacle labels outward, 4-connected |
//! | merge     | positive labels add [`MERGE_WEIGHT`], cleared cells subtract 1, saturating |
//! | footprint | cells under the robot's rectangle are forced to 0 |
//!
//! A point collides iff its global cell is non-zero; outside the map nothing
//! collides.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use conenav_perception::occupancy::{CollisionMap, MapParams, OccupancyMap};
//! use conenav_types::{LaserScan, Point2D, Pose};
//!
//! let params = MapParams { size: 400, ..MapParams::default() };
//! let mut map = OccupancyMap::new(params);
//!
//! // A single beam straight ahead hitting something 2 m away.
//! let scan = LaserScan {
//!     stamp: Utc::now(),
//!     frame_id: "laser".into(),
//!     angle_min: 0.0,
//!     angle_increment: 0.01,
//!     range_min: 0.02,
//!     ranges: vec![2.0],
//! };
//! map.update(&Pose::new(0.0, 0.0, 0.0), &scan);
//!
//! // The laser sits 0.26 m ahead of the robot centre.
//! assert!(map.collides(Point2D::new(2.26, 0.0)));
//! assert!(!map.collides(Point2D::new(1.0, 0.0)));
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use conenav_types::{GridSnapshot, LaserScan, NavError, Point2D, Pose, Timestamp};

use crate::grid::Grid;

/// Local label for a cell a beam passed through.
pub const CLEARED: i8 = -1;
/// Local label for a cell nothing is known about.
pub const UNKNOWN: i8 = 0;
/// Local label for a raw obstacle return, before dilation.
pub const OBSTACLE: i8 = 1;

/// Weight every positive local label contributes when merged.
pub const MERGE_WEIGHT: i16 = 2;
/// Saturation level of a global cell.
pub const MAX_LEVEL: u8 = 4;

/// Range substituted for a literal zero return ("nothing within range").
pub const NO_RETURN_RANGE: f64 = 22.0;

// ────────────────────────────────────────────────────────────────────────────
// CollisionMap
// ────────────────────────────────────────────────────────────────────────────

/// Anything the planner can validate candidate arcs against.
pub trait CollisionMap {
    /// `true` if `p` lies in an occupied cell.
    fn collides(&self, p: Point2D) -> bool;

    /// Metres per cell; arcs are sampled at half this spacing.
    fn resolution(&self) -> f64;
}

// ────────────────────────────────────────────────────────────────────────────
// MapParams
// ────────────────────────────────────────────────────────────────────────────

/// Geometry of the grids and of the robot body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapParams {
    /// Metres per cell, shared by the local and global grids.
    pub resolution: f64,
    /// Global grid side length in cells.
    pub size: usize,
    /// Local grid side length in cells; should cover the scanner's range.
    pub local_size: usize,
    /// Obstacles are dilated by this radius (metres).
    pub robot_radius: f64,
    /// Scanner mounting offset ahead of the robot centre (metres).
    pub laser_offset: f64,
    /// Footprint extent ahead of the robot centre (metres).
    pub footprint_front: f64,
    /// Footprint extent behind the robot centre (metres).
    pub footprint_back: f64,
    /// Footprint half-width (metres).
    pub footprint_half_width: f64,
    /// Emit a grid snapshot every this many scans; `0` disables snapshots.
    pub snapshot_interval: u64,
    /// Side length in cells of the snapshot window.
    pub snapshot_size: usize,
}

impl Default for MapParams {
    fn default() -> Self {
        Self {
            resolution: 0.10,
            size: 5000,
            local_size: 150,
            robot_radius: 0.4,
            laser_offset: 0.26,
            footprint_front: 0.45,
            footprint_back: 0.17,
            footprint_half_width: 0.16,
            snapshot_interval: 20,
            snapshot_size: 200,
        }
    }
}

impl MapParams {
    /// Reject geometry the grid cannot be built from.
    pub fn validate(&self) -> Result<(), NavError> {
        let invalid = |name: &str, reason: &str| NavError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(invalid("resolution", "must be a positive number of metres"));
        }
        if self.size == 0 || self.local_size == 0 {
            return Err(invalid("size", "grid sizes must be non-zero"));
        }
        if self.robot_radius < 0.0 {
            return Err(invalid("robot_radius", "must not be negative"));
        }
        if self.footprint_front < 0.0 || self.footprint_back < 0.0 || self.footprint_half_width < 0.0 {
            return Err(invalid("footprint", "extents must not be negative"));
        }
        Ok(())
    }

    /// Number of dilation steps: labels grow from 1 up to this value.
    pub fn dilation_steps(&self) -> i8 {
        // The epsilon keeps an exact multiple (0.4 / 0.1) from rounding up.
        let steps = (self.robot_radius / self.resolution - 1e-9).ceil().max(0.0);
        steps.min(i8::MAX as f64 - 1.0) as i8
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Range interpretation
// ────────────────────────────────────────────────────────────────────────────

/// Map a raw range reading to the distance a beam should be traced.
///
/// Real returns (`raw ≥ range_min`) pass through. Below `range_min` the
/// scanner reports status codes: a literal zero means nothing was hit, and
/// two narrow near-zero bands stand for fixed sentinel distances. Anything
/// else, including non-finite values, is invalid and yields `None`.
pub fn interpret_range(raw: f64, range_min: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    if raw >= range_min {
        Some(raw)
    } else if raw == 0.0 {
        Some(NO_RETURN_RANGE)
    } else if raw > 0.0055 && raw < 0.0065 {
        Some(5.7)
    } else if raw > 0.0155 && raw < 0.0165 {
        Some(5.0)
    } else {
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dilation
// ────────────────────────────────────────────────────────────────────────────

/// Grow obstacle labels outward by `steps - 1` cells.
///
/// For each growth radius `r` in `1..steps`, every non-positive cell with a
/// 4-connected neighbour labelled exactly `r` becomes `r + 1`. Cells written
/// during pass `r` carry `r + 1` and cannot seed further growth within the
/// same pass, so the result does not depend on scan order.
pub fn dilate(local: &mut Grid<i8>, steps: i8) {
    let n = local.size();
    for r in 1..steps {
        for i in 0..n {
            for j in 0..n {
                if local.cell(i, j).is_none_or(|v| v > 0) {
                    continue;
                }
                let touches = (i > 0 && local.cell(i - 1, j) == Some(r))
                    || (j > 0 && local.cell(i, j - 1) == Some(r))
                    || (i + 1 < n && local.cell(i + 1, j) == Some(r))
                    || (j + 1 < n && local.cell(i, j + 1) == Some(r));
                if touches {
                    local.set_cell(i, j, r + 1);
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OccupancyMap
// ────────────────────────────────────────────────────────────────────────────

/// Global obstacle-confidence grid plus the scratch local grid it is fed
/// through.
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    params: MapParams,
    global: Grid<u8>,
    local: Grid<i8>,
    scans: u64,
}

impl OccupancyMap {
    /// Create an empty map; every cell starts free.
    pub fn new(params: MapParams) -> Self {
        Self {
            global: Grid::new(params.size, params.resolution),
            local: Grid::new(params.local_size, params.resolution),
            scans: 0,
            params,
        }
    }

    pub fn params(&self) -> &MapParams {
        &self.params
    }

    /// Number of scans merged so far.
    pub fn scans_processed(&self) -> u64 {
        self.scans
    }

    /// Confidence level of the cell containing `p` (0 outside the map).
    pub fn level(&self, p: Point2D) -> u8 {
        self.global.get(p.x, p.y)
    }

    /// Force the cell containing `p` to `level` (clamped). Used to seed maps.
    pub fn mark(&mut self, p: Point2D, level: u8) {
        self.global.set(p.x, p.y, level.min(MAX_LEVEL));
    }

    /// `true` when a snapshot is due after the latest scan.
    pub fn snapshot_due(&self) -> bool {
        self.params.snapshot_interval > 0
            && self.scans > 0
            && self.scans % self.params.snapshot_interval == 0
    }

    /// Fold one scan taken at `pose` into the global grid.
    pub fn update(&mut self, pose: &Pose, scan: &LaserScan) {
        let anchor = self.anchor_of(pose);
        self.build_local(pose, anchor, scan);
        dilate(&mut self.local, self.params.dilation_steps());
        self.merge_local(anchor);
        self.clear_footprint(pose);
        self.scans += 1;
        trace!(scans = self.scans, beams = scan.ranges.len(), "occupancy grid updated");
    }

    /// Robot position snapped to the nearest cell centre.
    fn anchor_of(&self, pose: &Pose) -> Point2D {
        let res = self.params.resolution;
        Point2D::new((pose.x / res).round() * res, (pose.y / res).round() * res)
    }

    fn build_local(&mut self, pose: &Pose, anchor: Point2D, scan: &LaserScan) {
        self.local.fill(UNKNOWN);

        let (sin_h, cos_h) = pose.heading.sin_cos();
        let origin = Point2D::new(
            pose.x - anchor.x + self.params.laser_offset * cos_h,
            pose.y - anchor.y + self.params.laser_offset * sin_h,
        );
        let step = self.params.resolution / 2.0;

        let mut hits = Vec::new();
        for (i, &raw) in scan.ranges.iter().enumerate() {
            let Some(range) = interpret_range(raw, scan.range_min) else {
                continue;
            };
            let (sin_t, cos_t) = (pose.heading + scan.angle_of(i)).sin_cos();

            let mut d = 0.0;
            while d < range {
                let x = origin.x + d * cos_t;
                let y = origin.y + d * sin_t;
                match self.local.index_of(x, y) {
                    Some((ci, cj)) => {
                        self.local.set_cell(ci, cj, CLEARED);
                    }
                    None => break,
                }
                d += step;
            }

            if raw.is_finite() && raw >= scan.range_min {
                hits.push(Point2D::new(origin.x + raw * cos_t, origin.y + raw * sin_t));
            }
        }

        // Obstacles win over any beam that cleared the same cell.
        for hit in hits {
            self.local.set(hit.x, hit.y, OBSTACLE);
        }
    }

    fn merge_local(&mut self, anchor: Point2D) {
        let n = self.local.size();
        for i in 0..n {
            for j in 0..n {
                let weight: i16 = match self.local.cell(i, j) {
                    Some(v) if v > 0 => MERGE_WEIGHT,
                    Some(CLEARED) => -1,
                    _ => continue,
                };
                let x = self.local.cell_center(i) + anchor.x;
                let y = self.local.cell_center(j) + anchor.y;
                let level = (self.global.get(x, y) as i16 + weight).clamp(0, MAX_LEVEL as i16);
                self.global.set(x, y, level as u8);
            }
        }
    }

    /// Zero the oriented rectangle under the robot.
    fn clear_footprint(&mut self, pose: &Pose) {
        let p = &self.params;
        let step = p.resolution / 2.0;
        let along = ((p.footprint_front + p.footprint_back) / step).floor() as usize;
        let across = (2.0 * p.footprint_half_width / step).floor() as usize;
        let (sin_h, cos_h) = pose.heading.sin_cos();

        for a in 0..=along {
            let fwd = -p.footprint_back + a as f64 * step;
            for c in 0..=across {
                let side = -p.footprint_half_width + c as f64 * step;
                let x = pose.x + fwd * cos_h - side * sin_h;
                let y = pose.y + fwd * sin_h + side * cos_h;
                self.global.set(x, y, 0);
            }
        }
    }

    /// Square window of the global grid centred on the robot's cell.
    pub fn snapshot(&self, pose: &Pose, stamp: Timestamp, frame_id: &str) -> GridSnapshot {
        let width = self.params.snapshot_size;
        let half = (self.params.size / 2) as i64;
        let (ci, cj) = self
            .global
            .index_of(pose.x, pose.y)
            .map(|(i, j)| (i as i64, j as i64))
            .unwrap_or((half, half));
        let start_i = ci - (width / 2) as i64;
        let start_j = cj - (width / 2) as i64;

        let mut cells = Vec::with_capacity(width * width);
        for row in 0..width as i64 {
            for col in 0..width as i64 {
                cells.push(self.global.cell_or_default(start_i + col, start_j + row));
            }
        }

        let res = self.params.resolution;
        GridSnapshot {
            stamp,
            frame_id: frame_id.to_string(),
            resolution: res,
            width,
            origin: Point2D::new((start_i - half) as f64 * res, (start_j - half) as f64 * res),
            cells,
        }
    }
}

impl CollisionMap for OccupancyMap {
    fn collides(&self, p: Point2D) -> bool {
        self.level(p) != 0
    }

    fn resolution(&self) -> f64 {
        self.params.resolution
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
