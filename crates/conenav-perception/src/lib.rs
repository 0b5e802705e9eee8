//! `conenav-perception` – spatial memory of the ConeNav stack.
//!
//! Turns raw range scans into the two representations the planner reasons
//! over: an occupancy grid of obstacle confidence and a registry of recently
//! seen cones.
//!
//! # Modules
//!
//! - [`grid`] – [`Grid`][grid::Grid]: fixed-size square arena addressed by
//!   world coordinates, with zero-reads and ignored writes outside its bounds.
//! - [`occupancy`] – [`OccupancyMap`][occupancy::OccupancyMap]: per-scan
//!   raytrace, dilation and merge into the global grid; implements
//!   [`CollisionMap`][occupancy::CollisionMap] for arc validation.
//! - [`cone_detector`] – [`ConeDetector`][cone_detector::ConeDetector]:
//!   clusters scan points, fits circles via inscribed angles and keeps the
//!   [`ConeRegistry`][cone_detector::ConeRegistry].
//! - [`transform`] – [`TfBuffer`][transform::TfBuffer]: time-stamped 2-D frame
//!   graph behind the [`TransformService`][transform::TransformService] trait.

pub mod cone_detector;
pub mod grid;
pub mod occupancy;
pub mod transform;

pub use cone_detector::{ConeDetector, ConeRegistry, DetectorParams, TrackedCone};
pub use occupancy::{CollisionMap, MapParams, OccupancyMap};
pub use transform::{TfBuffer, TransformService};
