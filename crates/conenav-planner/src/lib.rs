//! `conenav-planner` – arc motion planning and failure recovery.
//!
//! Every pose update the planner picks a circular arc toward the goal that
//! stays clear of the occupancy grid, and falls back to scripted recovery
//! when none exists.
//!
//! # Modules
//!
//! - [`arc`] – tangent-arc construction, fallback candidates and arc
//!   validation against a [`CollisionMap`][conenav_perception::CollisionMap].
//! - [`state`] – [`PlannerState`][state::PlannerState] and the pure
//!   [`transition`][state::transition] function (`FORWARD`, `BACKING`,
//!   `CONE_APPROACH`).
//! - [`planner`] – [`Planner`][planner::Planner]: state between ticks, the
//!   activity gate and goal-reached rate limiting.
//! - [`params`] – [`PlannerParams`][params::PlannerParams] with defaults and
//!   validation.
//! - [`throttle`] – [`SignalThrottle`][throttle::SignalThrottle] for one-shot
//!   signals.

pub mod arc;
pub mod params;
pub mod planner;
pub mod state;
pub mod throttle;

pub use params::PlannerParams;
pub use planner::{PlanOutcome, Planner};
pub use state::{Effect, PlannerState, TickInputs, Transition, transition};
