//! [`Planner`] – owns the recovery state machine between ticks.
//!
//! Wraps the pure [`transition`] with the bits of state that outlive a single
//! tick: whether a goal is being pursued at all, and when goal-reached was
//! last signalled.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use conenav_perception::{MapParams, OccupancyMap};
//! use conenav_planner::{Planner, PlannerParams, TickInputs};
//! use conenav_types::{Point2D, Pose};
//!
//! let map = OccupancyMap::new(MapParams { size: 200, ..MapParams::default() });
//! let mut planner = Planner::new(PlannerParams::default());
//! planner.activate();
//!
//! let outcome = planner.tick(&TickInputs {
//!     now: Utc::now(),
//!     pose: Pose::new(0.0, 0.0, 0.0),
//!     goal: Point2D::new(5.0, 0.0),
//!     map: &map,
//!     contact: false,
//!     bearing: None,
//! });
//! assert_eq!(outcome.command.radius, 0.0);
//! assert!(outcome.path.is_some());
//! ```

use tracing::info;

use conenav_perception::CollisionMap;
use conenav_types::{Command, Pose};

use crate::params::PlannerParams;
use crate::state::{Effect, PlannerState, TickInputs, transition};
use crate::throttle::SignalThrottle;

/// Goal-reached is signalled at most once per this many seconds.
pub const GOAL_REACHED_INTERVAL_SECS: f64 = 0.5;

/// What one tick produced, after rate limiting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanOutcome {
    pub command: Command,
    /// Goal-reached value to publish, if any survived the throttle.
    pub goal_reached: Option<bool>,
    /// Poses along the chosen arc.
    pub path: Option<Vec<Pose>>,
}

/// The arc planner with its recovery state and activity gate.
#[derive(Debug, Clone)]
pub struct Planner {
    params: PlannerParams,
    state: PlannerState,
    active: bool,
    goal_reached: SignalThrottle,
}

impl Planner {
    /// A new planner starts idle, in `Forward`.
    pub fn new(params: PlannerParams) -> Self {
        Self {
            params,
            state: PlannerState::default(),
            active: false,
            goal_reached: SignalThrottle::new(GOAL_REACHED_INTERVAL_SECS),
        }
    }

    pub fn params(&self) -> &PlannerParams {
        &self.params
    }

    /// Swap in a validated parameter set; takes effect on the next tick.
    pub fn set_params(&mut self, params: PlannerParams) {
        self.params = params;
    }

    pub fn state(&self) -> &PlannerState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start (or resume) pursuing the goal. The recovery state is kept, so a
    /// pending back-up runs first.
    pub fn activate(&mut self) {
        if !self.active {
            info!(state = self.state.name(), "planner activated");
        }
        self.active = true;
    }

    /// Run one planning tick. An idle planner commands a stop and changes
    /// nothing.
    pub fn tick<M>(&mut self, inputs: &TickInputs<'_, M>) -> PlanOutcome
    where
        M: CollisionMap + ?Sized,
    {
        if !self.active {
            return PlanOutcome::default();
        }

        let t = transition(&self.state, inputs, &self.params);
        if t.state.name() != self.state.name() {
            info!(from = self.state.name(), to = t.state.name(), "planner state change");
        }
        self.state = t.state;

        let mut outcome = PlanOutcome {
            command: t.command,
            ..PlanOutcome::default()
        };
        for effect in t.effects {
            match effect {
                Effect::GoalReached(value) => {
                    if self.goal_reached.try_fire(inputs.now) {
                        outcome.goal_reached = Some(value);
                    }
                }
                Effect::PathPreview(poses) => outcome.path = Some(poses),
                Effect::Deactivate => {
                    self.active = false;
                    info!("planner idle until next goal");
                }
            }
        }
        outcome
    }
}
