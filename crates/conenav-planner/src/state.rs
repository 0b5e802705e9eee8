//! Recovery state machine of the arc planner.
//!
//! [`transition`] is a pure function of the current [`PlannerState`], one
//! tick's [`TickInputs`] and the [`PlannerParams`]; it returns the next state,
//! the command for this tick and any side effects for the caller to carry
//! out.
//!
//! | State | Command | Leaves when |
//! |-------|---------|-------------|
//! | `Forward`      | tangent arc or best fallback toward the goal | goal reached, cone range, stuck |
//! | `Backing`      | reverse at `2·min_speed` on the recorded radius | `backup_time` elapsed or `backup_dist` covered |
//! | `ConeApproach` | `cone_speed` steered by the cone bearing | contact, or 60 s without one |

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use conenav_perception::CollisionMap;
use conenav_types::{Command, ConeBearing, Point2D, Pose, Timestamp, seconds_between};

use crate::arc;
use crate::params::PlannerParams;

/// Cone approach gives up after this many seconds without contact.
pub const CONE_APPROACH_LIMIT_SECS: f64 = 60.0;
/// Radius held while searching for a cone with no fresh bearing.
pub const EXPLORATORY_RADIUS: f64 = 2.0;
/// Steering gain applied to the cone bearing.
pub const BEARING_GAIN: f64 = 1.4;
/// Reverse speed while backing, as a multiple of `min_speed`.
pub const BACKING_SPEED_FACTOR: f64 = 2.0;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Planner mode plus the data that only exists in that mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlannerState {
    /// Driving toward the goal. `blocked_since` is set while every candidate
    /// arc has been invalid.
    Forward { blocked_since: Option<Timestamp> },
    /// Reversing away from an obstacle or a touched cone.
    Backing {
        since: Timestamp,
        pose: Point2D,
        radius: f64,
    },
    /// Homing in on a cone near the goal.
    ConeApproach {
        since: Timestamp,
        pattern_center: Point2D,
    },
}

impl Default for PlannerState {
    fn default() -> Self {
        PlannerState::Forward { blocked_since: None }
    }
}

impl PlannerState {
    pub fn name(&self) -> &'static str {
        match self {
            PlannerState::Forward { .. } => "FORWARD",
            PlannerState::Backing { .. } => "BACKING",
            PlannerState::ConeApproach { .. } => "CONE_APPROACH",
        }
    }
}

/// Everything one planning tick observes.
pub struct TickInputs<'a, M: CollisionMap + ?Sized> {
    /// Stamp of the pose update driving this tick.
    pub now: Timestamp,
    pub pose: Pose,
    pub goal: Point2D,
    pub map: &'a M,
    /// Latest contact switch state.
    pub contact: bool,
    /// Latest cone bearing, however old.
    pub bearing: Option<ConeBearing>,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Publish goal-reached with this value.
    GoalReached(bool),
    /// Publish the poses along the chosen arc.
    PathPreview(Vec<Pose>),
    /// Stop planning until a new goal arrives.
    Deactivate,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: PlannerState,
    pub command: Command,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn new(state: PlannerState, command: Command) -> Self {
        Self {
            state,
            command,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transition function
// ────────────────────────────────────────────────────────────────────────────

/// Advance the state machine by one pose tick.
pub fn transition<M>(state: &PlannerState, inputs: &TickInputs<'_, M>, params: &PlannerParams) -> Transition
where
    M: CollisionMap + ?Sized,
{
    match *state {
        PlannerState::Forward { blocked_since } => forward(blocked_since, inputs, params),
        PlannerState::Backing { since, pose, radius } => backing(since, pose, radius, inputs, params),
        PlannerState::ConeApproach { since, pattern_center } => {
            cone_approach(since, pattern_center, inputs, params)
        }
    }
}

fn forward<M>(blocked_since: Option<Timestamp>, inputs: &TickInputs<'_, M>, params: &PlannerParams) -> Transition
where
    M: CollisionMap + ?Sized,
{
    let start = inputs.pose;
    let d = start.position().distance(&inputs.goal);

    if d < params.goal_err {
        info!(distance = d, "goal reached");
        return Transition::new(PlannerState::Forward { blocked_since: None }, Command::stop())
            .with(Effect::GoalReached(true))
            .with(Effect::Deactivate);
    }

    if params.track_cones && d < params.cone_dist {
        info!(distance = d, "starting cone tracking");
        let next = PlannerState::ConeApproach {
            since: inputs.now,
            pattern_center: start.position(),
        };
        return transition(&next, inputs, params);
    }

    let traverse = d.min(params.planner_lookahead);
    let speed = (params.max_speed * 2.0 * traverse / params.planner_lookahead)
        .min(params.max_speed)
        .max(params.min_speed);

    let (tangent, alpha) = arc::tangent_arc(
        &start,
        inputs.goal,
        params.min_radius,
        params.max_radius,
        params.planner_lookahead,
    );

    let chosen = if arc::arc_is_clear(inputs.map, &start, tangent) {
        Some(tangent)
    } else {
        debug!(radius = tangent.radius, length = tangent.length, "tangent arc failed");
        let candidates = arc::fallback_arcs(traverse, params.min_radius, params.max_radius);
        arc::best_fallback(inputs.map, &start, inputs.goal, &candidates)
    };

    match chosen {
        Some(chosen) => {
            let step = inputs.map.resolution() / 2.0;
            let preview = arc::sample_arc(&start, chosen, step);
            Transition::new(
                PlannerState::Forward { blocked_since: None },
                Command::new(speed, chosen.radius),
            )
            .with(Effect::PathPreview(preview))
        }
        None => {
            warn!("no valid forward paths found");
            match blocked_since {
                Some(t) if seconds_between(inputs.now, t) > params.stuck_timeout => {
                    let radius = if alpha > 0.0 {
                        -params.min_radius
                    } else {
                        params.min_radius
                    };
                    warn!(radius, "robot stuck; backing up");
                    Transition::new(
                        PlannerState::Backing {
                            since: inputs.now,
                            pose: start.position(),
                            radius,
                        },
                        Command::stop(),
                    )
                }
                Some(t) => Transition::new(PlannerState::Forward { blocked_since: Some(t) }, Command::stop()),
                None => Transition::new(
                    PlannerState::Forward {
                        blocked_since: Some(inputs.now),
                    },
                    Command::stop(),
                ),
            }
        }
    }
}

fn backing<M>(
    since: Timestamp,
    pose: Point2D,
    radius: f64,
    inputs: &TickInputs<'_, M>,
    params: &PlannerParams,
) -> Transition
where
    M: CollisionMap + ?Sized,
{
    let command = Command::new(-BACKING_SPEED_FACTOR * params.min_speed, radius);
    let elapsed = seconds_between(inputs.now, since);
    let moved = inputs.pose.position().distance(&pose);
    let next = if elapsed > params.backup_time || moved > params.backup_dist {
        debug!(elapsed, moved, "backing finished");
        PlannerState::Forward { blocked_since: None }
    } else {
        PlannerState::Backing { since, pose, radius }
    };
    Transition::new(next, command)
}

fn cone_approach<M>(
    since: Timestamp,
    pattern_center: Point2D,
    inputs: &TickInputs<'_, M>,
    params: &PlannerParams,
) -> Transition
where
    M: CollisionMap + ?Sized,
{
    if inputs.contact {
        info!("cone hit");
        return Transition::new(
            PlannerState::Backing {
                since: inputs.now,
                pose: inputs.pose.position(),
                radius: 0.0,
            },
            Command::stop(),
        )
        .with(Effect::GoalReached(false))
        .with(Effect::Deactivate);
    }

    if seconds_between(inputs.now, since) > CONE_APPROACH_LIMIT_SECS {
        info!("cone tracking timed out");
        return Transition::new(PlannerState::Forward { blocked_since: None }, Command::stop())
            .with(Effect::GoalReached(false))
            .with(Effect::Deactivate);
    }

    let fresh = inputs
        .bearing
        .filter(|b| seconds_between(inputs.now, b.stamp) < params.cone_timeout);
    let radius = match fresh {
        Some(b) => params.cone_speed / (b.angle * BEARING_GAIN),
        None => {
            debug!("no cones in view; searching");
            EXPLORATORY_RADIUS
        }
    };

    Transition::new(
        PlannerState::ConeApproach { since, pattern_center },
        Command::new(params.cone_speed, steerable_radius(radius, params)),
    )
}

/// Snap a raw steering radius onto what the base can drive: too wide (or
/// undefined) drives straight, too tight turns at `min_radius`.
pub fn steerable_radius(radius: f64, params: &PlannerParams) -> f64 {
    if !radius.is_finite() || radius.abs() > params.max_radius {
        0.0
    } else if radius.abs() < params.min_radius {
        if radius < 0.0 { -params.min_radius } else { params.min_radius }
    } else {
        radius
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
