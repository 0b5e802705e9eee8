//! Circular-arc geometry.
//!
//! An arc starts at a [`Pose`], is tangent to its heading and has a signed
//! radius: positive turns left, negative turns right, `0.0` is a straight
//! segment. Everything here is pure geometry; the only world knowledge comes
//! in through a [`CollisionMap`].

use std::f64::consts::{FRAC_PI_2, PI};

use conenav_perception::CollisionMap;
use conenav_types::{Point2D, Pose};

/// Radius fallback candidates are `min_radius · 2^k` for `k` below this.
pub const FALLBACK_DOUBLINGS: u32 = 4;

/// A candidate motion: follow an arc of `radius` for `length` metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub radius: f64,
    pub length: f64,
}

impl Arc {
    pub fn new(radius: f64, length: f64) -> Self {
        Self { radius, length }
    }

    pub fn straight(length: f64) -> Self {
        Self::new(0.0, length)
    }
}

/// Pose reached after travelling `dist` metres along the arc of `radius`
/// starting at `start`.
pub fn arc_point(start: &Pose, radius: f64, dist: f64) -> Pose {
    if radius == 0.0 {
        let (s, c) = start.heading.sin_cos();
        return Pose::new(start.x + dist * c, start.y + dist * s, start.heading);
    }
    let cx = start.x - radius * start.heading.sin();
    let cy = start.y + radius * start.heading.cos();
    let a = start.heading - FRAC_PI_2 + dist / radius;
    Pose::new(cx + radius * a.cos(), cy + radius * a.sin(), start.heading + dist / radius)
}

/// Poses at `step` spacing along the arc, from the start up to (not
/// including) `arc.length`.
pub fn sample_arc(start: &Pose, arc: Arc, step: f64) -> Vec<Pose> {
    if !(step > 0.0) || !arc.length.is_finite() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut k = 0u32;
    loop {
        let d = k as f64 * step;
        if d >= arc.length {
            break;
        }
        out.push(arc_point(start, arc.radius, d));
        k += 1;
    }
    out
}

/// `true` if no sample along `arc` falls in an occupied cell.
pub fn arc_is_clear<M>(map: &M, start: &Pose, arc: Arc) -> bool
where
    M: CollisionMap + ?Sized,
{
    sample_arc(start, arc, map.resolution() / 2.0)
        .iter()
        .all(|p| !map.collides(p.position()))
}

/// The arc tangent to the start heading that passes through `goal`, and the
/// folded turn angle it was derived from.
///
/// The turn angle `2·(bearing − heading)` is wrapped into `[−2π, 2π]`, then
/// folded into `[−π, π]` keeping its turning direction. The radius follows
/// from the isosceles triangle over the chord:
/// `r = d·sin β / sin α = d / (2·sin(α/2))` with `β = (π − |α|)/2`.
/// Goals behind the robot (`|raw| > π`) get a minimum-radius turn; radii
/// tighter than `min_radius` become a straight advance of `min_radius`.
pub fn tangent_arc(start: &Pose, goal: Point2D, min_radius: f64, max_radius: f64, lookahead: f64) -> (Arc, f64) {
    let d = start.position().distance(&goal);
    let theta = start.angle_to(&goal);

    let mut alpha = 2.0 * (theta - start.heading);
    alpha -= (alpha / (4.0 * PI)).round() * 4.0 * PI;
    let raw = alpha;
    if alpha > PI {
        alpha = 2.0 * PI - alpha;
    } else if alpha < -PI {
        alpha = -2.0 * PI - alpha;
    }

    let (mut radius, mut length) = if raw.abs() > PI {
        // Goal behind: turn around at minimum radius.
        let r = if alpha < 0.0 { -min_radius } else { min_radius };
        (r, (raw * r).abs())
    } else if alpha.abs() < 1e-9 {
        (0.0, d)
    } else {
        let r = d / (2.0 * (alpha / 2.0).sin());
        (r, (raw * r).abs())
    };

    if radius != 0.0 && radius.abs() < min_radius {
        radius = 0.0;
        length = min_radius;
    }
    radius = radius.clamp(-max_radius, max_radius);
    length = length.min(lookahead);

    (Arc::new(radius, length), alpha)
}

/// Fallback candidates in preference order: straight ahead for `traverse`
/// metres, then `±min_radius·2^k` clamped to `max_radius`, each capped at a
/// quarter turn.
pub fn fallback_arcs(traverse: f64, min_radius: f64, max_radius: f64) -> Vec<Arc> {
    let mut arcs = vec![Arc::straight(traverse)];
    for k in 0..FALLBACK_DOUBLINGS {
        let r = (min_radius * f64::from(1u32 << k)).min(max_radius);
        let length = traverse.min(r * FRAC_PI_2);
        arcs.push(Arc::new(r, length));
        arcs.push(Arc::new(-r, length));
    }
    arcs
}

/// Endpoint distances closer than this count as a tie.
const TIE_TOLERANCE: f64 = 1e-9;

/// Among the clear candidates, the one whose endpoint lands closest to
/// `goal`; earlier candidates win ties.
pub fn best_fallback<M>(map: &M, start: &Pose, goal: Point2D, candidates: &[Arc]) -> Option<Arc>
where
    M: CollisionMap + ?Sized,
{
    let mut best: Option<(Arc, f64)> = None;
    for &arc in candidates {
        if !arc_is_clear(map, start, arc) {
            continue;
        }
        let miss = arc_point(start, arc.radius, arc.length).position().distance(&goal);
        if best.is_none_or(|(_, d)| miss < d - TIE_TOLERANCE) {
            best = Some((arc, miss));
        }
    }
    best.map(|(arc, _)| arc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conenav_perception::{MapParams, OccupancyMap};

    const MIN_R: f64 = 0.695;
    const MAX_R: f64 = 4.0;

    fn open_map() -> OccupancyMap {
        OccupancyMap::new(MapParams {
            size: 400,
            ..MapParams::default()
        })
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn straight_arc_moves_along_heading() {
        let p = arc_point(&Pose::new(1.0, 1.0, FRAC_PI_2), 0.0, 2.0);
        assert!(close(p.x, 1.0) && close(p.y, 3.0));
    }

    #[test]
    fn left_quarter_turn_ends_at_center_offset() {
        let start = Pose::new(0.0, 0.0, 0.0);
        let p = arc_point(&start, 1.0, FRAC_PI_2);
        assert!(close(p.x, 1.0), "x={}", p.x);
        assert!(close(p.y, 1.0), "y={}", p.y);
        assert!(close(p.heading, FRAC_PI_2));
    }

    #[test]
    fn right_turn_mirrors_left_turn() {
        let start = Pose::new(0.0, 0.0, 0.0);
        let l = arc_point(&start, 2.0, 1.0);
        let r = arc_point(&start, -2.0, 1.0);
        assert!(close(l.x, r.x));
        assert!(close(l.y, -r.y));
        assert!(close(l.heading, -r.heading));
    }

    #[test]
    fn samples_are_half_open() {
        let poses = sample_arc(&Pose::default(), Arc::straight(1.0), 0.25);
        assert_eq!(poses.len(), 4);
        assert!(close(poses[3].x, 0.75));
        assert!(sample_arc(&Pose::default(), Arc::straight(0.0), 0.05).is_empty());
    }

    #[test]
    fn tangent_arc_straight_ahead() {
        let (arc, alpha) = tangent_arc(&Pose::default(), Point2D::new(5.0, 0.0), MIN_R, MAX_R, 4.0);
        assert_eq!(arc.radius, 0.0);
        assert!(close(arc.length, 4.0));
        assert!(close(alpha, 0.0));
    }

    #[test]
    fn tangent_arc_passes_through_goal() {
        let start = Pose::new(0.0, 0.0, 0.0);
        let goal = Point2D::new(2.0, 1.0);
        let (arc, _) = tangent_arc(&start, goal, MIN_R, MAX_R, 10.0);
        assert!(arc.radius > 0.0);
        // r = d / (2 sin φ): d = √5, sin φ = 1/√5.
        assert!(close(arc.radius, 2.5));
        let end = arc_point(&start, arc.radius, arc.length);
        assert!(end.position().distance(&goal) < 1e-9, "end={end:?}");
    }

    #[test]
    fn tangent_arc_turns_right_for_goals_on_the_right() {
        let (arc, alpha) = tangent_arc(&Pose::default(), Point2D::new(2.0, -1.0), MIN_R, MAX_R, 10.0);
        assert!(arc.radius < 0.0);
        assert!(alpha < 0.0);
    }

    #[test]
    fn goals_behind_get_minimum_radius() {
        let (arc, alpha) = tangent_arc(&Pose::default(), Point2D::new(-3.0, 0.5), MIN_R, MAX_R, 4.0);
        assert!(close(arc.radius, MIN_R));
        assert!(alpha > 0.0);
        let (arc, _) = tangent_arc(&Pose::default(), Point2D::new(-3.0, -0.5), MIN_R, MAX_R, 4.0);
        assert!(close(arc.radius, -MIN_R));
    }

    #[test]
    fn goal_dead_astern_still_turns() {
        let (arc, _) = tangent_arc(&Pose::default(), Point2D::new(-2.0, 0.0), MIN_R, MAX_R, 4.0);
        assert!(close(arc.radius.abs(), MIN_R));
    }

    #[test]
    fn tight_turns_become_straight_advance() {
        // Goal 0.5 m to the left: tangent radius 0.25 m.
        let (arc, _) = tangent_arc(&Pose::default(), Point2D::new(0.0, 0.5), MIN_R, MAX_R, 4.0);
        assert_eq!(arc.radius, 0.0);
        assert!(close(arc.length, MIN_R));
    }

    #[test]
    fn sweeping_curves_are_clamped() {
        let (arc, _) = tangent_arc(&Pose::default(), Point2D::new(20.0, 0.5), MIN_R, MAX_R, 4.0);
        assert!(close(arc.radius, MAX_R));
        assert!(close(arc.length, 4.0));
    }

    #[test]
    fn tangent_radius_always_within_bounds() {
        for i in 0..72 {
            let bearing = i as f64 * 5f64.to_radians();
            for &dist in &[0.2, 0.7, 1.5, 3.0, 8.0] {
                let goal = Point2D::new(dist * bearing.cos(), dist * bearing.sin());
                let start = Pose::new(0.0, 0.0, 0.3);
                let (arc, _) = tangent_arc(&start, goal, MIN_R, MAX_R, 4.0);
                let r = arc.radius.abs();
                assert!(r == 0.0 || (MIN_R..=MAX_R).contains(&r), "bearing={bearing} d={dist} r={r}");
                assert!(arc.length <= 4.0 && arc.length >= 0.0);
            }
        }
    }

    #[test]
    fn fallback_order_and_lengths() {
        let arcs = fallback_arcs(4.0, MIN_R, 10.0);
        assert_eq!(arcs.len(), 9);
        assert_eq!(arcs[0], Arc::straight(4.0));
        assert!(close(arcs[1].radius, MIN_R) && close(arcs[2].radius, -MIN_R));
        assert!(close(arcs[1].length, MIN_R * FRAC_PI_2));
        assert!(close(arcs[8].radius, -8.0 * MIN_R));
        assert!(close(arcs[8].length, 4.0));
    }

    #[test]
    fn fallback_radii_never_exceed_max_radius() {
        let arcs = fallback_arcs(4.0, MIN_R, MAX_R);
        assert_eq!(arcs.len(), 9);
        for a in &arcs[1..] {
            let r = a.radius.abs();
            assert!((MIN_R..=MAX_R).contains(&r), "r={r}");
        }
        // 4·min_radius still fits; 8·min_radius is clamped, sign kept.
        assert!(close(arcs[5].radius, 4.0 * MIN_R));
        assert!(close(arcs[7].radius, MAX_R) && close(arcs[8].radius, -MAX_R));
        assert!(close(arcs[7].length, 4.0));
    }

    #[test]
    fn mirrored_candidates_tie_to_left_turn() {
        let map = open_map();
        let start = Pose::default();
        // Goal dead astern: every ±r pair ends equally far from it.
        let goal = Point2D::new(-5.0, 0.0);
        let left = Arc::new(1.0, FRAC_PI_2);
        let right = Arc::new(-1.0, FRAC_PI_2);
        assert_eq!(best_fallback(&map, &start, goal, &[left, right]), Some(left));
        assert_eq!(best_fallback(&map, &start, goal, &[right, left]), Some(right));

        // Same through the full candidate set once straight is walled off.
        let mut blocked = open_map();
        blocked.mark(Point2D::new(0.5, 0.0), 2);
        let best = best_fallback(&blocked, &start, goal, &fallback_arcs(3.0, MIN_R, MAX_R)).unwrap();
        assert!(best.radius > 0.0, "best={best:?}");
    }

    #[test]
    fn straight_wins_an_equidistant_tie() {
        let map = open_map();
        let start = Pose::default();
        let straight = Arc::straight(2.0);
        // Ends at (1, 1).
        let turn = Arc::new(1.0, FRAC_PI_2);
        // On the perpendicular bisector of (2, 0) and (1, 1).
        let goal = Point2D::new(3.5, 2.5);
        let a = arc_point(&start, straight.radius, straight.length).position().distance(&goal);
        let b = arc_point(&start, turn.radius, turn.length).position().distance(&goal);
        assert!((a - b).abs() < 1e-9);

        assert_eq!(best_fallback(&map, &start, goal, &[straight, turn]), Some(straight));
        assert_eq!(best_fallback(&map, &start, goal, &[turn, straight]), Some(turn));
    }

    #[test]
    fn blocked_arcs_are_detected() {
        let mut map = open_map();
        assert!(arc_is_clear(&map, &Pose::default(), Arc::straight(3.0)));
        map.mark(Point2D::new(2.0, 0.0), 2);
        assert!(!arc_is_clear(&map, &Pose::default(), Arc::straight(3.0)));
        assert!(arc_is_clear(&map, &Pose::default(), Arc::straight(1.5)));
    }

    #[test]
    fn best_fallback_prefers_closest_endpoint() {
        let map = open_map();
        let start = Pose::default();
        let goal = Point2D::new(1.0, 3.0);
        let arcs = fallback_arcs(3.0, MIN_R, MAX_R);
        let best = best_fallback(&map, &start, goal, &arcs).unwrap();
        // Straight validates first but a left turn lands nearer the goal.
        assert!(best.radius > 0.0, "best={best:?}");
    }

    #[test]
    fn best_fallback_none_when_all_blocked() {
        let mut map = open_map();
        for i in -30..=30 {
            for j in -30..=30 {
                let p = Point2D::new(i as f64 * 0.1, j as f64 * 0.1);
                if p.distance(&Point2D::default()) > 0.2 {
                    map.mark(p, 1);
                }
            }
        }
        let arcs = fallback_arcs(3.0, MIN_R, MAX_R);
        assert!(best_fallback(&map, &Pose::default(), Point2D::new(5.0, 0.0), &arcs).is_none());
    }
}
