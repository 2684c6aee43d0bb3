//! Exact analytic collision tests.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Vec2;

/// A circular body: static obstacle, immobilized agent or any other blocker.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Circle {
    pub center: Vec2,
    pub radius: f64,
}

impl Circle {
    pub const fn new(center: Vec2, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        self.center.distance_squared(p) <= self.radius * self.radius
    }

    /// Gap between the two rims; negative when the circles overlap.
    pub fn clearance(&self, other: &Circle) -> f64 {
        self.center.distance(other.center) - self.radius - other.radius
    }
}

/// Returns true iff the segment `start..end` passes within `radius + fudge` of `center`.
///
/// The closest point is clamped to the segment, so circles beyond either endpoint only count
/// when they reach the endpoint itself. A zero-length segment degrades to a point test.
pub fn segment_circle_intersect(start: Vec2, end: Vec2, center: Vec2, radius: f64, fudge: f64) -> bool {
    let reach = radius + fudge;
    let d = end - start;
    let len2 = d.length_squared();
    if len2 == 0.0 {
        return start.distance(center) <= reach;
    }

    let t = ((center - start).dot(d) / len2).clamp(0.0, 1.0);
    let closest = start + d * t;
    closest.distance(center) <= reach
}

/// Time `t` at which two moving circles are exactly `combined_radius` apart.
///
/// Positions are extrapolated linearly: `pos + t * vel`. Returns `None` when the circles never
/// touch. Otherwise, by root placement:
///
/// - both roots non-negative: the earlier one (first contact ahead);
/// - roots straddle zero: `0.0` (overlapping now);
/// - both roots non-positive: the *later* one, `<= 0`. The contact window closed in the past
///   and the circles are separating, so this is not clamped to `0.0`. It equals `0.0` only
///   when they are touching right now.
///
/// Callers restrict to the current step with [`collides_within_step`], which therefore never
/// reports a pair that is merely moving apart.
pub fn collision_time(
    combined_radius: f64,
    pos_a: Vec2,
    pos_b: Vec2,
    vel_a: Vec2,
    vel_b: Vec2,
) -> Option<f64> {
    let dp = pos_a - pos_b;
    let dv = vel_a - vel_b;

    let a = dv.length_squared();
    let b = 2.0 * dp.dot(dv);
    let c = dp.length_squared() - combined_radius * combined_radius;

    if a == 0.0 {
        // No relative motion: either touching for the whole step or never.
        return (c <= 0.0).then_some(0.0);
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    if disc == 0.0 {
        return Some(-b / (2.0 * a));
    }

    let sq = disc.sqrt();
    let t1 = (-b - sq) / (2.0 * a);
    let t2 = (-b + sq) / (2.0 * a);

    if t1 >= 0.0 && t2 >= 0.0 {
        Some(t1.min(t2))
    } else if t1 <= 0.0 && t2 <= 0.0 {
        // Past contact; not clamped to zero.
        Some(t1.max(t2))
    } else {
        Some(0.0)
    }
}

/// True when the two trajectories touch at some `t` in `[0, 1]`.
pub fn collides_within_step(
    combined_radius: f64,
    pos_a: Vec2,
    pos_b: Vec2,
    vel_a: Vec2,
    vel_b: Vec2,
) -> bool {
    matches!(
        collision_time(combined_radius, pos_a, pos_b, vel_a, vel_b),
        Some(t) if (0.0..=1.0).contains(&t)
    )
}
