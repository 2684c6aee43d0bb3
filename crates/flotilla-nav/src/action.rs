//! Discrete action space and per-heading safe thrust.

use flotilla_geom::{segment_circle_intersect, Circle, Heading, ThrustProfile, Vec2, HEADING_COUNT, MAX_THRUST};
use serde::{Deserialize, Serialize};

/// One movement option for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub heading: Heading,
    pub thrust: u8,
    /// Full thrust now, judged by where a second full-thrust step along the same heading leads.
    pub lookahead: bool,
}

impl Candidate {
    pub const HOLD: Self = Self {
        heading: Heading::EAST,
        thrust: 0,
        lookahead: false,
    };

    pub fn new(heading: Heading, thrust: u8) -> Self {
        Self {
            heading,
            thrust: thrust.min(MAX_THRUST),
            lookahead: false,
        }
    }

    pub fn lookahead(heading: Heading) -> Self {
        Self {
            heading,
            thrust: MAX_THRUST,
            lookahead: true,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.thrust == 0
    }
}

/// Every candidate an agent may pick, plus a unit-vector cache per heading.
#[derive(Debug, Clone)]
pub struct ActionSpace {
    candidates: Vec<Candidate>,
    units: Vec<Vec2>,
}

impl Default for ActionSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSpace {
    /// Hold, then per heading thrusts `1..=MAX_THRUST` followed by the lookahead variant.
    pub fn new() -> Self {
        let mut candidates = Vec::with_capacity(1 + HEADING_COUNT * (MAX_THRUST as usize + 1));
        candidates.push(Candidate::HOLD);
        for heading in Heading::all() {
            for thrust in 1..=MAX_THRUST {
                candidates.push(Candidate::new(heading, thrust));
            }
            candidates.push(Candidate::lookahead(heading));
        }

        let units = Heading::all().map(|h| Vec2::from_heading(h, 1.0)).collect();
        Self { candidates, units }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Displacement after one step along `heading` covering `distance` units.
    pub fn displacement(&self, heading: Heading, distance: f64) -> Vec2 {
        self.units[heading.index()] * distance
    }

    /// Velocity the command actually executes this step.
    pub fn velocity(&self, candidate: Candidate) -> Vec2 {
        self.displacement(candidate.heading, candidate.thrust as f64)
    }

    pub fn destination(&self, position: Vec2, candidate: Candidate) -> Vec2 {
        position + self.velocity(candidate)
    }

    /// Evenly spaced points from the one-step destination to the two-step coast end.
    pub fn lookahead_points(
        &self,
        position: Vec2,
        heading: Heading,
        samples: u8,
    ) -> impl Iterator<Item = Vec2> + '_ {
        let first = MAX_THRUST as f64;
        let span = MAX_THRUST as f64;
        let steps = samples.max(1);
        (0..steps).map(move |i| {
            let frac = if steps == 1 {
                0.0
            } else {
                i as f64 / (steps - 1) as f64
            };
            position + self.displacement(heading, first + span * frac)
        })
    }

    /// Largest thrust per heading whose straight path clears every obstacle.
    ///
    /// Thrust grows one unit at a time and stops at the first blocked step.
    pub fn max_safe_thrust(&self, position: Vec2, obstacles: &[Circle], fudge: f64) -> ThrustProfile {
        self.max_safe_thrust_along(position, obstacles, fudge, Heading::all())
    }

    /// [`max_safe_thrust`](Self::max_safe_thrust) restricted to `headings`; every other
    /// heading gets zero.
    pub fn max_safe_thrust_along(
        &self,
        position: Vec2,
        obstacles: &[Circle],
        fudge: f64,
        headings: impl IntoIterator<Item = Heading>,
    ) -> ThrustProfile {
        let mut profile = ThrustProfile::default();
        for heading in headings {
            let mut thrust = 0;
            while thrust < MAX_THRUST {
                let end = position + self.displacement(heading, (thrust + 1) as f64);
                let blocked = obstacles
                    .iter()
                    .any(|o| segment_circle_intersect(position, end, o.center, o.radius, fudge));
                if blocked {
                    break;
                }
                thrust += 1;
            }
            profile.set(heading, thrust);
        }
        profile
    }
}

/// Blockers whose rim lies within `range` of `body`'s rim.
pub fn local_obstacles(body: &Circle, blockers: impl IntoIterator<Item = Circle>, range: f64) -> Vec<Circle> {
    blockers
        .into_iter()
        .filter(|b| body.clearance(b) < range)
        .collect()
}
