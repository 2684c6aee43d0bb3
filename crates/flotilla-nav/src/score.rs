//! Candidate scoring against the influence grid.

use core::cmp::Ordering;

use flotilla_geom::{Circle, HeadingWindow, ThrustProfile, Vec2};

use crate::action::{ActionSpace, Candidate};
use crate::config::{Rules, ScoringConfig};
use crate::grid::InfluenceGrid;
use crate::world::{FieldBounds, Preference};

/// Desirability of a candidate. `Infeasible` always ranks below any feasible score.
#[derive(Debug, Clone, Copy)]
pub enum Score {
    Infeasible,
    Feasible(f64),
}

impl Score {
    /// NaN is treated as infeasible.
    pub fn feasible(value: f64) -> Self {
        if value.is_nan() {
            Score::Infeasible
        } else {
            Score::Feasible(value)
        }
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self, Score::Feasible(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Feasible(v) => Some(*v),
            Score::Infeasible => None,
        }
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Score::Infeasible, Score::Infeasible) => Ordering::Equal,
            (Score::Infeasible, Score::Feasible(_)) => Ordering::Less,
            (Score::Feasible(_), Score::Infeasible) => Ordering::Greater,
            (Score::Feasible(a), Score::Feasible(b)) => a.total_cmp(b),
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

/// A candidate with its score, in preference order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub candidate: Candidate,
    pub score: Score,
    /// Position in the action space; the final tie-break.
    pub index: u32,
}

/// Ranked candidates of one agent, best first.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub options: Vec<Ranked>,
    /// Preference the ranking was computed with (seek-engagement may fall back to avoiding).
    pub preference: Option<Preference>,
    /// Candidates actually evaluated, over every pass.
    pub scored: usize,
}

impl Ranking {
    pub fn best(&self) -> Option<&Ranked> {
        self.options.first()
    }

    pub fn has_feasible(&self) -> bool {
        self.options.first().is_some_and(|r| r.score.is_feasible())
    }
}

pub struct Scorer<'a> {
    pub grid: &'a InfluenceGrid,
    pub space: &'a ActionSpace,
    pub bounds: FieldBounds,
    pub config: &'a ScoringConfig,
}

impl<'a> Scorer<'a> {
    /// Score of standing at `position` next step.
    pub fn position_score(&self, position: Vec2, destination: Vec2, preference: Preference) -> Score {
        if !self.bounds.contains(position) {
            return Score::Infeasible;
        }
        let Some(cell) = self.grid.sample(position) else {
            return Score::Infeasible;
        };
        if cell.solid {
            return Score::Infeasible;
        }

        let proximity = self.config.max_distance - position.distance(destination);
        match preference {
            Preference::AvoidEnemies => {
                let safety = self.config.threat_ceiling - cell.enemy_attack as f64;
                Score::feasible(safety * self.config.exposure_weight + proximity)
            }
            Preference::SeekEngagement => {
                if cell.friendly_exposed > cell.enemy_attack {
                    Score::feasible(cell.enemy_exposed as f64 * self.config.exposure_weight + proximity)
                } else {
                    Score::Infeasible
                }
            }
        }
    }

    pub fn score(
        &self,
        position: Vec2,
        max_thrust: &ThrustProfile,
        candidate: Candidate,
        destination: Vec2,
        preference: Preference,
    ) -> Score {
        if candidate.thrust > max_thrust.get(candidate.heading) {
            return Score::Infeasible;
        }
        if !candidate.lookahead {
            let next = self.space.destination(position, candidate);
            return self.position_score(next, destination, preference);
        }
        if preference != Preference::AvoidEnemies {
            return Score::Infeasible;
        }

        // The worst point along the coast decides.
        let mut worst: Option<Score> = None;
        for p in self
            .space
            .lookahead_points(position, candidate.heading, self.config.lookahead_samples)
        {
            let s = self.position_score(p, destination, preference);
            if !s.is_feasible() {
                return Score::Infeasible;
            }
            worst = Some(match worst {
                Some(w) if w <= s => w,
                _ => s,
            });
        }
        worst.unwrap_or(Score::Infeasible)
    }

    /// Score and sort every candidate, best first.
    ///
    /// A seek-engagement request with no feasible option is re-ranked as avoid-enemies.
    pub fn rank(
        &self,
        position: Vec2,
        max_thrust: &ThrustProfile,
        destination: Vec2,
        preference: Preference,
    ) -> Ranking {
        self.rank_within(position, max_thrust, destination, preference, None)
    }

    /// Like [`rank`](Self::rank), but moves outside `window` are marked infeasible without
    /// being scored. Hold is always scored.
    pub fn rank_within(
        &self,
        position: Vec2,
        max_thrust: &ThrustProfile,
        destination: Vec2,
        preference: Preference,
        window: Option<HeadingWindow>,
    ) -> Ranking {
        let ranking = self.rank_with(position, max_thrust, destination, preference, window);
        if preference == Preference::SeekEngagement && !ranking.has_feasible() {
            tracing::trace!("no engagement point reachable, falling back to avoiding enemies");
            let mut fallback =
                self.rank_with(position, max_thrust, destination, Preference::AvoidEnemies, window);
            fallback.scored += ranking.scored;
            return fallback;
        }
        ranking
    }

    fn rank_with(
        &self,
        position: Vec2,
        max_thrust: &ThrustProfile,
        destination: Vec2,
        preference: Preference,
        window: Option<HeadingWindow>,
    ) -> Ranking {
        let mut scored = 0;
        let mut options: Vec<Ranked> = self
            .space
            .candidates()
            .iter()
            .enumerate()
            .map(|(index, &candidate)| {
                let outside = !candidate.is_hold()
                    && window.is_some_and(|w| !w.contains(candidate.heading));
                let score = if outside {
                    Score::Infeasible
                } else {
                    scored += 1;
                    self.score(position, max_thrust, candidate, destination, preference)
                };
                Ranked {
                    candidate,
                    score,
                    index: index as u32,
                }
            })
            .collect();

        let eps = self.config.tie_epsilon;
        options.sort_by(|a, b| rank_order(a, b, eps));
        Ranking {
            options,
            preference: Some(preference),
            scored,
        }
    }
}

/// Descending score with near-ties (within `eps`) resolved towards non-lookahead candidates,
/// then the lower action index.
pub fn rank_order(a: &Ranked, b: &Ranked, eps: f64) -> Ordering {
    match (a.score, b.score) {
        (Score::Feasible(x), Score::Feasible(y)) => bucket(y, eps)
            .total_cmp(&bucket(x, eps))
            .then(a.candidate.lookahead.cmp(&b.candidate.lookahead))
            .then(a.index.cmp(&b.index)),
        (Score::Infeasible, Score::Feasible(_)) => Ordering::Greater,
        (Score::Feasible(_), Score::Infeasible) => Ordering::Less,
        (Score::Infeasible, Score::Infeasible) => a.index.cmp(&b.index),
    }
}

fn bucket(value: f64, eps: f64) -> f64 {
    if eps > 0.0 {
        (value / eps).round()
    } else {
        value
    }
}

/// Destination actually steered for: the target pulled inside the field and pushed out of
/// any static obstacle it falls into, onto the rim facing the agent.
pub fn adjust_destination(
    position: Vec2,
    target: Vec2,
    bounds: &FieldBounds,
    obstacles: &[Circle],
    rules: &Rules,
) -> Vec2 {
    let mut destination = bounds.clamp(target);
    let clearance = rules.agent_radius + rules.forecast_fudge;
    if let Some(blocker) = obstacles
        .iter()
        .find(|o| o.center.distance(destination) < o.radius + rules.agent_radius)
    {
        destination = bounds.clamp(position.closest_point_to(blocker.center, blocker.radius, clearance));
    }
    destination
}
