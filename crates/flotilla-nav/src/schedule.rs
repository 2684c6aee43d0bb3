//! Conflict resolution scheduler.
//!
//! Every requested agent starts committed to its best-scoring candidate. A work queue then
//! repeatedly takes the request with the most known conflicts, keeps its commitment if nothing
//! in its event horizon collides with it, otherwise switches to the first conflict-free candidate
//! in rank order. Requests with no such candidate are frozen: they hold position, become fixed
//! obstacles for their neighbors, and every neighbor is re-scored and requeued.

use std::collections::BTreeSet;
use std::time::Instant;

use flotilla_geom::{
    collides_within_step, Circle, Heading, HeadingWindow, ThrustProfile, Vec2, MAX_THRUST,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use crate::action::{local_obstacles, ActionSpace};
use crate::config::NavConfig;
use crate::error::Result;
use crate::grid::{Allegiance, InfluenceGrid, InfluenceSource, Patch};
use crate::score::{adjust_destination, Ranked, Ranking, Scorer};
use crate::world::{AgentId, FieldBounds, NavRequest, Preference, World};

/// Final movement order for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub agent: AgentId,
    pub thrust: u8,
    pub heading: Heading,
}

impl Command {
    /// Turn-protocol rendering: `t <agent> <thrust> <heading>`.
    pub fn to_wire(&self) -> String {
        format!("t {} {} {}", self.agent, self.thrust, self.heading.degrees())
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// One command per surviving request, ordered by agent id.
    pub commands: Vec<Command>,
    /// Agents left without a safe move; they hold position.
    pub frozen: Vec<AgentId>,
    /// The soft time budget ran out and candidate scans were narrowed.
    pub degraded: bool,
    /// Work queue pops.
    pub iterations: usize,
    /// Candidates scored across every ranking of the step.
    #[serde(default)]
    pub scored: usize,
}

impl Resolution {
    pub fn command_for(&self, agent: AgentId) -> Option<&Command> {
        self.commands.iter().find(|c| c.agent == agent)
    }

    pub fn is_frozen(&self, agent: AgentId) -> bool {
        self.frozen.contains(&agent)
    }

    pub fn to_wire(&self) -> String {
        self.commands
            .iter()
            .map(Command::to_wire)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Arena handle of a request within one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestHandle(u32);

impl RequestHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Unresolved,
    TentativelyCommitted,
    Finalized,
    Frozen,
}

/// Plans one step for a fleet. Reuses its grid buffer across steps.
#[derive(Debug)]
pub struct Navigator {
    config: NavConfig,
    space: ActionSpace,
    grid: Option<InfluenceGrid>,
}

impl Navigator {
    pub fn new(config: NavConfig) -> Self {
        Self {
            config,
            space: ActionSpace::new(),
            grid: None,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    /// Grid as it stood at the end of the last resolution.
    pub fn grid(&self) -> Option<&InfluenceGrid> {
        self.grid.as_ref()
    }

    /// Pick one command per request such that no two committed trajectories collide.
    pub fn resolve(&mut self, world: &World, requests: &[NavRequest]) -> Result<Resolution> {
        self.config.validate()?;
        world.validate(&self.config.grid)?;
        world.validate_requests(requests)?;

        let span = info_span!(
            "resolve",
            requests = requests.len(),
            agents = world.agents.len()
        );
        let _enter = span.enter();
        let started = Instant::now();

        let grid = match self.grid.take() {
            Some(grid)
                if grid.fits(world.width, world.height, &self.config.grid, &self.config.rules) =>
            {
                grid
            }
            _ => InfluenceGrid::new(
                world.width,
                world.height,
                &self.config.grid,
                self.config.rules.clone(),
            )?,
        };

        let mut step = Step::new(&self.config, &self.space, grid, world, requests, started);
        step.run();
        let (resolution, grid) = step.finish();
        self.grid = Some(grid);

        debug!(
            commands = resolution.commands.len(),
            frozen = resolution.frozen.len(),
            iterations = resolution.iterations,
            scored = resolution.scored,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "resolution complete"
        );
        Ok(resolution)
    }
}

#[derive(Debug)]
struct Body {
    id: AgentId,
    position: Vec2,
    radius: f64,
    friendly: bool,
    /// Holds position this step: not requested, immobilized or frozen.
    stationary: bool,
    /// Enemy free to move; projects threat over its whole reach.
    roaming: bool,
    /// Contribution currently added to the grid.
    source: Option<InfluenceSource>,
}

impl Body {
    fn circle(&self) -> Circle {
        Circle::new(self.position, self.radius)
    }
}

#[derive(Debug)]
struct Slot {
    body: usize,
    target: Vec2,
    preference: Preference,
    destination: Vec2,
    obstacles: Vec<Circle>,
    max_thrust: ThrustProfile,
    ranking: Ranking,
    committed: usize,
    state: RequestState,
    /// The committed candidate is infeasible, out of bounds, or hits a fixed body.
    blocked: bool,
    conflicts: BTreeSet<RequestHandle>,
    horizon: BTreeSet<RequestHandle>,
    /// Stationary bodies (by body index) this request must keep clear of.
    fixed: BTreeSet<usize>,
}

impl Slot {
    fn committed(&self) -> &Ranked {
        &self.ranking.options[self.committed]
    }

    fn conflict_count(&self) -> usize {
        self.conflicts.len() + usize::from(self.blocked)
    }
}

struct Step<'a> {
    config: &'a NavConfig,
    space: &'a ActionSpace,
    obstacles: &'a [Circle],
    grid: InfluenceGrid,
    bounds: FieldBounds,
    bodies: Vec<Body>,
    slots: Vec<Slot>,
    pending: BTreeSet<RequestHandle>,
    started: Instant,
    degraded: bool,
    iterations: usize,
    scored: usize,
}

impl<'a> Step<'a> {
    fn new(
        config: &'a NavConfig,
        space: &'a ActionSpace,
        grid: InfluenceGrid,
        world: &'a World,
        requests: &[NavRequest],
        started: Instant,
    ) -> Self {
        let mut agents: Vec<_> = world.agents.iter().collect();
        agents.sort_by_key(|a| a.id);

        let mut requests: Vec<&NavRequest> = requests.iter().collect();
        requests.sort_by_key(|r| r.agent);

        let mut bodies = Vec::with_capacity(agents.len());
        let mut slots = Vec::with_capacity(requests.len());
        for agent in agents {
            let body = bodies.len();
            let request = requests
                .binary_search_by_key(&agent.id, |r| r.agent)
                .ok()
                .map(|i| requests[i]);
            let friendly = world.is_friendly(agent);
            let movable = friendly && !agent.immobilized && request.is_some();

            if let (Some(request), true) = (request, agent.immobilized) {
                debug!(agent = request.agent, "skipping request for immobilized agent");
            }

            bodies.push(Body {
                id: agent.id,
                position: agent.position,
                radius: agent.radius,
                friendly,
                stationary: !movable,
                roaming: !friendly && !agent.immobilized,
                source: None,
            });

            if let (Some(request), true) = (request, movable) {
                slots.push(Slot {
                    body,
                    target: request.target,
                    preference: request.preference,
                    destination: request.target,
                    obstacles: Vec::new(),
                    max_thrust: ThrustProfile::default(),
                    ranking: Ranking::default(),
                    committed: 0,
                    state: RequestState::Unresolved,
                    blocked: false,
                    conflicts: BTreeSet::new(),
                    horizon: BTreeSet::new(),
                    fixed: BTreeSet::new(),
                });
            }
        }

        Self {
            config,
            space,
            obstacles: &world.obstacles,
            grid,
            bounds: world.bounds(config.field.edge_margin),
            bodies,
            slots,
            pending: BTreeSet::new(),
            started,
            degraded: false,
            iterations: 0,
            scored: 0,
        }
    }

    fn run(&mut self) {
        self.prepare();
        self.drain();
    }

    /// Score every request, commit each to its best candidate and queue them all.
    fn prepare(&mut self) {
        let t = Instant::now();
        self.build_horizons();
        debug!(elapsed_ms = t.elapsed().as_millis() as u64, "event horizons filled");

        let t = Instant::now();
        for h in 0..self.slots.len() {
            self.update_max_thrust(h, None);
        }
        debug!(elapsed_ms = t.elapsed().as_millis() as u64, "max thrusts computed");

        let t = Instant::now();
        self.fill_grid();
        debug!(elapsed_ms = t.elapsed().as_millis() as u64, "grid filled");

        let t = Instant::now();
        for h in 0..self.slots.len() {
            let slot = &self.slots[h];
            let position = self.bodies[slot.body].position;
            let destination = adjust_destination(
                position,
                slot.target,
                &self.bounds,
                self.obstacles,
                &self.config.rules,
            );
            self.slots[h].destination = destination;
            self.rescore(h, None);
        }
        debug!(elapsed_ms = t.elapsed().as_millis() as u64, "candidates scored");

        for h in 0..self.slots.len() {
            self.refresh_conflicts(h);
            self.pending.insert(RequestHandle(h as u32));
        }
    }

    fn drain(&mut self) {
        let t = Instant::now();
        while let Some(handle) = self.next_pending() {
            self.pending.remove(&handle);
            self.iterations += 1;
            self.poll_budget();
            self.process(handle.index());
        }
        debug!(
            elapsed_ms = t.elapsed().as_millis() as u64,
            iterations = self.iterations,
            "conflicts resolved"
        );
    }

    fn finish(self) -> (Resolution, InfluenceGrid) {
        let mut resolution = Resolution {
            degraded: self.degraded,
            iterations: self.iterations,
            scored: self.scored,
            ..Resolution::default()
        };
        for slot in &self.slots {
            let id = self.bodies[slot.body].id;
            if slot.state == RequestState::Frozen {
                resolution.frozen.push(id);
                continue;
            }
            let candidate = slot.committed().candidate;
            resolution.commands.push(Command {
                agent: id,
                thrust: candidate.thrust,
                heading: candidate.heading,
            });
        }
        (resolution, self.grid)
    }

    fn build_horizons(&mut self) {
        let max_speed = self.config.rules.max_speed();
        let margin = self.config.schedule.horizon_margin;

        for a in 0..self.slots.len() {
            let body_a = &self.bodies[self.slots[a].body];
            for b in (a + 1)..self.slots.len() {
                let body_b = &self.bodies[self.slots[b].body];
                let reach = body_a.radius + body_b.radius + 2.0 * max_speed + margin;
                if body_a.position.distance(body_b.position) < reach {
                    self.slots[a].horizon.insert(RequestHandle(b as u32));
                    self.slots[b].horizon.insert(RequestHandle(a as u32));
                }
            }
        }

        for slot in &mut self.slots {
            let body = &self.bodies[slot.body];
            let circle = body.circle();

            slot.fixed = self
                .bodies
                .iter()
                .enumerate()
                .filter(|(_, other)| other.stationary)
                .filter(|(_, other)| {
                    let reach = body.radius + other.radius + max_speed + margin;
                    body.position.distance(other.position) < reach
                })
                .map(|(i, _)| i)
                .collect();

            let blockers = self
                .obstacles
                .iter()
                .copied()
                .chain(self.bodies.iter().filter(|b| b.stationary).map(Body::circle));
            slot.obstacles = local_obstacles(&circle, blockers, max_speed);
        }
    }

    fn fill_grid(&mut self) {
        let mut reach: Vec<Option<ThrustProfile>> = vec![None; self.bodies.len()];
        for slot in &self.slots {
            reach[slot.body] = Some(slot.max_thrust.clone());
        }

        for (body, reach) in self.bodies.iter_mut().zip(reach) {
            let allegiance = if body.friendly {
                Allegiance::Friendly
            } else {
                Allegiance::Enemy
            };
            let source = if body.stationary && !body.roaming {
                InfluenceSource::stationary(body.position, body.radius, allegiance)
            } else {
                let reach = reach.unwrap_or_else(|| ThrustProfile::uniform(MAX_THRUST));
                InfluenceSource::mobile(body.position, body.radius, allegiance, reach)
            };
            body.source = Some(source);
        }

        self.grid.clear();
        self.grid
            .fill(self.obstacles, self.bodies.iter().filter_map(|b| b.source.as_ref()));
    }

    /// Recompute safe thrust, only along `window` when one is given.
    fn update_max_thrust(&mut self, h: usize, window: Option<HeadingWindow>) {
        let slot = &self.slots[h];
        let position = self.bodies[slot.body].position;
        let fudge = self.config.rules.forecast_fudge;
        let profile = match window {
            Some(window) => {
                self.space
                    .max_safe_thrust_along(position, &slot.obstacles, fudge, window.headings())
            }
            None => self.space.max_safe_thrust(position, &slot.obstacles, fudge),
        };
        self.slots[h].max_thrust = profile;
    }

    fn scorer(&self) -> Scorer<'_> {
        Scorer {
            grid: &self.grid,
            space: self.space,
            bounds: self.bounds,
            config: &self.config.scoring,
        }
    }

    /// Re-rank a request and commit it to its new best candidate.
    fn rescore(&mut self, h: usize, window: Option<HeadingWindow>) {
        let slot = &self.slots[h];
        let position = self.bodies[slot.body].position;
        let ranking = self.scorer().rank_within(
            position,
            &slot.max_thrust,
            slot.destination,
            slot.preference,
            window,
        );

        self.scored += ranking.scored;
        let slot = &mut self.slots[h];
        slot.ranking = ranking;
        slot.committed = 0;
        slot.state = RequestState::TentativelyCommitted;
    }

    fn committed_velocity(&self, h: RequestHandle) -> Vec2 {
        self.space.velocity(self.slots[h.index()].committed().candidate)
    }

    fn collides_with(&self, h: usize, velocity: Vec2, other: RequestHandle) -> bool {
        let a = &self.bodies[self.slots[h].body];
        let b = &self.bodies[self.slots[other.index()].body];
        collides_within_step(
            a.radius + b.radius,
            a.position,
            b.position,
            velocity,
            self.committed_velocity(other),
        )
    }

    /// Problems a candidate has on its own: infeasible, leaves the field, or hits a fixed body.
    fn is_blocked(&self, h: usize, ranked: &Ranked) -> bool {
        if !ranked.score.is_feasible() {
            return true;
        }
        let slot = &self.slots[h];
        let body = &self.bodies[slot.body];
        let velocity = self.space.velocity(ranked.candidate);
        if !self.bounds.contains(body.position + velocity) {
            return true;
        }
        slot.fixed.iter().any(|&f| {
            let other = &self.bodies[f];
            collides_within_step(
                body.radius + other.radius,
                body.position,
                other.position,
                velocity,
                Vec2::ZERO,
            )
        })
    }

    fn is_conflict_free(&self, h: usize, ranked: &Ranked) -> bool {
        if self.is_blocked(h, ranked) {
            return false;
        }
        let velocity = self.space.velocity(ranked.candidate);
        self.slots[h]
            .horizon
            .iter()
            .all(|&n| !self.collides_with(h, velocity, n))
    }

    /// Recompute the conflicts of `h`'s commitment, keeping both sides of each pair in sync.
    fn refresh_conflicts(&mut self, h: usize) {
        let handle = RequestHandle(h as u32);
        let velocity = self.committed_velocity(handle);
        let blocked = self.is_blocked(h, self.slots[h].committed());
        let verdicts: Vec<(RequestHandle, bool)> = self.slots[h]
            .horizon
            .iter()
            .map(|&n| (n, self.collides_with(h, velocity, n)))
            .collect();

        self.slots[h].blocked = blocked;
        for (n, hit) in verdicts {
            if hit {
                self.slots[h].conflicts.insert(n);
                self.slots[n.index()].conflicts.insert(handle);
            } else {
                self.slots[h].conflicts.remove(&n);
                self.slots[n.index()].conflicts.remove(&handle);
            }
        }
    }

    /// Most conflicts first, lowest handle on ties.
    fn next_pending(&self) -> Option<RequestHandle> {
        self.pending.iter().copied().max_by(|a, b| {
            let ca = self.slots[a.index()].conflict_count();
            let cb = self.slots[b.index()].conflict_count();
            ca.cmp(&cb).then(b.cmp(a))
        })
    }

    fn poll_budget(&mut self) {
        if self.degraded {
            return;
        }
        let elapsed = self.started.elapsed();
        if elapsed > self.config.schedule.soft_budget() {
            self.degraded = true;
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                window_deg = self.config.schedule.degraded_window_deg,
                "running out of time, narrowing candidate search"
            );
        }
    }

    fn process(&mut self, h: usize) {
        self.refresh_conflicts(h);
        if self.slots[h].conflict_count() == 0 {
            self.slots[h].state = RequestState::Finalized;
            return;
        }

        match self.first_conflict_free(h) {
            Some(choice) => {
                self.slots[h].committed = choice;
                self.refresh_conflicts(h);
                self.slots[h].state = RequestState::Finalized;
            }
            None => self.freeze(h),
        }
    }

    /// Headings still searched for `h` once degraded: around its best move, or around the
    /// destination when the best move is to hold.
    fn search_window(&self, h: usize) -> Option<HeadingWindow> {
        if !self.degraded {
            return None;
        }
        let slot = &self.slots[h];
        let center = slot
            .ranking
            .best()
            .filter(|r| !r.candidate.is_hold())
            .map(|r| r.candidate.heading)
            .unwrap_or_else(|| {
                self.bodies[slot.body]
                    .position
                    .heading_to(slot.destination)
            });
        Some(HeadingWindow::new(center, self.config.schedule.degraded_window_deg))
    }

    fn first_conflict_free(&self, h: usize) -> Option<usize> {
        let window = self.search_window(h);
        for (idx, ranked) in self.slots[h].ranking.options.iter().enumerate() {
            if !ranked.score.is_feasible() {
                break;
            }
            let candidate = ranked.candidate;
            if !candidate.is_hold() && window.is_some_and(|w| !w.contains(candidate.heading)) {
                continue;
            }
            if self.is_conflict_free(h, ranked) {
                return Some(idx);
            }
        }
        None
    }

    fn freeze(&mut self, h: usize) {
        let handle = RequestHandle(h as u32);
        let body_idx = self.slots[h].body;
        debug!(
            agent = self.bodies[body_idx].id,
            conflicts = self.slots[h].conflicts.len(),
            "no conflict-free candidate, freezing"
        );

        self.slots[h].state = RequestState::Frozen;
        self.pending.remove(&handle);

        if let Some(source) = self.bodies[body_idx].source.take() {
            self.grid.modify_agent(&source, Patch::Remove);
            let held = source.to_stationary();
            self.grid.modify_agent(&held, Patch::Add);
            self.bodies[body_idx].source = Some(held);
        }
        self.bodies[body_idx].stationary = true;
        let circle = self.bodies[body_idx].circle();

        let conflicts = std::mem::take(&mut self.slots[h].conflicts);
        for c in conflicts {
            self.slots[c.index()].conflicts.remove(&handle);
        }
        let neighbors = std::mem::take(&mut self.slots[h].horizon);
        let windows: Vec<Option<HeadingWindow>> =
            neighbors.iter().map(|n| self.search_window(n.index())).collect();

        for (&n, &window) in neighbors.iter().zip(&windows) {
            let slot = &mut self.slots[n.index()];
            slot.horizon.remove(&handle);
            slot.fixed.insert(body_idx);
            slot.obstacles.push(circle);
            self.update_max_thrust(n.index(), window);
        }
        for (&n, &window) in neighbors.iter().zip(&windows) {
            self.rescore(n.index(), window);
        }
        for &n in &neighbors {
            self.refresh_conflicts(n.index());
            self.pending.insert(n);
        }
    }
}
