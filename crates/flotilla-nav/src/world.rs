//! World snapshot supplied to the navigator each step.

use std::collections::BTreeSet;

use flotilla_geom::{Circle, Vec2};
use serde::{Deserialize, Serialize};

use crate::config::GridConfig;
use crate::error::{NavError, Result};
use crate::schedule::Resolution;

/// Stable agent identifier. Ordering by id drives every deterministic tie-break.
pub type AgentId = u32;

/// Owning player.
pub type SideId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: Vec2,
    /// Motion carried into the step. Navigation plans from a standing start.
    #[serde(default)]
    pub velocity: Vec2,
    pub radius: f64,
    pub side: SideId,
    /// Cannot move this step (docked, disabled, ...).
    #[serde(default)]
    pub immobilized: bool,
    /// No safe move was found for this agent during the last resolution.
    #[serde(default)]
    pub frozen: bool,
}

impl Agent {
    pub fn new(id: AgentId, side: SideId, position: Vec2, radius: f64) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            radius,
            side,
            immobilized: false,
            frozen: false,
        }
    }

    pub fn immobilized(mut self) -> Self {
        self.immobilized = true;
        self
    }

    pub fn body(&self) -> Circle {
        Circle::new(self.position, self.radius)
    }
}

/// Field rectangle `[0, width] x [0, height]` shrunk by an edge margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl FieldBounds {
    pub fn contains(&self, p: Vec2) -> bool {
        p.x > self.min.x && p.y > self.min.y && p.x < self.max.x && p.y < self.max.y
    }

    pub fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.min.x, self.max.x.max(self.min.x)),
            p.y.clamp(self.min.y, self.max.y.max(self.min.y)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub width: f64,
    pub height: f64,
    /// Side the navigator plans for.
    pub me: SideId,
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Static bodies (planets, walls, ...).
    #[serde(default)]
    pub obstacles: Vec<Circle>,
}

impl World {
    pub fn new(width: f64, height: f64, me: SideId) -> Self {
        Self {
            width,
            height,
            me,
            agents: Vec::new(),
            obstacles: Vec::new(),
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_obstacle(mut self, obstacle: Circle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn is_friendly(&self, agent: &Agent) -> bool {
        agent.side == self.me
    }

    pub fn bounds(&self, edge_margin: f64) -> FieldBounds {
        FieldBounds {
            min: Vec2::new(edge_margin, edge_margin),
            max: Vec2::new(self.width - edge_margin, self.height - edge_margin),
        }
    }

    /// Reject snapshots the navigator cannot reason about, including fields whose influence
    /// grid would exceed `grid.max_cells`.
    pub fn validate(&self, grid: &GridConfig) -> Result<()> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(NavError::EmptyField {
                width: self.width,
                height: self.height,
            });
        }
        grid.dimensions(self.width, self.height)?;

        let mut seen = BTreeSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id) {
                return Err(NavError::DuplicateAgent(agent.id));
            }
            if !(agent.position.is_finite() && agent.velocity.is_finite()) {
                return Err(NavError::NonFiniteAgent(agent.id));
            }
            if !(agent.radius.is_finite() && agent.radius > 0.0) {
                return Err(NavError::InvalidRadius {
                    id: agent.id,
                    radius: agent.radius,
                });
            }
        }

        for (index, obstacle) in self.obstacles.iter().enumerate() {
            if !(obstacle.center.is_finite() && obstacle.radius.is_finite() && obstacle.radius > 0.0)
            {
                return Err(NavError::InvalidObstacle(index));
            }
        }
        Ok(())
    }

    /// Check that every request names one of our agents, at most once.
    pub fn validate_requests(&self, requests: &[NavRequest]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for request in requests {
            let agent = self
                .agent(request.agent)
                .ok_or(NavError::UnknownAgent(request.agent))?;
            if !self.is_friendly(agent) {
                return Err(NavError::ForeignAgent {
                    agent: agent.id,
                    side: agent.side,
                    me: self.me,
                });
            }
            if !seen.insert(request.agent) {
                return Err(NavError::DuplicateRequest(request.agent));
            }
            if !request.target.is_finite() {
                return Err(NavError::NonFiniteTarget(request.agent));
            }
        }
        Ok(())
    }

    /// Write back the frozen flag of every agent the resolution decided on.
    pub fn apply(&mut self, resolution: &Resolution) {
        for agent in &mut self.agents {
            if resolution.frozen.contains(&agent.id) {
                agent.frozen = true;
            } else if resolution.commands.iter().any(|c| c.agent == agent.id) {
                agent.frozen = false;
            }
        }
    }
}

/// How an agent wants to treat enemies on its way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    /// Minimize exposure to enemy attackers, then get close to the target.
    AvoidEnemies,
    /// Move where we outnumber the enemy and can hit the most of them.
    SeekEngagement,
}

/// One agent's navigation goal for this step, supplied by task assignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavRequest {
    pub agent: AgentId,
    pub target: Vec2,
    pub preference: Preference,
}

impl NavRequest {
    pub fn new(agent: AgentId, target: Vec2, preference: Preference) -> Self {
        Self {
            agent,
            target,
            preference,
        }
    }
}
