use thiserror::Error;

use crate::world::{AgentId, SideId};

/// Errors raised while validating inputs at the navigation boundary.
///
/// Failing to find a safe move is not an error: such agents are frozen and reported in the
/// resolution.
#[derive(Debug, Error, PartialEq)]
pub enum NavError {
    #[error("field must be non-empty, got {width}x{height}")]
    EmptyField { width: f64, height: f64 },

    #[error("field {width}x{height} needs more than {max_cells} grid cells")]
    FieldTooLarge {
        width: f64,
        height: f64,
        max_cells: u64,
    },

    #[error("agent {0} has a non-finite position or velocity")]
    NonFiniteAgent(AgentId),

    #[error("agent {id} has invalid radius {radius}")]
    InvalidRadius { id: AgentId, radius: f64 },

    #[error("duplicate agent id {0}")]
    DuplicateAgent(AgentId),

    #[error("obstacle #{0} has a non-finite center or non-positive radius")]
    InvalidObstacle(usize),

    #[error("request for unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error("agent {agent} belongs to side {side}, not to side {me}")]
    ForeignAgent {
        agent: AgentId,
        side: SideId,
        me: SideId,
    },

    #[error("more than one request for agent {0}")]
    DuplicateRequest(AgentId),

    #[error("request for agent {0} has a non-finite target")]
    NonFiniteTarget(AgentId),

    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NavError>;
