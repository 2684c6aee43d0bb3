//! Per-step fleet navigation: influence grid, candidate scoring and conflict resolution.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod action;
pub mod config;
pub mod error;
pub mod grid;
pub mod schedule;
pub mod score;
pub mod world;

pub use action::{local_obstacles, ActionSpace, Candidate};
pub use config::{FieldConfig, GridConfig, NavConfig, Rules, ScheduleConfig, ScoringConfig};
pub use error::{NavError, Result};
pub use grid::{Allegiance, CellIndex, InfluenceCell, InfluenceGrid, InfluenceSource, Mobility, Patch};
pub use schedule::{Command, Navigator, RequestHandle, RequestState, Resolution};
pub use score::{adjust_destination, rank_order, Ranked, Ranking, Score, Scorer};
pub use world::{Agent, AgentId, FieldBounds, NavRequest, Preference, SideId, World};
