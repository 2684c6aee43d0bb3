//! Navigation configuration loading and management.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use flotilla_geom::MAX_THRUST;
use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};

/// Top-level navigation configuration, usually loaded from a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Physical constants of the game.
    pub rules: Rules,

    /// Influence grid resolution
    pub grid: GridConfig,

    /// Playing field constraints
    pub field: FieldConfig,

    /// Candidate scoring weights
    pub scoring: ScoringConfig,

    /// Conflict resolution budget and search settings
    pub schedule: ScheduleConfig,
}

/// Physical constants shared by every agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    /// Collision radius of a regular agent.
    #[serde(default = "default_agent_radius")]
    pub agent_radius: f64,

    /// Distance at which an agent can hurt another.
    #[serde(default = "default_weapon_radius")]
    pub weapon_radius: f64,

    /// Extra clearance kept from obstacles when testing straight paths.
    #[serde(default = "default_forecast_fudge")]
    pub forecast_fudge: f64,
}

fn default_agent_radius() -> f64 {
    0.5
}
fn default_weapon_radius() -> f64 {
    5.0
}
fn default_forecast_fudge() -> f64 {
    0.6
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            agent_radius: default_agent_radius(),
            weapon_radius: default_weapon_radius(),
            forecast_fudge: default_forecast_fudge(),
        }
    }
}

impl Rules {
    /// Distance covered in one step at full thrust.
    pub fn max_speed(&self) -> f64 {
        MAX_THRUST as f64
    }

    pub fn attack_radius(&self) -> f64 {
        self.agent_radius + self.weapon_radius
    }

    pub fn move_radius(&self) -> f64 {
        self.agent_radius + self.max_speed()
    }

    /// Midway ring between moving and attacking next step.
    pub fn halfway_two_step_radius(&self) -> f64 {
        self.move_radius() + 3.0
    }

    /// Cells an agent can attack after one full move.
    pub fn two_step_attack_radius(&self) -> f64 {
        self.move_radius() + self.weapon_radius
    }

    /// Threat weight of a cell at `distance` from a mobile agent, in `[0, 1]`.
    ///
    /// Highest inside the attack radius, decaying through the move radius and the two-step
    /// rings down to zero at the two-step attack radius.
    pub fn falloff(&self, distance: f64) -> f64 {
        let attack = self.attack_radius();
        let movement = self.move_radius();
        let halfway = self.halfway_two_step_radius();
        let two_step = self.two_step_attack_radius();

        if distance < attack {
            lerp(1.0, 0.7, distance / attack)
        } else if distance < movement {
            lerp(0.7, 0.5, (distance - attack) / (movement - attack))
        } else if distance < halfway {
            lerp(0.8, 0.3, (distance - movement) / (halfway - movement))
        } else if distance < two_step {
            lerp(0.3, 0.0, (distance - halfway) / (two_step - halfway))
        } else {
            0.0
        }
    }
}

fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + t * (end - start)
}

/// Influence grid resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per unit of distance along each axis.
    #[serde(default = "default_definition")]
    pub definition: u32,

    /// Largest number of cells a grid may allocate.
    #[serde(default = "default_max_cells")]
    pub max_cells: u64,
}

fn default_definition() -> u32 {
    4
}
fn default_max_cells() -> u64 {
    1 << 24
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            definition: default_definition(),
            max_cells: default_max_cells(),
        }
    }
}

impl GridConfig {
    /// Columns and rows covering a `width x height` field, or `FieldTooLarge` when the
    /// count overflows or exceeds `max_cells`.
    pub fn dimensions(&self, width: f64, height: f64) -> Result<(u32, u32)> {
        let definition = self.definition as f64;
        let axis = |extent: f64| {
            let cells = (extent * definition).ceil();
            (cells.is_finite() && cells <= u32::MAX as f64).then(|| (cells as u32).max(1))
        };
        let cells = match (axis(width), axis(height)) {
            (Some(cols), Some(rows)) => (cols as u64)
                .checked_mul(rows as u64)
                .filter(|&n| n <= self.max_cells)
                .map(|_| (cols, rows)),
            _ => None,
        };
        cells.ok_or(NavError::FieldTooLarge {
            width,
            height,
            max_cells: self.max_cells,
        })
    }
}

/// Playing field constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Predicted positions must stay strictly further than this from every edge.
    #[serde(default = "default_edge_margin")]
    pub edge_margin: f64,
}

fn default_edge_margin() -> f64 {
    1.0
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            edge_margin: default_edge_margin(),
        }
    }
}

/// Candidate scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Upper bound on the enemy attack count a cell can realistically see.
    #[serde(default = "default_threat_ceiling")]
    pub threat_ceiling: f64,

    /// Multiplier that puts threat/opportunity far above proximity.
    #[serde(default = "default_exposure_weight")]
    pub exposure_weight: f64,

    /// Distance from which proximity to the destination is subtracted.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Scores closer than this are treated as ties.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    /// Points sampled along a lookahead path.
    #[serde(default = "default_lookahead_samples")]
    pub lookahead_samples: u8,
}

fn default_threat_ceiling() -> f64 {
    100.0
}
fn default_exposure_weight() -> f64 {
    10_000.0
}
fn default_max_distance() -> f64 {
    1_000.0
}
fn default_tie_epsilon() -> f64 {
    0.01
}
fn default_lookahead_samples() -> u8 {
    8
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threat_ceiling: default_threat_ceiling(),
            exposure_weight: default_exposure_weight(),
            max_distance: default_max_distance(),
            tie_epsilon: default_tie_epsilon(),
            lookahead_samples: default_lookahead_samples(),
        }
    }
}

/// Conflict resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Elapsed time after which candidate scans are narrowed.
    #[serde(default = "default_soft_budget_ms")]
    pub soft_budget_ms: u64,

    /// Half-width, in degrees, of the heading window scanned once over budget.
    #[serde(default = "default_degraded_window_deg")]
    pub degraded_window_deg: u16,

    /// Slack added to the event horizon distance.
    #[serde(default = "default_horizon_margin")]
    pub horizon_margin: f64,
}

fn default_soft_budget_ms() -> u64 {
    1_500
}
fn default_degraded_window_deg() -> u16 {
    3
}
fn default_horizon_margin() -> f64 {
    0.5
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            soft_budget_ms: default_soft_budget_ms(),
            degraded_window_deg: default_degraded_window_deg(),
            horizon_margin: default_horizon_margin(),
        }
    }
}

impl ScheduleConfig {
    pub fn soft_budget(&self) -> Duration {
        Duration::from_millis(self.soft_budget_ms)
    }
}

impl NavConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Rejected config from {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check that the values describe a usable setup.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rules.agent_radius", self.rules.agent_radius),
            ("rules.weapon_radius", self.rules.weapon_radius),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(NavError::Config(format!("{name} must be > 0, got {value}")));
            }
        }

        let non_negative = [
            ("rules.forecast_fudge", self.rules.forecast_fudge),
            ("field.edge_margin", self.field.edge_margin),
            ("scoring.tie_epsilon", self.scoring.tie_epsilon),
            ("schedule.horizon_margin", self.schedule.horizon_margin),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(NavError::Config(format!("{name} must be >= 0, got {value}")));
            }
        }

        if self.grid.definition == 0 {
            return Err(NavError::Config("grid.definition must be >= 1".to_string()));
        }
        if self.grid.max_cells == 0 {
            return Err(NavError::Config("grid.max_cells must be >= 1".to_string()));
        }
        if self.scoring.lookahead_samples == 0 {
            return Err(NavError::Config(
                "scoring.lookahead_samples must be >= 1".to_string(),
            ));
        }
        if self.schedule.degraded_window_deg > 180 {
            return Err(NavError::Config(format!(
                "schedule.degraded_window_deg must be <= 180, got {}",
                self.schedule.degraded_window_deg
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falloff_decays_to_zero_at_two_step_attack_radius() {
        let rules = Rules::default();
        assert!((rules.falloff(0.0) - 1.0).abs() < 1e-12);
        assert!(rules.falloff(rules.attack_radius() - 1e-9) > 0.69);
        assert!(rules.falloff(rules.halfway_two_step_radius() + 1.0) < 0.3);
        assert_eq!(rules.falloff(rules.two_step_attack_radius()), 0.0);
        assert_eq!(rules.falloff(100.0), 0.0);
    }

    #[test]
    fn defaults_validate() {
        NavConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn zero_definition_is_rejected() {
        let mut config = NavConfig::default();
        config.grid.definition = 0;
        assert!(matches!(config.validate(), Err(NavError::Config(_))));
    }

    #[test]
    fn grid_dimensions_are_capped_without_overflow() {
        let grid = GridConfig::default();
        assert_eq!(grid.dimensions(384.0, 256.0), Ok((1536, 1024)));
        assert_eq!(grid.dimensions(0.1, 0.1), Ok((1, 1)));

        for (width, height) in [(1e7, 1e7), (f64::MAX, 1.0), (f64::INFINITY, 10.0), (4097.0, 4096.0)] {
            assert_eq!(
                grid.dimensions(width, height),
                Err(NavError::FieldTooLarge {
                    width,
                    height,
                    max_cells: grid.max_cells,
                })
            );
        }
    }
}
