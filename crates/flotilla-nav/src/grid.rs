//! Spatial influence grid: per-cell aggregates of who can occupy, hit or be hit there next step.
//!
//! Weighted contributions are kept in fixed point so that removing an agent restores every cell
//! to exactly the value it had before the agent was added, in any interleaving.

use flotilla_geom::{Circle, ThrustProfile, Vec2};

use crate::config::{GridConfig, Rules};
use crate::error::{NavError, Result};

/// Fixed-point scale of weighted attack contributions.
pub const WEIGHT_SCALE: f64 = 1024.0;

/// Column/row of a cell. Both are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex {
    pub col: u32,
    pub row: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfluenceCell {
    /// Covered by a static obstacle.
    pub solid: bool,
    /// Agents whose body covers the cell.
    pub occupants: i32,
    /// Friendly agents that could be hit here next step.
    pub friendly_exposed: i32,
    /// Enemy agents that could be hit here next step.
    pub enemy_exposed: i32,
    /// Friendly attackers in range, weighted by falloff (fixed point, see [`WEIGHT_SCALE`]).
    pub friendly_attack_fixed: i32,
    /// Enemy attackers in range next step.
    pub enemy_attack: i32,
}

impl InfluenceCell {
    pub fn friendly_attack(&self) -> f64 {
        self.friendly_attack_fixed as f64 / WEIGHT_SCALE
    }

    pub fn is_occupied(&self) -> bool {
        self.occupants > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allegiance {
    Friendly,
    Enemy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mobility {
    Mobile,
    /// Frozen, immobilized or holding position this step.
    Stationary,
}

/// Everything a grid patch depends on.
///
/// Keep the value used for an [`Patch::Add`] and hand the same value to the matching
/// [`Patch::Remove`].
#[derive(Debug, Clone, PartialEq)]
pub struct InfluenceSource {
    pub position: Vec2,
    pub radius: f64,
    pub allegiance: Allegiance,
    pub mobility: Mobility,
    /// Per-heading reach; only read for friendly mobile agents.
    pub reach: ThrustProfile,
}

impl InfluenceSource {
    pub fn stationary(position: Vec2, radius: f64, allegiance: Allegiance) -> Self {
        Self {
            position,
            radius,
            allegiance,
            mobility: Mobility::Stationary,
            reach: ThrustProfile::default(),
        }
    }

    pub fn mobile(position: Vec2, radius: f64, allegiance: Allegiance, reach: ThrustProfile) -> Self {
        Self {
            position,
            radius,
            allegiance,
            mobility: Mobility::Mobile,
            reach,
        }
    }

    /// Same body, now holding position.
    pub fn to_stationary(&self) -> Self {
        Self::stationary(self.position, self.radius, self.allegiance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch {
    Add,
    Remove,
}

impl Patch {
    pub fn sign(self) -> i32 {
        match self {
            Patch::Add => 1,
            Patch::Remove => -1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InfluenceGrid {
    width: f64,
    height: f64,
    definition: f64,
    cols: u32,
    rows: u32,
    rules: Rules,
    cells: Vec<InfluenceCell>,
}

impl InfluenceGrid {
    /// Allocates an empty grid, refusing fields that are empty or need more than
    /// `config.max_cells` cells.
    pub fn new(width: f64, height: f64, config: &GridConfig, rules: Rules) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(NavError::EmptyField { width, height });
        }
        if config.definition == 0 {
            return Err(NavError::Config("grid.definition must be >= 1".to_string()));
        }
        let (cols, rows) = config.dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            definition: config.definition as f64,
            cols,
            rows,
            rules,
            cells: vec![InfluenceCell::default(); cols as usize * rows as usize],
        })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cells(&self) -> &[InfluenceCell] {
        &self.cells
    }

    /// True when this grid already has the shape a `width x height` field needs.
    pub fn fits(&self, width: f64, height: f64, config: &GridConfig, rules: &Rules) -> bool {
        self.width == width
            && self.height == height
            && self.definition == config.definition as f64
            && &self.rules == rules
    }

    pub fn clear(&mut self) {
        self.cells.fill(InfluenceCell::default());
    }

    /// Mark static obstacles solid and add every agent's contribution.
    pub fn fill<'a>(
        &mut self,
        obstacles: &[Circle],
        sources: impl IntoIterator<Item = &'a InfluenceSource>,
    ) {
        let margin = self.rules.agent_radius;
        for obstacle in obstacles {
            self.iterate(obstacle.center, obstacle.radius + margin, |_, cell, _| {
                cell.solid = true;
            });
        }
        for source in sources {
            self.modify_agent(source, Patch::Add);
        }
    }

    /// Add or remove one agent's contribution.
    pub fn modify_agent(&mut self, source: &InfluenceSource, patch: Patch) {
        let sign = patch.sign();
        let body = source.radius;
        let position = source.position;

        match (source.allegiance, source.mobility) {
            (Allegiance::Friendly, Mobility::Mobile) => {
                let move_radius = body + self.rules.max_speed();
                let weapon = self.rules.weapon_radius;
                let rules = self.rules.clone();
                let reach = &source.reach;
                let radius = move_radius.max(body + reach.peak() as f64 + weapon);
                self.iterate(position, radius, |p, cell, d| {
                    if d < body {
                        cell.occupants += sign;
                    }
                    if d < move_radius {
                        cell.friendly_exposed += sign;
                    }
                    let thrust = reach.get(position.heading_to(p)) as f64;
                    if d < body + thrust + weapon {
                        let weight = (rules.falloff(d) * WEIGHT_SCALE).round() as i32;
                        cell.friendly_attack_fixed += weight * sign;
                    }
                });
            }
            (Allegiance::Friendly, Mobility::Stationary) => {
                let radius = body + self.rules.weapon_radius;
                self.iterate(position, radius, |_, cell, d| {
                    if d < body {
                        cell.occupants += sign;
                    }
                    cell.friendly_exposed += sign;
                });
            }
            (Allegiance::Enemy, Mobility::Mobile) => {
                let radius = body + self.rules.max_speed() + self.rules.weapon_radius + 1.0;
                self.iterate(position, radius, |_, cell, d| {
                    if d < body {
                        cell.occupants += sign;
                    }
                    cell.enemy_exposed += sign;
                    cell.enemy_attack += sign;
                });
            }
            (Allegiance::Enemy, Mobility::Stationary) => {
                let radius = body + self.rules.weapon_radius;
                self.iterate(position, radius, |_, cell, d| {
                    if d < body {
                        cell.occupants += sign;
                    }
                    cell.enemy_exposed += sign;
                });
            }
        }
    }

    /// Cell covering `p`, if `p` lies on the grid.
    pub fn cell_at(&self, p: Vec2) -> Option<CellIndex> {
        if !p.is_finite() || p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let col = (p.x * self.definition).floor() as u64;
        let row = (p.y * self.definition).floor() as u64;
        if col >= self.cols as u64 || row >= self.rows as u64 {
            return None;
        }
        Some(CellIndex {
            col: col as u32,
            row: row as u32,
        })
    }

    /// Center of `cell` in field coordinates; `cell_at(cell_center(c)) == Some(c)`.
    pub fn cell_center(&self, cell: CellIndex) -> Vec2 {
        Vec2::new(
            (cell.col as f64 + 0.5) / self.definition,
            (cell.row as f64 + 0.5) / self.definition,
        )
    }

    pub fn get(&self, cell: CellIndex) -> &InfluenceCell {
        &self.cells[self.idx(cell)]
    }

    /// Aggregates at `p`, or `None` off the grid.
    pub fn sample(&self, p: Vec2) -> Option<&InfluenceCell> {
        self.cell_at(p).map(|c| self.get(c))
    }

    /// Visit every cell whose center lies strictly within `radius` of `center`, row-major.
    pub fn iterate(
        &mut self,
        center: Vec2,
        radius: f64,
        mut action: impl FnMut(Vec2, &mut InfluenceCell, f64),
    ) {
        let Some((cols, rows)) = self.span(center, radius) else {
            return;
        };
        for row in rows {
            for col in cols.clone() {
                let cell = CellIndex { col, row };
                let p = self.cell_center(cell);
                let d = center.distance(p);
                if d < radius {
                    let idx = self.idx(cell);
                    action(p, &mut self.cells[idx], d);
                }
            }
        }
    }

    /// Read-only counterpart of [`iterate`](Self::iterate), same order.
    pub fn inspect(&self, center: Vec2, radius: f64, mut action: impl FnMut(Vec2, &InfluenceCell, f64)) {
        let Some((cols, rows)) = self.span(center, radius) else {
            return;
        };
        for row in rows {
            for col in cols.clone() {
                let cell = CellIndex { col, row };
                let p = self.cell_center(cell);
                let d = center.distance(p);
                if d < radius {
                    action(p, self.get(cell), d);
                }
            }
        }
    }

    fn idx(&self, cell: CellIndex) -> usize {
        cell.row as usize * self.cols as usize + cell.col as usize
    }

    fn span(
        &self,
        center: Vec2,
        radius: f64,
    ) -> Option<(core::ops::RangeInclusive<u32>, core::ops::RangeInclusive<u32>)> {
        if !(radius > 0.0) || !center.is_finite() || !radius.is_finite() {
            return None;
        }
        let clamp_axis = |v: f64, cells: u32| -> i64 {
            ((v * self.definition).floor() as i64).clamp(0, cells as i64 - 1)
        };
        let c0 = clamp_axis(center.x - radius, self.cols);
        let c1 = clamp_axis(center.x + radius, self.cols);
        let r0 = clamp_axis(center.y - radius, self.rows);
        let r1 = clamp_axis(center.y + radius, self.rows);
        Some((c0 as u32..=c1 as u32, r0 as u32..=r1 as u32))
    }
}
