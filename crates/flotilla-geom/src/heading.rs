#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of discrete headings (whole degrees).
pub const HEADING_COUNT: usize = 360;

/// Largest thrust an agent can apply in one step.
pub const MAX_THRUST: u8 = 7;

/// A whole-degree heading in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u16", into = "u16"))]
pub struct Heading(u16);

impl Heading {
    pub const EAST: Self = Self(0);

    /// Wraps any integer number of degrees into `[0, 360)`.
    pub fn wrapping(degrees: i64) -> Self {
        Self(degrees.rem_euclid(HEADING_COUNT as i64) as u16)
    }

    pub fn new(degrees: u16) -> Option<Self> {
        ((degrees as usize) < HEADING_COUNT).then_some(Self(degrees))
    }

    /// Rounds an angle in radians to the nearest whole degree.
    pub fn from_radians(rad: f64) -> Self {
        Self::wrapping(rad.to_degrees().round() as i64)
    }

    pub fn degrees(self) -> u16 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn to_radians(self) -> f64 {
        (self.0 as f64).to_radians()
    }

    /// Smallest angular distance in degrees between two headings (`0..=180`).
    pub fn separation(self, other: Self) -> u16 {
        let d = (self.0 as i32 - other.0 as i32).unsigned_abs() as u16;
        d.min(HEADING_COUNT as u16 - d)
    }

    /// All headings in ascending order.
    pub fn all() -> impl Iterator<Item = Heading> {
        (0..HEADING_COUNT as u16).map(Heading)
    }
}

impl From<Heading> for u16 {
    fn from(h: Heading) -> u16 {
        h.0
    }
}

impl TryFrom<u16> for Heading {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        Heading::new(degrees).ok_or_else(|| format!("heading {degrees} out of range [0, 360)"))
    }
}

/// Headings within `half_width` degrees of `center`, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingWindow {
    pub center: Heading,
    pub half_width: u16,
}

impl HeadingWindow {
    pub fn new(center: Heading, half_width: u16) -> Self {
        Self { center, half_width }
    }

    pub fn contains(&self, heading: Heading) -> bool {
        heading.separation(self.center) <= self.half_width
    }

    /// Each heading in the window once, counter-clockwise from the low edge.
    pub fn headings(&self) -> impl Iterator<Item = Heading> {
        let center = self.center.0 as i64;
        let (low, high) = if self.half_width >= 180 {
            (-179, 180)
        } else {
            let w = self.half_width as i64;
            (-w, w)
        };
        (low..=high).map(move |offset| Heading::wrapping(center + offset))
    }
}

/// Largest safe thrust per heading.
#[derive(Clone, PartialEq, Eq)]
pub struct ThrustProfile([u8; HEADING_COUNT]);

impl ThrustProfile {
    /// Every heading limited to `thrust`.
    pub fn uniform(thrust: u8) -> Self {
        Self([thrust.min(MAX_THRUST); HEADING_COUNT])
    }

    pub fn get(&self, heading: Heading) -> u8 {
        self.0[heading.index()]
    }

    pub fn set(&mut self, heading: Heading, thrust: u8) {
        self.0[heading.index()] = thrust.min(MAX_THRUST);
    }

    /// Largest thrust over all headings.
    pub fn peak(&self) -> u8 {
        self.0.iter().copied().max().unwrap_or(0)
    }
}

impl Default for ThrustProfile {
    fn default() -> Self {
        Self::uniform(0)
    }
}

impl core::fmt::Debug for ThrustProfile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThrustProfile")
            .field("peak", &self.peak())
            .finish_non_exhaustive()
    }
}
