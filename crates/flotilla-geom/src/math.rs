use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Heading;

/// A point or velocity on the playing field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Velocity of magnitude `magnitude` pointing along `heading`.
    pub fn from_heading(heading: Heading, magnitude: f64) -> Self {
        let rad = heading.to_radians();
        Self::new(rad.cos() * magnitude, rad.sin() * magnitude)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).length_squared()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Angle from `self` towards `target` in radians, in `(-pi, pi]`.
    pub fn angle_to(self, target: Self) -> f64 {
        (target.y - self.y).atan2(target.x - self.x)
    }

    /// Heading from `self` towards `target`, rounded to the nearest whole degree.
    pub fn heading_to(self, target: Self) -> Heading {
        Heading::from_radians(self.angle_to(target))
    }

    /// Point on the circle of radius `radius + min_distance` around `center` that faces `self`.
    ///
    /// When `self` sits exactly on `center` the point lies along heading 0.
    pub fn closest_point_to(self, center: Self, radius: f64, min_distance: f64) -> Self {
        let reach = radius + min_distance;
        let angle = if self == center {
            0.0
        } else {
            center.angle_to(self)
        };
        Self::new(center.x + reach * angle.cos(), center.y + reach * angle.sin())
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}
