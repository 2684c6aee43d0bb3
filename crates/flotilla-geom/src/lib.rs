//! Geometry kernel for fleet navigation: vectors, discretized headings and exact
//! continuous-time collision tests between moving circles.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod collision;
pub mod heading;
pub mod math;

pub use collision::{collides_within_step, collision_time, segment_circle_intersect, Circle};
pub use heading::{Heading, HeadingWindow, ThrustProfile, HEADING_COUNT, MAX_THRUST};
pub use math::Vec2;
