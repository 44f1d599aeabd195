//! # Ember Core
//!
//! Shared primitives for the Ember engine crates:
//! - **Vectors** (`Vec2`, `Vec3`) with the arithmetic the simulation
//!   crates lean on
//! - **Colors** (`Color`) in linear space, with interpolation and tinting
//!
//! Everything here is plain data: `Copy`, serde-friendly, and free of
//! engine state, so higher-level crates can embed these types in their
//! declarative records.

mod color;
mod math;

pub use color::Color;
pub use math::{Vec2, Vec3};
