//! Math utilities for the particle engine

mod bounds;
mod quat;

pub use bounds::Aabb;
pub use quat::Quat;
