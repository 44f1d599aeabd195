//! # Ember Particles
//!
//! A template-driven particle simulation and emission engine for
//! real-time 3D scenes.
//!
//! This crate provides:
//! - **Declarative templates** describing spawn rate, motion and visual
//!   curves for one class of particle
//! - **Definitions** owning the immutable template list, with O(1)
//!   instantiation of runtime emitters
//! - **Fixed-capacity pools** with ring-buffer recycling
//! - **A frame-cadence simulation step** integrating velocity, rotation,
//!   scale, fade, color and UV animation in a fixed order
//! - **Render projection** into a packed, `bytemuck`-castable vertex
//!   stream behind narrow collaborator traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ember_particles::prelude::*;
//!
//! let template: ParticleTemplate = toml::from_str(SPARKS_TOML)?;
//! let definition = Arc::new(EmitterDefinition::new(1, 4.0, false, vec![template])?);
//!
//! let mut emitter = definition.instantiate();
//! emitter.activate(&mut registry);
//!
//! // once per frame, from the host's driver loop:
//! let mut ctx = FrameContext { camera, targets, meshes };
//! if !emitter.update(dt, &mut ctx) {
//!     // effect finished; drop the emitter
//! }
//! ```

// Errors
pub mod error;

// Math utilities
pub mod math;

// Emitter transform and scene-side traits
pub mod scene;

// Declarative templates
pub mod template;

// Shared immutable definitions (prototype side)
pub mod definition;

// Particle runtime state
pub mod particle;

// Bounded pools
pub mod pool;

// Runtime emitters
pub mod emitter;

// Render-data projection and renderer-side traits
pub mod render;

// Prelude for common imports
pub mod prelude;

// Re-export core types at crate root
pub use definition::{DefinitionStore, EmitterDefinition};
pub use emitter::{EmitterRegistry, InstanceId, ParticleEmitter};
pub use error::{ParticleError, Result};
pub use math::{Aabb, Quat};
pub use particle::{LifeState, Particle};
pub use pool::ParticlePool;
pub use render::{CameraView, FrameContext, ParticleVertex, RenderTarget, RenderTargets};
pub use scene::{MeshFactory, MeshObject, Transform};
pub use template::{
    BlendMode, EmitRange, EmitSpace, ParticleAlign, ParticleTemplate, Ramp, INFINITE_LIFE,
};
