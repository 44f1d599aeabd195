//! Convenient re-exports for hosts embedding the engine

pub use crate::definition::{DefinitionStore, EmitterDefinition};
pub use crate::emitter::{EmitterRegistry, InstanceId, ParticleEmitter};
pub use crate::error::{ParticleError, Result};
pub use crate::math::{Aabb, Quat};
pub use crate::particle::{LifeState, Particle};
pub use crate::render::{CameraView, FrameContext, ParticleVertex, RenderTarget, RenderTargets};
pub use crate::scene::{MeshFactory, MeshObject, Transform};
pub use crate::template::{
    BlendMode, EmitRange, EmitSpace, ParticleAlign, ParticleTemplate, Ramp, INFINITE_LIFE,
};
pub use ember_core::{Color, Vec2, Vec3};
