//! Error types for ember_particles

use thiserror::Error;

/// Errors that can occur in the particle engine
#[derive(Error, Debug)]
pub enum ParticleError {
    /// Template index out of range for the emitter's definition
    #[error("template index {index} out of range (definition has {count} templates)")]
    InvalidTemplateIndex {
        /// Requested index
        index: usize,
        /// Number of templates in the definition
        count: usize,
    },

    /// Particle slot index out of range for the template's pool
    #[error("particle index {index} out of range (pool holds {len} slots)")]
    InvalidParticleIndex {
        /// Requested slot
        index: usize,
        /// Occupied slot count
        len: usize,
    },

    /// Direct particle access on an emitter that is not manually controlled
    #[error("emitter {0} is not a manual emitter")]
    NotManualEmitter(u32),

    /// A template record violates an invariant (e.g. texture and geometry both set)
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// No definition registered under the requested emitter id
    #[error("unknown emitter id {0}")]
    UnknownEmitter(u32),
}

/// Result type for ember_particles operations
pub type Result<T> = std::result::Result<T, ParticleError>;
