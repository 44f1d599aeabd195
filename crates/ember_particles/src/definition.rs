//! Emitter definitions: the shared, immutable side of the prototype model
//!
//! An [`EmitterDefinition`] owns the parsed template list for one effect.
//! Runtime emitters never copy templates; they hold an `Arc` to the
//! definition and allocate only their own mutable state (pools,
//! accumulators, bounds). Spawning a new effect instance is O(1).

use crate::emitter::ParticleEmitter;
use crate::error::{ParticleError, Result};
use crate::template::{ParticleTemplate, INFINITE_LIFE};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Immutable description of one emitter class
#[derive(Debug)]
pub struct EmitterDefinition {
    emitter_id: u32,
    life_time: f32,
    manual: bool,
    templates: Vec<ParticleTemplate>,
    /// Upper bound on any particle's spawn-time extent, precomputed over
    /// all templates for the conservative world-bound margin
    max_size: f32,
}

impl EmitterDefinition {
    /// Build a definition from parsed templates
    ///
    /// Validates every template; fails without partial state on the first
    /// invalid record.
    pub fn new(
        emitter_id: u32,
        life_time: f32,
        manual: bool,
        templates: Vec<ParticleTemplate>,
    ) -> Result<Self> {
        let mut max_size = 0.0f32;
        for template in &templates {
            template.validate()?;
            if template.emit_per_sec <= 0.0 && template.initial_particles == 0 && !manual {
                tracing::warn!(
                    emitter_id,
                    "template with no emission rate and no initial particles never spawns"
                );
            }
            max_size = max_size.max(template.max_extent());
        }
        Ok(Self {
            emitter_id,
            life_time,
            manual,
            templates,
            max_size,
        })
    }

    /// Authored emitter id
    pub fn emitter_id(&self) -> u32 {
        self.emitter_id
    }

    /// Emitter life span in seconds; `-1` means the emitter never
    /// self-expires
    pub fn life_time(&self) -> f32 {
        self.life_time
    }

    /// Whether the emitter never self-expires
    pub fn is_infinite(&self) -> bool {
        self.life_time == INFINITE_LIFE
    }

    /// Whether instances are driven by manual emission calls instead of
    /// the scheduler
    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// The shared template list
    pub fn templates(&self) -> &[ParticleTemplate] {
        &self.templates
    }

    /// Precomputed maximum particle extent across all templates
    pub fn max_size(&self) -> f32 {
        self.max_size
    }

    /// Mint a runtime emitter instance referencing this definition
    ///
    /// The instance gets one pool per template, provisioned at twice the
    /// template's declared maximum, and its emission accumulators
    /// preloaded with each template's initial particle count.
    pub fn instantiate(self: Arc<Self>) -> ParticleEmitter {
        ParticleEmitter::new(self)
    }
}

/// Registry of loaded definitions by emitter id
///
/// The loading stage deposits definitions here once; gameplay code then
/// instantiates effects by id without re-parsing anything.
#[derive(Default)]
pub struct DefinitionStore {
    definitions: FxHashMap<u32, Arc<EmitterDefinition>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, returning any definition it replaced
    pub fn insert(&mut self, definition: EmitterDefinition) -> Option<Arc<EmitterDefinition>> {
        let id = definition.emitter_id();
        let replaced = self.definitions.insert(id, Arc::new(definition));
        if replaced.is_some() {
            tracing::warn!(emitter_id = id, "replacing existing emitter definition");
        }
        replaced
    }

    /// Look up a definition by id
    pub fn get(&self, emitter_id: u32) -> Option<&Arc<EmitterDefinition>> {
        self.definitions.get(&emitter_id)
    }

    /// Instantiate a new emitter for the definition registered under `id`
    pub fn instantiate(&self, emitter_id: u32) -> Result<ParticleEmitter> {
        self.definitions
            .get(&emitter_id)
            .map(|definition| ParticleEmitter::new(Arc::clone(definition)))
            .ok_or(ParticleError::UnknownEmitter(emitter_id))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Vec2;

    fn template(max: u32) -> ParticleTemplate {
        ParticleTemplate {
            texture: Some("fx/spark.dds".into()),
            max_particles: max,
            emit_per_sec: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_template() {
        let bad = ParticleTemplate {
            texture: Some("a".into()),
            geometry: Some("b".into()),
            max_particles: 4,
            ..Default::default()
        };
        assert!(EmitterDefinition::new(1, 2.0, false, vec![bad]).is_err());
    }

    #[test]
    fn test_max_size_fold() {
        let small = ParticleTemplate {
            size_min_max: Vec2::new(1.0, 2.0),
            ..template(4)
        };
        let large = ParticleTemplate {
            size_min_max: Vec2::new(3.0, 5.0),
            ..template(4)
        };
        let def = EmitterDefinition::new(1, 2.0, false, vec![small, large]).unwrap();
        assert!((def.max_size() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_store_roundtrip() {
        let mut store = DefinitionStore::new();
        let def = EmitterDefinition::new(7, INFINITE_LIFE, false, vec![template(4)]).unwrap();
        assert!(store.insert(def).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.get(7).unwrap().is_infinite());

        let emitter = store.instantiate(7).unwrap();
        assert_eq!(emitter.definition().emitter_id(), 7);
    }

    #[test]
    fn test_store_unknown_id() {
        let store = DefinitionStore::new();
        assert!(matches!(
            store.instantiate(42),
            Err(ParticleError::UnknownEmitter(42))
        ));
    }

    #[test]
    fn test_insert_replaces() {
        let mut store = DefinitionStore::new();
        store.insert(EmitterDefinition::new(3, 1.0, false, vec![template(4)]).unwrap());
        let replaced = store.insert(EmitterDefinition::new(3, 2.0, false, vec![template(8)]).unwrap());
        assert!(replaced.is_some());
        assert_eq!(store.len(), 1);
    }
}
