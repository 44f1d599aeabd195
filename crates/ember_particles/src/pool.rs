//! Bounded particle storage with ring-buffer recycling

use crate::error::{ParticleError, Result};
use crate::particle::Particle;

/// Fixed-capacity storage for one template's particle population
///
/// Capacity is fixed at init time (twice the template's declared maximum)
/// and never grows: once full, emitting recycles the oldest slot. Slots
/// keep their storage when recycled, so per-slot resources (mesh
/// instances) are created at most once.
#[derive(Default)]
pub struct ParticlePool {
    slots: Vec<Particle>,
    capacity: usize,
    /// Next slot to recycle once the pool is full
    cursor: usize,
}

impl ParticlePool {
    /// Create a pool with the given fixed capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// (Re)initialize to a new capacity, discarding all content
    pub fn init(&mut self, capacity: usize) {
        self.slots = Vec::with_capacity(capacity);
        self.capacity = capacity;
        self.cursor = 0;
    }

    /// Fixed slot capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied slot count (alive or dead)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Claim a slot for a new particle, returning its index and whether a
    /// living occupant was evicted to make room
    ///
    /// Below capacity this appends; at capacity it recycles the oldest
    /// slot. The returned slot is reset and ready for initialization.
    pub fn emit(&mut self) -> (usize, bool) {
        if self.slots.len() < self.capacity {
            self.slots.push(Particle::default());
            (self.slots.len() - 1, false)
        } else {
            let index = self.cursor;
            self.cursor = (self.cursor + 1) % self.capacity;
            let evicted_alive = self.slots[index].life.is_alive();
            self.slots[index].reset();
            (index, evicted_alive)
        }
    }

    /// Random slot access for manual emission mode
    pub fn get(&self, index: usize) -> Result<&Particle> {
        self.slots
            .get(index)
            .ok_or(ParticleError::InvalidParticleIndex {
                index,
                len: self.slots.len(),
            })
    }

    /// Direct slot access for indices the pool itself handed out
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Particle {
        &mut self.slots[index]
    }

    /// Mutable random slot access for manual emission mode
    pub fn get_mut(&mut self, index: usize) -> Result<&mut Particle> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(ParticleError::InvalidParticleIndex { index, len })
    }

    /// Iterate over all occupied slots, alive or dead
    ///
    /// Order is insertion order modulo recycling.
    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.slots.iter()
    }

    /// Mutable iteration over all occupied slots
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.slots.iter_mut()
    }

    /// Number of slots currently holding a living particle
    pub fn alive_count(&self) -> usize {
        self.slots.iter().filter(|p| p.life.is_alive()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::LifeState;

    fn fill_alive(pool: &mut ParticlePool, n: usize) {
        for _ in 0..n {
            let (i, _) = pool.emit();
            pool.get_mut(i).unwrap().life = LifeState::Alive { age: 0.0, span: 1.0 };
        }
    }

    #[test]
    fn test_capacity_is_fixed() {
        let mut pool = ParticlePool::new(4);
        fill_alive(&mut pool, 10);
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn test_recycles_oldest() {
        let mut pool = ParticlePool::new(3);
        for v in 0..3 {
            let (i, evicted) = pool.emit();
            assert!(!evicted);
            pool.get_mut(i).unwrap().velocity = v as f32;
        }

        // Full: the next emit lands in slot 0, then 1, then 2, then 0 again
        let (i, _) = pool.emit();
        assert_eq!(i, 0);
        let (i, _) = pool.emit();
        assert_eq!(i, 1);
        let (i, _) = pool.emit();
        assert_eq!(i, 2);
        let (i, _) = pool.emit();
        assert_eq!(i, 0);
    }

    #[test]
    fn test_emit_reports_eviction() {
        let mut pool = ParticlePool::new(2);
        fill_alive(&mut pool, 2);

        let (i, evicted_alive) = pool.emit();
        assert!(evicted_alive, "recycling a living slot must be reported");
        // The recycled slot is reset
        assert_eq!(pool.get(i).unwrap().life, LifeState::Dead);

        let (_, evicted_alive) = pool.emit();
        assert!(
            evicted_alive,
            "second recycle still evicts the other living slot"
        );
        let (_, evicted_alive) = pool.emit();
        assert!(!evicted_alive, "slot killed by the first recycle is free");
    }

    #[test]
    fn test_get_out_of_range() {
        let mut pool = ParticlePool::new(2);
        pool.emit();
        assert!(pool.get(0).is_ok());
        assert!(matches!(
            pool.get(1),
            Err(ParticleError::InvalidParticleIndex { index: 1, len: 1 })
        ));
        assert!(pool.get_mut(5).is_err());
    }

    #[test]
    fn test_init_discards() {
        let mut pool = ParticlePool::new(2);
        fill_alive(&mut pool, 2);
        pool.init(8);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.alive_count(), 0);
    }

    #[test]
    fn test_alive_count_filters() {
        let mut pool = ParticlePool::new(4);
        fill_alive(&mut pool, 3);
        pool.get_mut(1).unwrap().life = LifeState::Dead;
        assert_eq!(pool.alive_count(), 2);
        assert_eq!(pool.len(), 3);
    }
}
