//! World-space bounding volume for emitter culling

use ember_core::Vec3;

/// Axis-aligned bounding box, rebuilt incrementally every frame
///
/// An invalidated box is "empty" (min above max); merging the first point
/// collapses it onto that point. `expand` grows the box by a scalar margin
/// on every axis, which over-approximates rotation and stretch effects
/// without touching individual particles again.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an empty bounding box
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Create from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Reset to the empty state, discarding all merged points
    pub fn invalidate(&mut self) {
        *self = Self::empty();
    }

    /// Check whether no point has been merged since the last invalidate
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to include a point
    pub fn merge(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow by a scalar margin on every axis
    ///
    /// No-op on an empty box, so a frame with zero alive particles keeps
    /// an empty (always-culled) bound.
    pub fn expand(&mut self, margin: f32) {
        if self.is_empty() {
            return;
        }
        self.min -= Vec3::splat(margin);
        self.max += Vec3::splat(margin);
    }

    /// Get the center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Check if a point is inside
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this box intersects another
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_merge() {
        let mut aabb = Aabb::empty();
        assert!(aabb.is_empty());

        aabb.merge(Vec3::new(1.0, 2.0, 3.0));
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));

        aabb.merge(Vec3::new(-1.0, 0.0, 5.0));
        assert_eq!(aabb.min, Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn test_invalidate() {
        let mut aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        aabb.invalidate();
        assert!(aabb.is_empty());
    }

    #[test]
    fn test_expand() {
        let mut aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        aabb.expand(2.0);
        assert_eq!(aabb.min, Vec3::splat(-2.0));
        assert_eq!(aabb.max, Vec3::splat(3.0));

        // Expanding an empty box keeps it empty
        let mut empty = Aabb::empty();
        empty.expand(10.0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_contains_point() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }
}
