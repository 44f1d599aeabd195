//! Emitter transform and the scene-side collaborator traits

use crate::math::Quat;
use ember_core::Vec3;

/// World placement of an emitter
///
/// Position, rotation and scale, with the local-to-world mapping the
/// simulation applies to local-space particles every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World position
    pub position: Vec3,
    /// World rotation
    pub rotation: Quat,
    /// Non-uniform scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create an identity transform at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Create at a position
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Set position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set rotation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set uniform scale
    pub fn with_uniform_scale(mut self, s: f32) -> Self {
        self.scale = Vec3::splat(s);
        self
    }

    /// World translation component
    pub fn translation(&self) -> Vec3 {
        self.position
    }

    /// Get the forward direction (negative Z in local space)
    pub fn forward(&self) -> Vec3 {
        self.rotation.rotate_vec3(Vec3::FORWARD)
    }

    /// Map a local-space point into world space (scale, rotate, translate)
    pub fn apply_forward(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation.rotate_vec3(local * self.scale)
    }
}

/// Narrow interface to a scene mesh instance owned by a geometry-mode particle
///
/// The engine never inspects the mesh; it only attaches/detaches it and
/// pushes position and orientation once per frame.
pub trait MeshObject {
    /// Make the mesh visible in the host scene
    fn attach_to_scene(&mut self);
    /// Remove the mesh from the host scene
    fn detach_from_scene(&mut self);
    /// Move the mesh
    fn set_position(&mut self, position: Vec3);
    /// Orient the mesh
    fn set_direction(&mut self, direction: Vec3);
}

/// Creates mesh instances for geometry-mode templates
///
/// Called lazily, at most once per pool slot: a recycled slot keeps its
/// mesh instance and reuses it for the next particle spawned into it.
pub trait MeshFactory {
    /// Instantiate the mesh resource at `path`, or `None` if it cannot be
    /// resolved (the particle then simulates without a visual)
    fn create(&mut self, path: &str) -> Option<Box<dyn MeshObject>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_apply_forward_identity() {
        let t = Transform::new();
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(t.apply_forward(p), p);
    }

    #[test]
    fn test_apply_forward_translated() {
        let t = Transform::at(Vec3::new(10.0, 0.0, 0.0));
        let p = t.apply_forward(Vec3::new(1.0, 0.0, 0.0));
        assert!((p.x - 11.0).abs() < 1e-5);
    }

    #[test]
    fn test_apply_forward_rotated_scaled() {
        // 90 degrees around Y carries +X onto -Z; scale doubles first
        let t = Transform::new()
            .with_rotation(Quat::from_axis_angle(Vec3::Y, PI / 2.0))
            .with_uniform_scale(2.0);
        let p = t.apply_forward(Vec3::X);
        assert!(p.x.abs() < 1e-5);
        assert!(p.y.abs() < 1e-5);
        assert!((p.z - (-2.0)).abs() < 1e-5);
    }

    #[test]
    fn test_forward() {
        let t = Transform::new();
        let f = t.forward();
        assert!((f.z - (-1.0)).abs() < 1e-5);

        let turned = Transform::new().with_rotation(Quat::from_axis_angle(Vec3::Y, PI / 2.0));
        let f = turned.forward();
        assert!((f.x - (-1.0)).abs() < 1e-5);
        assert!(f.z.abs() < 1e-5);
    }
}
