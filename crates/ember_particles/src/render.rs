//! Render-data projection and the renderer-side collaborator traits
//!
//! Once per frame, after integration and emission, each emitter projects
//! its alive particles into the packed vertex stream of an external
//! render object. The engine never owns GPU resources; it only fills the
//! mapped slice handed out by the [`RenderTarget`] trait.

use crate::emitter::ParticleEmitter;
use crate::math::{Aabb, Quat};
use crate::scene::MeshFactory;
use crate::template::ParticleAlign;
use ember_core::Vec3;
use std::sync::Arc;

/// One packed vertex record per rendered particle quad
///
/// Field layout matches the GPU-side struct; `Pod` lets backends cast the
/// mapped slice straight to bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleVertex {
    /// World position
    pub position: [f32; 3],
    /// Quad U basis direction, w = shader intensity
    pub u_dir_intensity: [f32; 4],
    /// Quad V basis direction
    pub v_dir: [f32; 3],
    /// Pivot (xy) and size (zw)
    pub pivot_size: [f32; 4],
    /// Rotation, alpha, and the current UV offset (zw)
    pub rot_alpha_uv: [f32; 4],
    /// Per-cell UV extent
    pub uv_step: [f32; 2],
    /// Final particle color
    pub color: [f32; 4],
}

/// A mappable vertex stream for one particle texture
pub trait RenderTarget {
    /// Borrow a write cursor over exactly `count` vertex records
    fn map(&mut self, count: usize) -> &mut [ParticleVertex];
    /// Release the write cursor obtained from [`RenderTarget::map`]
    fn unmap(&mut self);
    /// Request both-sided rasterization for this target
    fn set_double_sided(&mut self, double_sided: bool);
}

/// Resolves the shared render object for a texture path
pub trait RenderTargets {
    /// Look up the target for `texture`, or `None` when the resource is
    /// unavailable (the template is skipped for the frame)
    fn target(&mut self, texture: &str) -> Option<&mut dyn RenderTarget>;
}

/// Camera queries the projection step depends on
pub trait CameraView {
    /// Whether the given world bound is outside the view frustum
    fn is_culled(&self, bounds: &Aabb) -> bool;
    /// Rotation part of the view matrix
    fn view_rotation(&self) -> Quat;
    /// View direction
    fn forward(&self) -> Vec3;
    /// Camera world position
    fn position(&self) -> Vec3;
}

/// Per-frame collaborator access handed to [`ParticleEmitter::update`]
///
/// All external state arrives here explicitly; the engine performs no
/// ambient/global lookups.
pub struct FrameContext<'a> {
    /// Camera used for culling and billboard alignment
    pub camera: &'a dyn CameraView,
    /// Per-texture render objects
    pub targets: &'a mut dyn RenderTargets,
    /// Mesh instantiation for geometry-mode templates
    pub meshes: &'a mut dyn MeshFactory,
}

impl ParticleEmitter {
    /// Copy this frame's visual state to the external renderer
    ///
    /// Skips everything when the emitter's world bound is culled. Quad
    /// templates write one vertex per alive particle (two for crossed
    /// templates); geometry templates push position and orientation to
    /// their particles' mesh objects instead.
    pub(crate) fn copy_to_renderer(&mut self, dt: f32, ctx: &mut FrameContext) {
        if ctx.camera.is_culled(&self.bounds) {
            return;
        }
        let definition = Arc::clone(&self.definition);
        let transform = self.transform;
        let forward = transform.forward();
        let view_rotation = ctx.camera.view_rotation();
        let cam_forward = ctx.camera.forward();
        let dist_to_cam = (ctx.camera.position() - transform.translation()).length();

        for (ti, template) in definition.templates().iter().enumerate() {
            let runtime = &mut self.runtimes[ti];
            let alive = runtime.pool.alive_count();
            if alive == 0 {
                continue;
            }

            let Some(texture) = template.texture.as_deref() else {
                // Geometry-mode template: no vertex stream, just move the
                // particles' mesh objects.
                for p in runtime.pool.iter_mut() {
                    if !p.life.is_alive() {
                        continue;
                    }
                    if let Some(mesh) = p.mesh.as_mut() {
                        mesh.set_position(p.world_position);
                        mesh.set_direction(forward);
                    }
                }
                continue;
            };

            let Some(target) = ctx.targets.target(texture) else {
                continue;
            };
            if template.double_sided || template.align != ParticleAlign::Billboard {
                target.set_double_sided(true);
            }

            let passes = if template.cross { 2 } else { 1 };
            let vertices = target.map(alive * passes);
            let mut cursor = 0;
            for p in runtime.pool.iter() {
                if !p.life.is_alive() {
                    continue;
                }

                let mut u_dir = p.u_dir;
                let mut v_dir = p.v_dir;
                if template.is_local_space() && template.align == ParticleAlign::Direction {
                    // Re-derive the quad basis from the view so the quad
                    // stays edge-on to the emitter's world direction.
                    let world_forward = transform.rotation.rotate_vec3(p.u_dir);
                    u_dir = view_rotation.rotate_vec3(world_forward);
                    v_dir = view_rotation
                        .rotate_vec3(cam_forward.cross(world_forward).normalize_or(p.v_dir));
                }
                // The crossed second plane shares U and takes the
                // perpendicular V.
                let cross_v = v_dir.cross(u_dir).normalize_or(v_dir);

                let mut size = p.size;
                if template.stretch_max > 0.0 && dt > 0.0 {
                    let travel = (p.world_position - p.prev_position).length() / dt * 0.1
                        - dist_to_cam * 0.1;
                    size.x += (size.x * template.stretch_max).min(travel.max(0.0));
                }

                let age = p.life.age();
                for pass in 0..passes {
                    let v = if pass == 0 { v_dir } else { cross_v };
                    vertices[cursor] = ParticleVertex {
                        position: p.world_position.to_array(),
                        u_dir_intensity: [u_dir.x, u_dir.y, u_dir.z, p.intensity],
                        v_dir: v.to_array(),
                        pivot_size: [template.pivot.x, template.pivot.y, size.x, size.y],
                        rot_alpha_uv: [
                            p.rotation,
                            p.alpha,
                            p.uv_index.x - template.uv_flow.x * age,
                            p.uv_index.y - template.uv_flow.y * age,
                        ],
                        uv_step: p.uv_step.to_array(),
                        color: p.color.to_array(),
                    };
                    cursor += 1;
                }
            }
            target.unmap();
        }
    }
}
