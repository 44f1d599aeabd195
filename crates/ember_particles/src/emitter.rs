//! Runtime particle emitters
//!
//! A [`ParticleEmitter`] is one live effect instance minted from an
//! [`EmitterDefinition`](crate::definition::EmitterDefinition). It owns one
//! particle pool per template plus the per-template emission state, and is
//! driven by an external frame loop calling [`ParticleEmitter::update`]
//! once per frame.

use crate::definition::EmitterDefinition;
use crate::error::{ParticleError, Result};
use crate::math::{Aabb, Quat};
use crate::particle::{LifeState, Particle};
use crate::pool::ParticlePool;
use crate::render::FrameContext;
use crate::scene::{MeshFactory, Transform};
use crate::template::{EmitSpace, ParticleAlign, ParticleTemplate};
use ember_core::{Color, Vec2, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Skip the default-direction correction below this angle (radians)
const MIN_CORRECTION_ANGLE: f32 = 0.01;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one emitter instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// External registry of active emitters
///
/// The emitter guards against redundant notifications itself, and
/// implementations must additionally be idempotent with respect to the
/// emitter's current membership.
pub trait EmitterRegistry {
    /// Note an emitter as active
    fn add_active(&mut self, emitter: InstanceId);
    /// Note an emitter as no longer active
    fn remove_active(&mut self, emitter: InstanceId);
}

/// Per-template mutable state, index-aligned with the definition's
/// template list
pub(crate) struct TemplateRuntime {
    pub(crate) pool: ParticlePool,
    /// Fractional emission accumulator; the integer part is this frame's
    /// spawn count, the remainder carries over
    pub(crate) accumulator: f32,
    /// Spawn position of the previous batch, kept only for
    /// position-interpolating templates
    pub(crate) last_emit_pos: Option<Vec3>,
    /// Living particle count maintained by integration and emission
    pub(crate) alive: u32,
}

/// One live particle effect instance
pub struct ParticleEmitter {
    pub(crate) definition: Arc<EmitterDefinition>,
    instance: InstanceId,
    pub(crate) transform: Transform,
    /// Emitter-wide color multiplier applied to every particle
    color: Color,
    /// Externally driven beam length for direction-aligned templates
    length: f32,
    cur_life: f32,
    active: bool,
    stop: bool,
    stop_immediate: bool,
    pub(crate) bounds: Aabb,
    pub(crate) runtimes: Vec<TemplateRuntime>,
    rng: SmallRng,
}

impl ParticleEmitter {
    /// Create an instance of a definition
    ///
    /// Equivalent to [`EmitterDefinition::instantiate`].
    pub fn new(definition: Arc<EmitterDefinition>) -> Self {
        let runtimes = definition
            .templates()
            .iter()
            .map(|template| TemplateRuntime {
                pool: ParticlePool::new(template.max_particles as usize * 2),
                accumulator: template.initial_particles as f32,
                last_emit_pos: None,
                alive: 0,
            })
            .collect();
        Self {
            definition,
            instance: InstanceId::next(),
            transform: Transform::default(),
            color: Color::WHITE,
            length: 0.0,
            cur_life: 0.0,
            active: false,
            stop: false,
            stop_immediate: false,
            bounds: Aabb::empty(),
            runtimes,
            rng: SmallRng::from_entropy(),
        }
    }

    /// The shared definition this instance was minted from
    pub fn definition(&self) -> &Arc<EmitterDefinition> {
        &self.definition
    }

    /// Process-unique instance identity
    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// World placement
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Move/orient the emitter
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// World bound of last frame's alive particles
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Whether the emitter is still running
    pub fn is_alive(&self) -> bool {
        self.active
    }

    /// Emitter age in seconds since activation
    pub fn current_life(&self) -> f32 {
        self.cur_life
    }

    /// Set the emitter-wide color multiplier
    pub fn set_emitter_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Reseed the spawn-sampling generator for deterministic replays
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Living particle count for one template's pool
    pub fn alive_particles(&self, template_index: usize) -> usize {
        self.runtimes
            .get(template_index)
            .map(|rt| rt.pool.alive_count())
            .unwrap_or(0)
    }

    /// Living particle count across all templates
    pub fn total_alive(&self) -> usize {
        self.runtimes.iter().map(|rt| rt.pool.alive_count()).sum()
    }

    /// Borrow one template's pool
    pub fn pool(&self, template_index: usize) -> Option<&ParticlePool> {
        self.runtimes.get(template_index).map(|rt| &rt.pool)
    }

    /// Start the emitter and register it with the active list
    ///
    /// No-op when already active. Resets age, stop state and reloads the
    /// emission accumulators with each template's initial particle count;
    /// pool contents are kept.
    pub fn activate(&mut self, registry: &mut dyn EmitterRegistry) {
        if self.active {
            return;
        }
        registry.add_active(self.instance);
        self.active = true;
        self.stop = false;
        self.stop_immediate = false;
        self.cur_life = 0.0;
        let definition = Arc::clone(&self.definition);
        for (ti, template) in definition.templates().iter().enumerate() {
            self.runtimes[ti].accumulator = template.initial_particles as f32;
        }
    }

    /// Remove the emitter from the active list
    ///
    /// No-op when not active. Particles are kept in place.
    pub fn deactivate(&mut self, registry: &mut dyn EmitterRegistry) {
        if !self.active {
            return;
        }
        registry.remove_active(self.instance);
        self.active = false;
    }

    /// Stop emission and let existing particles finish their lives
    pub fn stop(&mut self) {
        self.stop = true;
    }

    /// Stop emission and drop all particles without letting them fade
    pub fn stop_immediate(&mut self) {
        self.stop = true;
        self.stop_immediate = true;
    }

    /// Re-provision every template's pool at an exact capacity
    ///
    /// Intended for manual-emission hosts; all current particles are
    /// discarded.
    pub fn set_buffer_size(&mut self, capacity: usize) {
        if capacity == 0 {
            tracing::warn!(
                emitter_id = self.definition.emitter_id(),
                "ignoring zero-capacity buffer request"
            );
            return;
        }
        for runtime in &mut self.runtimes {
            runtime.pool.init(capacity);
            runtime.alive = 0;
            runtime.last_emit_pos = None;
        }
    }

    /// Drive the externally authored beam length
    ///
    /// Re-derives the size of every particle of direction-aligned
    /// templates, sampling one fresh base size per template.
    pub fn set_length(&mut self, length: f32) {
        if self.length == length {
            return;
        }
        self.length = length;
        let definition = Arc::clone(&self.definition);
        for (ti, template) in definition.templates().iter().enumerate() {
            if template.align != ParticleAlign::Direction {
                continue;
            }
            let size = uniform_range(&mut self.rng, template.size_min_max);
            let ratio = uniform_range(&mut self.rng, template.size_ratio_min_max);
            for p in self.runtimes[ti].pool.iter_mut() {
                p.size = Vec2::new(size * ratio, size);
                if length != 0.0 && size != 0.0 {
                    p.size.x *= length / size;
                }
            }
        }
    }

    /// Spawn one particle of the given template immediately
    ///
    /// This bypasses the scheduler; it is how manual-emission hosts drive
    /// spawning. Returns the pool slot the particle landed in.
    pub fn emit_by_index(
        &mut self,
        template_index: usize,
        meshes: &mut dyn MeshFactory,
    ) -> Result<usize> {
        let definition = Arc::clone(&self.definition);
        let template = definition.templates().get(template_index).ok_or(
            ParticleError::InvalidTemplateIndex {
                index: template_index,
                count: definition.templates().len(),
            },
        )?;
        Ok(spawn_into(
            &mut self.runtimes[template_index],
            template,
            &self.transform,
            self.color,
            self.length,
            &mut self.rng,
            meshes,
        ))
    }

    /// Direct slot access for manual emitters
    pub fn particle_mut(
        &mut self,
        template_index: usize,
        particle_index: usize,
    ) -> Result<&mut Particle> {
        if !self.definition.is_manual() {
            return Err(ParticleError::NotManualEmitter(
                self.definition.emitter_id(),
            ));
        }
        let count = self.definition.templates().len();
        let runtime =
            self.runtimes
                .get_mut(template_index)
                .ok_or(ParticleError::InvalidTemplateIndex {
                    index: template_index,
                    count,
                })?;
        runtime.pool.get_mut(particle_index)
    }

    /// Advance the emitter by one frame
    ///
    /// Ages the emitter, integrates every particle, rebuilds the world
    /// bound, emits new particles unless stopped, and projects the
    /// results to the renderer. Returns `false` once the emitter has
    /// fully died; the caller then drops it from the frame loop.
    pub fn update(&mut self, dt: f32, ctx: &mut FrameContext) -> bool {
        self.cur_life += dt;
        if (!self.definition.is_infinite() && self.cur_life > self.definition.life_time())
            || self.stop
        {
            self.stop = true;
            let mut alive = 0usize;
            if !self.stop_immediate {
                // Force-expire infinite particles so the effect winds down;
                // finite ones keep fading on their own.
                for runtime in &mut self.runtimes {
                    for p in runtime.pool.iter_mut() {
                        if p.life.is_infinite() {
                            p.kill();
                        }
                        if p.life.is_alive() {
                            alive += 1;
                        }
                    }
                }
            } else {
                for runtime in &mut self.runtimes {
                    for p in runtime.pool.iter_mut() {
                        if p.life.is_alive() {
                            p.sweep();
                        }
                    }
                    runtime.alive = 0;
                }
            }
            if alive == 0 {
                self.active = false;
                return false;
            }
        }

        self.integrate(dt);

        if !self.stop {
            self.update_emission(dt, &mut *ctx.meshes);
        }

        self.copy_to_renderer(dt, ctx);
        true
    }

    /// Age and integrate every alive particle, rebuilding the world bound
    fn integrate(&mut self, dt: f32) {
        self.bounds.invalidate();
        let definition = Arc::clone(&self.definition);
        let transform = self.transform;
        let forward = transform.forward();
        let emitter_color = self.color;

        for (ti, template) in definition.templates().iter().enumerate() {
            let runtime = &mut self.runtimes[ti];
            runtime.alive = 0;
            for p in runtime.pool.iter_mut() {
                if !p.life.is_alive() {
                    continue;
                }
                if let LifeState::Alive { age, span } = &mut p.life {
                    *age += dt;
                    if *age >= *span {
                        p.kill();
                        continue;
                    }
                }
                runtime.alive += 1;
                let norm_age = p.life.normalized_age();

                // velocity ramps
                if let Some(t) = norm_age {
                    if t < template.accel.threshold {
                        p.velocity += template.accel.value * dt;
                    }
                    if t > template.decel.threshold {
                        p.velocity -= template.decel.value * dt;
                    }
                }

                // position
                p.prev_position = p.world_position;
                p.position += p.velocity_dir * (p.velocity * dt);
                p.world_position = if template.is_local_space() {
                    transform.apply_forward(p.position)
                } else {
                    p.position
                };

                // spin ramps act along the authored spin direction
                if let Some(t) = norm_age {
                    let sign = if p.rotation_speed == 0.0 {
                        0.0
                    } else {
                        p.rotation_speed.signum()
                    };
                    if t < template.rot_accel.threshold {
                        p.rotation_speed += sign * template.rot_accel.value * dt;
                    }
                    if t > template.rot_decel.threshold {
                        p.rotation_speed -= sign * template.rot_decel.value * dt;
                    }
                }
                p.rotation += p.rotation_speed * dt;

                // scale ramps
                if let Some(t) = norm_age {
                    if t < template.scale_accel.threshold {
                        p.scale_speed += Vec2::splat(template.scale_accel.value * dt);
                    }
                    if t > template.scale_decel.threshold {
                        p.scale_speed -= Vec2::splat(template.scale_decel.value * dt);
                    }
                }
                p.size = (p.size + p.scale_speed * dt).max(Vec2::ZERO);

                // world bound gets both side extrema of the quad
                let to_side = forward * p.size.x;
                self.bounds
                    .merge(p.world_position - to_side * template.pivot.x);
                self.bounds
                    .merge(p.world_position + to_side * (1.0 - template.pivot.x));

                // alpha and color over life
                if let Some(t) = norm_age {
                    p.alpha = if t < template.fade_in_out.x {
                        t / template.fade_in_out.x
                    } else if t > template.fade_in_out.y {
                        (1.0 - t) / (1.0 - template.fade_in_out.y)
                    } else {
                        1.0
                    };
                    if template.color != template.end_color() {
                        p.color =
                            Color::lerp(&template.color, &template.end_color(), t) * emitter_color;
                    }
                } else {
                    p.alpha = 1.0;
                }

                // UV sheet frame advance
                if template.has_uv_anim() && p.uv_seconds_per_frame > 0.0 {
                    p.uv_frame += dt;
                    while p.uv_frame > p.uv_seconds_per_frame {
                        p.uv_frame -= p.uv_seconds_per_frame;
                        p.uv_index.x += 1.0;
                        if p.uv_index.x >= template.grid_cols() as f32 {
                            p.uv_index.x = 0.0;
                            p.uv_index.y += 1.0;
                            if p.uv_index.y >= template.grid_rows() as f32 {
                                p.uv_index.y = 0.0;
                            }
                        }
                    }
                }
            }
        }
        self.bounds.expand(definition.max_size());
    }

    /// Run the per-template emission scheduler for this frame
    fn update_emission(&mut self, dt: f32, meshes: &mut dyn MeshFactory) {
        let definition = Arc::clone(&self.definition);
        for (ti, template) in definition.templates().iter().enumerate() {
            if template.start_after > self.cur_life {
                continue;
            }

            let count = {
                let runtime = &mut self.runtimes[ti];
                // Admission control: over the cap without recycling
                // permission, the accumulator is pinned at zero until the
                // population drops back under the cap.
                if runtime.alive > template.max_particles && !template.delete_when_full {
                    runtime.accumulator = 0.0;
                    continue;
                }
                runtime.accumulator += dt * template.emit_per_sec;
                let whole = runtime.accumulator.floor();
                runtime.accumulator -= whole;
                whole as u32
            };
            if count == 0 {
                continue;
            }

            let previous_pos = self.runtimes[ti].last_emit_pos;
            let mut newest_pos = None;
            for i in 0..count {
                let index = spawn_into(
                    &mut self.runtimes[ti],
                    template,
                    &self.transform,
                    self.color,
                    self.length,
                    &mut self.rng,
                    meshes,
                );
                // Spread the batch along the segment from the previous
                // batch's spawn position so trails stay continuous at low
                // frame rates.
                if let Some(last) = previous_pos {
                    let p = self.runtimes[ti].pool.slot_mut(index);
                    let to_new = p.position - last;
                    let len = to_new.length();
                    if len > 0.0 {
                        let dir = to_new * (1.0 / len);
                        p.position = last + dir * (len * ((i + 1) as f32 / count as f32));
                        p.world_position = if template.is_local_space() {
                            self.transform.apply_forward(p.position)
                        } else {
                            p.position
                        };
                        p.prev_position = p.world_position;
                    }
                }
                newest_pos = Some(self.runtimes[ti].pool.slot_mut(index).position);
            }

            if template.pos_interpolation {
                if let Some(pos) = newest_pos {
                    self.runtimes[ti].last_emit_pos = Some(pos);
                }
            }
        }
    }
}

/// Initialize one freshly claimed pool slot from a template
fn spawn_into(
    runtime: &mut TemplateRuntime,
    template: &ParticleTemplate,
    transform: &Transform,
    emitter_color: Color,
    length: f32,
    rng: &mut SmallRng,
    meshes: &mut dyn MeshFactory,
) -> usize {
    let (index, evicted_alive) = runtime.pool.emit();
    if evicted_alive {
        runtime.alive = runtime.alive.saturating_sub(1);
    }

    let forward = transform.forward();
    // Rotation carrying the authored default direction onto the emitter's
    // current forward, applied to the position offset and velocity cone.
    let angle = template.default_direction.angle_between(forward);
    let correction = (angle > MIN_CORRECTION_ANGLE)
        .then(|| Quat::rotation_between(template.default_direction, forward));

    let mut position = template.range.sample_offset(template.range_radius, rng);
    if !template.is_local_space() {
        position += transform.translation();
    }

    let mut pos_offset = template.pos_offset;
    if template.pos_offset != Vec3::ZERO && template.emit_to == EmitSpace::WorldSpace {
        if let Some(correction) = correction {
            pos_offset = correction.rotate_vec3(pos_offset);
        }
    }
    position += pos_offset;

    let mut velocity_dir =
        uniform_vec3(rng, template.velocity_dir_min, template.velocity_dir_max)
            .normalize_or(Vec3::UP);
    if let Some(correction) = correction {
        velocity_dir = correction.rotate_vec3(velocity_dir);
    }

    let velocity = uniform_range(rng, template.velocity_min_max);
    let life = if template.is_infinite_life() {
        LifeState::Infinite
    } else {
        LifeState::from_span(uniform_range(rng, template.life_min_max))
    };

    let uv_seconds_per_frame = match template.uv_anim_frames_per_sec {
        Some(fps) if fps != 0.0 => 1.0 / fps,
        // Unset rate: the sheet plays exactly once over this particle's
        // own sampled life (infinite lives fall back to 4 fps).
        _ if template.has_uv_anim() => match life {
            LifeState::Alive { span, .. } => span / template.uv_cells() as f32,
            LifeState::Infinite => 0.25,
            _ => 0.0,
        },
        _ => 0.0,
    };

    let size = uniform_range(rng, template.size_min_max);
    let ratio = uniform_range(rng, template.size_ratio_min_max);
    let mut size2 = Vec2::new(size * ratio, size);
    if length != 0.0 && template.align == ParticleAlign::Direction && size != 0.0 {
        size2.x *= length / size;
    }

    let scale_vel = uniform_range(rng, template.scale_vel_min_max);
    let scale_ratio = uniform_range(rng, template.scale_vel_ratio);

    let world_position = if template.is_local_space() {
        transform.apply_forward(position)
    } else {
        position
    };

    let p = runtime.pool.slot_mut(index);
    p.life = life;
    p.position = position;
    p.world_position = world_position;
    p.prev_position = world_position;
    p.velocity = velocity;
    p.velocity_dir = velocity_dir;
    (p.u_dir, p.v_dir) = match template.align {
        ParticleAlign::Billboard => (Vec3::X, -Vec3::Z),
        _ => (Vec3::Y, -Vec3::Z),
    };
    p.rotation = uniform_range(rng, template.rot_min_max);
    p.rotation_speed = uniform_range(rng, template.rot_speed_min_max);
    p.size = size2;
    p.scale_speed = Vec2::new(scale_vel * scale_ratio, scale_vel);
    p.alpha = if template.fade_in_out.x > 0.0 { 0.0 } else { 1.0 };
    p.intensity = uniform_range(rng, template.intensity_min_max);
    p.color = template.color * emitter_color;
    p.uv_index = Vec2::ZERO;
    p.uv_step = template.uv_step();
    p.uv_frame = 0.0;
    p.uv_seconds_per_frame = uv_seconds_per_frame;

    if let Some(path) = template.geometry.as_deref() {
        if p.mesh.is_none() {
            p.mesh = meshes.create(path);
        }
        if let Some(mesh) = p.mesh.as_mut() {
            mesh.attach_to_scene();
            mesh.set_position(world_position);
            mesh.set_direction(forward);
        }
    }

    if p.life.is_alive() {
        runtime.alive += 1;
    }
    index
}

/// Uniform sample from an authored `(min, max)` pair; tolerates reversed
/// or collapsed ranges
fn uniform_range<R: Rng>(rng: &mut R, range: Vec2) -> f32 {
    let (lo, hi) = if range.x <= range.y {
        (range.x, range.y)
    } else {
        (range.y, range.x)
    };
    if lo == hi {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

/// Uniform sample inside the axis-aligned box spanned by two corners
fn uniform_vec3<R: Rng>(rng: &mut R, min: Vec3, max: Vec3) -> Vec3 {
    Vec3::new(
        uniform_range(rng, Vec2::new(min.x, max.x)),
        uniform_range(rng, Vec2::new(min.y, max.y)),
        uniform_range(rng, Vec2::new(min.z, max.z)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{CameraView, RenderTarget, RenderTargets};
    use crate::scene::MeshObject;
    use crate::template::{EmitRange, INFINITE_LIFE};

    struct NullCamera;

    impl CameraView for NullCamera {
        fn is_culled(&self, _bounds: &Aabb) -> bool {
            false
        }
        fn view_rotation(&self) -> Quat {
            Quat::IDENTITY
        }
        fn forward(&self) -> Vec3 {
            Vec3::FORWARD
        }
        fn position(&self) -> Vec3 {
            Vec3::ZERO
        }
    }

    struct NullTargets;

    impl RenderTargets for NullTargets {
        fn target(&mut self, _texture: &str) -> Option<&mut dyn RenderTarget> {
            None
        }
    }

    struct NoMeshes;

    impl MeshFactory for NoMeshes {
        fn create(&mut self, _path: &str) -> Option<Box<dyn MeshObject>> {
            None
        }
    }

    #[derive(Default)]
    struct CountingRegistry {
        adds: usize,
        removes: usize,
    }

    impl EmitterRegistry for CountingRegistry {
        fn add_active(&mut self, _emitter: InstanceId) {
            self.adds += 1;
        }
        fn remove_active(&mut self, _emitter: InstanceId) {
            self.removes += 1;
        }
    }

    fn template() -> ParticleTemplate {
        ParticleTemplate {
            texture: Some("fx/test.dds".into()),
            max_particles: 100,
            ..Default::default()
        }
    }

    fn emitter_with(templates: Vec<ParticleTemplate>, life_time: f32) -> ParticleEmitter {
        let def = Arc::new(EmitterDefinition::new(1, life_time, false, templates).unwrap());
        let mut emitter = def.instantiate();
        emitter.reseed(42);
        emitter
    }

    fn tick(emitter: &mut ParticleEmitter, dt: f32) -> bool {
        let camera = NullCamera;
        let mut targets = NullTargets;
        let mut meshes = NoMeshes;
        let mut ctx = FrameContext {
            camera: &camera,
            targets: &mut targets,
            meshes: &mut meshes,
        };
        emitter.update(dt, &mut ctx)
    }

    #[test]
    fn test_instantiate_provisioning() {
        let t1 = ParticleTemplate {
            max_particles: 10,
            initial_particles: 3,
            ..template()
        };
        let t2 = ParticleTemplate {
            max_particles: 10,
            ..template()
        };
        let emitter = emitter_with(vec![t1, t2], INFINITE_LIFE);

        assert_eq!(emitter.runtimes.len(), 2);
        assert_eq!(emitter.pool(0).unwrap().capacity(), 20);
        assert_eq!(emitter.pool(1).unwrap().capacity(), 20);
        assert_eq!(emitter.total_alive(), 0);
        assert_eq!(emitter.runtimes[0].accumulator, 3.0);
        assert_eq!(emitter.runtimes[1].accumulator, 0.0);
    }

    #[test]
    fn test_steady_state_emission() {
        // 10/s at dt=0.1 with one-second lives: 10 alive after 10 ticks,
        // still 10 after 20 (deaths balance spawns).
        let t = ParticleTemplate {
            emit_per_sec: 10.0,
            delete_when_full: true,
            life_min_max: Vec2::ONE,
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        for _ in 0..10 {
            assert!(tick(&mut emitter, 0.1));
        }
        assert_eq!(emitter.alive_particles(0), 10);

        for _ in 0..10 {
            tick(&mut emitter, 0.1);
        }
        assert_eq!(emitter.alive_particles(0), 10);
    }

    #[test]
    fn test_emission_rate_is_exact_over_time() {
        // Fractional rates carry over with zero drift: total spawned after
        // N ticks is floor(N * dt * rate) within one particle.
        let t = ParticleTemplate {
            emit_per_sec: 3.0,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        let mut expected_checks = 0;
        for n in 1..=50u32 {
            tick(&mut emitter, 0.1);
            let expected = (n as f32 * 0.1 * 3.0).floor() as i64;
            let actual = emitter.alive_particles(0) as i64;
            assert!(
                (actual - expected).abs() <= 1,
                "tick {n}: spawned {actual}, expected ~{expected}"
            );
            expected_checks += 1;
        }
        assert_eq!(expected_checks, 50);
    }

    #[test]
    fn test_backpressure_pins_accumulator() {
        // Over the cap without recycling permission, emission freezes.
        let t = ParticleTemplate {
            emit_per_sec: 100.0,
            max_particles: 5,
            delete_when_full: false,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.1);
        let after_first = emitter.alive_particles(0);
        assert_eq!(after_first, 10, "first tick spawns before the cap bites");

        for _ in 0..20 {
            tick(&mut emitter, 0.1);
        }
        assert_eq!(emitter.alive_particles(0), after_first);
        assert_eq!(emitter.runtimes[0].accumulator, 0.0);
    }

    #[test]
    fn test_full_pool_recycles_when_allowed() {
        // delete_when_full keeps emitting by evicting the oldest; the
        // population settles at pool capacity (twice the declared max).
        let t = ParticleTemplate {
            emit_per_sec: 10.0,
            max_particles: 2,
            delete_when_full: true,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        for _ in 0..10 {
            tick(&mut emitter, 0.1);
        }
        assert_eq!(emitter.alive_particles(0), 4);
        assert_eq!(emitter.pool(0).unwrap().len(), 4);
    }

    #[test]
    fn test_particle_expires_exactly_at_span() {
        let t = ParticleTemplate {
            initial_particles: 1,
            life_min_max: Vec2::ONE,
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.4); // spawns
        assert_eq!(emitter.alive_particles(0), 1);
        tick(&mut emitter, 0.5); // age 0.5
        assert_eq!(emitter.alive_particles(0), 1);
        tick(&mut emitter, 0.5); // age 1.0 >= 1.0
        assert_eq!(emitter.alive_particles(0), 0);
    }

    #[test]
    fn test_graceful_stop_expires_infinite_particles() {
        let t = ParticleTemplate {
            initial_particles: 4,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);
        let mut registry = CountingRegistry::default();
        emitter.activate(&mut registry);

        tick(&mut emitter, 0.1);
        assert_eq!(emitter.alive_particles(0), 4);

        emitter.stop();
        // Infinite particles are force-expired; nothing remains alive, so
        // the emitter reports dead on the very next tick.
        assert!(!tick(&mut emitter, 0.1));
        assert!(!emitter.is_alive());
        assert_eq!(emitter.alive_particles(0), 0);
    }

    #[test]
    fn test_graceful_stop_lets_finite_particles_fade() {
        let t = ParticleTemplate {
            initial_particles: 2,
            life_min_max: Vec2::ONE,
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.1);
        emitter.stop();

        // Still alive while the finite particles run out their spans
        assert!(tick(&mut emitter, 0.5));
        assert_eq!(emitter.alive_particles(0), 2);
        // age reaches 1.0 here; the following tick sees nothing alive
        assert!(tick(&mut emitter, 0.5));
        assert!(!tick(&mut emitter, 0.1));
    }

    #[test]
    fn test_stop_immediate_kills_next_tick() {
        let t = ParticleTemplate {
            initial_particles: 8,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.1);
        assert_eq!(emitter.alive_particles(0), 8);

        emitter.stop_immediate();
        assert!(!tick(&mut emitter, 0.1));
        assert!(!emitter.is_alive());
        assert_eq!(emitter.total_alive(), 0);
    }

    #[test]
    fn test_emitter_life_expiry() {
        let t = ParticleTemplate {
            emit_per_sec: 0.0,
            ..template()
        };
        let mut emitter = emitter_with(vec![t], 0.5);

        assert!(tick(&mut emitter, 0.2));
        assert!(tick(&mut emitter, 0.2));
        // 0.6 > 0.5 and nothing is alive
        assert!(!tick(&mut emitter, 0.2));
    }

    #[test]
    fn test_start_after_delays_emission() {
        let t = ParticleTemplate {
            emit_per_sec: 10.0,
            start_after: 1.0,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        for _ in 0..9 {
            tick(&mut emitter, 0.1);
        }
        assert_eq!(emitter.alive_particles(0), 0);

        tick(&mut emitter, 0.1); // cur_life reaches 1.0; gate opens
        assert_eq!(emitter.alive_particles(0), 1);
    }

    #[test]
    fn test_initial_particles_burst() {
        let t = ParticleTemplate {
            initial_particles: 5,
            emit_per_sec: 0.0,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.016);
        assert_eq!(emitter.alive_particles(0), 5);
        tick(&mut emitter, 0.016);
        assert_eq!(emitter.alive_particles(0), 5);
    }

    #[test]
    fn test_bounds_enclose_particles() {
        let t = ParticleTemplate {
            initial_particles: 1,
            emit_to: EmitSpace::WorldSpace,
            range: EmitRange::Point,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            size_min_max: Vec2::new(2.0, 2.0),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);
        emitter.set_transform(Transform::at(Vec3::new(5.0, 0.0, 0.0)));

        tick(&mut emitter, 0.1); // spawn happens after the bound rebuild
        tick(&mut emitter, 0.1); // now the bound sees the particle

        let bounds = *emitter.bounds();
        assert!(!bounds.is_empty());
        // Both side extrema (pivot 0.5, size.x = 2, forward = -Z), plus the
        // max-size margin of 2
        assert!(bounds.contains_point(Vec3::new(5.0, 0.0, -1.0)));
        assert!(bounds.contains_point(Vec3::new(5.0, 0.0, 1.0)));
        assert!(bounds.contains_point(Vec3::new(7.0, 2.0, 3.0)));
        assert!(!bounds.contains_point(Vec3::new(20.0, 0.0, 0.0)));
    }

    #[test]
    fn test_position_interpolation_spreads_batches() {
        let t = ParticleTemplate {
            emit_per_sec: 20.0,
            pos_interpolation: true,
            emit_to: EmitSpace::WorldSpace,
            range: EmitRange::Point,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        emitter.set_transform(Transform::at(Vec3::ZERO));
        tick(&mut emitter, 0.1); // first batch of 2 at the origin

        emitter.set_transform(Transform::at(Vec3::new(10.0, 0.0, 0.0)));
        tick(&mut emitter, 0.1); // second batch spread toward x=10

        let pool = emitter.pool(0).unwrap();
        let xs: Vec<f32> = pool.iter().map(|p| p.position.x).collect();
        assert_eq!(xs.len(), 4);
        assert_eq!(&xs[..2], &[0.0, 0.0]);
        assert!((xs[2] - 5.0).abs() < 1e-4, "mid-batch particle at {}", xs[2]);
        assert!((xs[3] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_activation_guards_registry() {
        let t = template();
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);
        let mut registry = CountingRegistry::default();

        emitter.activate(&mut registry);
        emitter.activate(&mut registry);
        assert_eq!(registry.adds, 1);

        emitter.deactivate(&mut registry);
        emitter.deactivate(&mut registry);
        assert_eq!(registry.removes, 1);
    }

    #[test]
    fn test_activate_reloads_accumulators() {
        let t = ParticleTemplate {
            initial_particles: 7,
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);
        let mut registry = CountingRegistry::default();

        emitter.runtimes[0].accumulator = 0.0;
        emitter.stop();
        emitter.activate(&mut registry);
        assert_eq!(emitter.runtimes[0].accumulator, 7.0);
        assert!(emitter.is_alive());
    }

    #[test]
    fn test_manual_emission_surface() {
        let t = ParticleTemplate {
            max_particles: 4,
            ..template()
        };
        let def = Arc::new(EmitterDefinition::new(9, INFINITE_LIFE, true, vec![t]).unwrap());
        let mut emitter = def.instantiate();
        let mut meshes = NoMeshes;

        let slot = emitter.emit_by_index(0, &mut meshes).unwrap();
        assert_eq!(slot, 0);
        assert!(emitter.particle_mut(0, 0).is_ok());

        assert!(matches!(
            emitter.emit_by_index(3, &mut meshes),
            Err(ParticleError::InvalidTemplateIndex { index: 3, count: 1 })
        ));
        assert!(matches!(
            emitter.particle_mut(0, 99),
            Err(ParticleError::InvalidParticleIndex { .. })
        ));
    }

    #[test]
    fn test_manual_access_requires_manual_emitter() {
        let mut emitter = emitter_with(vec![template()], INFINITE_LIFE);
        assert!(matches!(
            emitter.particle_mut(0, 0),
            Err(ParticleError::NotManualEmitter(1))
        ));
    }

    #[test]
    fn test_set_buffer_size() {
        let t = ParticleTemplate {
            initial_particles: 3,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);
        tick(&mut emitter, 0.1);
        assert_eq!(emitter.alive_particles(0), 3);

        emitter.set_buffer_size(8);
        assert_eq!(emitter.pool(0).unwrap().capacity(), 8);
        assert_eq!(emitter.alive_particles(0), 0);
    }

    #[test]
    fn test_set_length_rescales_direction_aligned() {
        let t = ParticleTemplate {
            initial_particles: 2,
            align: ParticleAlign::Direction,
            size_min_max: Vec2::new(2.0, 2.0),
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);
        tick(&mut emitter, 0.1);

        emitter.set_length(6.0);
        for p in emitter.pool(0).unwrap().iter() {
            assert!((p.size.x - 6.0).abs() < 1e-4, "x stretched to the beam length");
            assert!((p.size.y - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_velocity_moves_particles() {
        let t = ParticleTemplate {
            initial_particles: 1,
            emit_to: EmitSpace::WorldSpace,
            velocity_min_max: Vec2::new(2.0, 2.0),
            velocity_dir_min: Vec3::X,
            velocity_dir_max: Vec3::X,
            // Keep the default-direction correction out of the picture
            default_direction: Vec3::FORWARD,
            life_min_max: Vec2::new(INFINITE_LIFE, INFINITE_LIFE),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.1); // spawn
        tick(&mut emitter, 0.5); // moves 2 * 0.5 = 1 along +X

        let pool = emitter.pool(0).unwrap();
        let p = pool.get(0).unwrap();
        assert!((p.world_position.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_fade_and_color_over_life() {
        let t = ParticleTemplate {
            initial_particles: 1,
            life_min_max: Vec2::new(2.0, 2.0),
            fade_in_out: Vec2::new(0.25, 0.75),
            color: Color::rgb(1.0, 0.0, 0.0),
            color_end: Some(Color::rgb(0.0, 0.0, 1.0)),
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.1); // spawn
        tick(&mut emitter, 0.25); // age 0.25, normalized 0.125 -> fading in
        {
            let p = emitter.pool(0).unwrap().get(0).unwrap();
            assert!((p.alpha - 0.5).abs() < 1e-4);
        }

        tick(&mut emitter, 0.75); // age 1.0, normalized 0.5 -> opaque, half-mixed
        {
            let p = emitter.pool(0).unwrap().get(0).unwrap();
            assert!((p.alpha - 1.0).abs() < 1e-4);
            assert!((p.color.r - 0.5).abs() < 1e-4);
            assert!((p.color.b - 0.5).abs() < 1e-4);
        }

        tick(&mut emitter, 0.8); // age 1.8, normalized 0.9 -> fading out
        {
            let p = emitter.pool(0).unwrap().get(0).unwrap();
            assert!((p.alpha - 0.4).abs() < 1e-3);
        }
    }

    #[test]
    fn test_uv_animation_derived_from_life() {
        // 2x2 sheet over a 1s life plays each cell for 0.25s
        let t = ParticleTemplate {
            initial_particles: 1,
            life_min_max: Vec2::ONE,
            uv_anim_col_row: [2, 2],
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        tick(&mut emitter, 0.1); // spawn
        {
            let p = emitter.pool(0).unwrap().get(0).unwrap();
            assert!((p.uv_seconds_per_frame - 0.25).abs() < 1e-5);
            assert_eq!(p.uv_step, Vec2::splat(0.5));
        }

        tick(&mut emitter, 0.3); // frame accumulator 0.3 > 0.25 -> advance
        {
            let p = emitter.pool(0).unwrap().get(0).unwrap();
            assert_eq!(p.uv_index, Vec2::new(1.0, 0.0));
        }

        tick(&mut emitter, 0.25);
        {
            let p = emitter.pool(0).unwrap().get(0).unwrap();
            assert_eq!(p.uv_index, Vec2::new(0.0, 1.0), "wraps to the next row");
        }
    }

    #[test]
    fn test_zero_rate_and_zero_life_guards() {
        // Degenerate authoring must not emit, divide by zero, or spin
        let t = ParticleTemplate {
            emit_per_sec: 0.0,
            life_min_max: Vec2::ZERO,
            initial_particles: 2,
            uv_anim_col_row: [4, 4],
            ..template()
        };
        let mut emitter = emitter_with(vec![t], INFINITE_LIFE);

        for _ in 0..5 {
            tick(&mut emitter, 0.1);
        }
        // Zero-span particles spawn dead
        assert_eq!(emitter.alive_particles(0), 0);
    }
}
