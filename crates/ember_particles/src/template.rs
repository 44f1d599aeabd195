//! Declarative particle templates
//!
//! A [`ParticleTemplate`] is one fully-resolved, immutable description of a
//! class of particle: how often it spawns, where, how it moves and how it
//! looks over its life. Templates are authored externally (any serde
//! format); the engine only consumes the resulting records.

use crate::error::{ParticleError, Result};
use ember_core::{Color, Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Authored lifetime value meaning "never expires"
pub const INFINITE_LIFE: f32 = -1.0;

/// How a particle's pixels combine with the frame buffer
///
/// Recorded for the render backend; the simulation itself never branches
/// on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    /// Source added onto destination
    #[default]
    Additive,
    /// Classic source-alpha blending
    AlphaBlend,
    /// Inverse destination color blending
    InvColorBlend,
    /// Pre-multiplied replace
    Replace,
}

/// How a particle quad is oriented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleAlign {
    /// Always faces the camera
    #[default]
    Billboard,
    /// Aligned to the emitter's forward direction
    Direction,
}

/// Coordinate space particles simulate in after spawning
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitSpace {
    /// Particles follow the emitter transform
    #[default]
    Local,
    /// Particles are released into world space at spawn
    WorldSpace,
}

/// Spatial region new particles sample their spawn position from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitRange {
    /// Exactly at the emitter origin
    #[default]
    Point,
    /// Uniform inside an axis-aligned cube of half-extent `radius`
    Box,
    /// Inside a sphere, sampled in spherical coordinates
    Sphere,
    /// Upper half of the sphere parameterization
    Hemisphere,
    /// 45-degree cone, apex at the origin, opening along +Z
    Cone,
}

impl EmitRange {
    /// Sample a spawn offset in emitter-local coordinates
    pub fn sample_offset<R: Rng>(&self, radius: f32, rng: &mut R) -> Vec3 {
        if *self == EmitRange::Point || radius <= 0.0 {
            return Vec3::ZERO;
        }
        match self {
            EmitRange::Point => Vec3::ZERO,

            EmitRange::Box => Vec3::new(
                rng.gen_range(-radius..=radius),
                rng.gen_range(-radius..=radius),
                rng.gen_range(-radius..=radius),
            ),

            EmitRange::Sphere => {
                let r = rng.gen_range(0.0..=radius);
                let theta = rng.gen_range(0.0..=std::f32::consts::PI);
                let phi = rng.gen_range(0.0..=std::f32::consts::TAU);
                Vec3::new(
                    r * theta.sin() * phi.cos(),
                    r * theta.sin() * phi.sin(),
                    r * theta.cos(),
                )
            }

            EmitRange::Hemisphere => {
                let r = rng.gen_range(0.0..=radius);
                let theta = rng.gen_range(0.0..=std::f32::consts::FRAC_PI_2);
                let phi = rng.gen_range(0.0..=std::f32::consts::TAU);
                Vec3::new(
                    r * theta.sin() * phi.cos(),
                    r * theta.sin() * phi.sin(),
                    r * theta.cos(),
                )
            }

            EmitRange::Cone => {
                // Cross-section radius equals height (45-degree half-angle)
                let height = rng.gen_range(0.0..=radius);
                let ang = rng.gen_range(0.0..=std::f32::consts::TAU);
                let rad = height * rng.gen::<f32>().sqrt();
                Vec3::new(rad * ang.cos(), rad * ang.sin(), height)
            }
        }
    }
}

/// A `(value, normalized-time threshold)` pair driving acceleration or
/// deceleration of a per-particle rate
///
/// Acceleration ramps apply `value` per second while normalized age is
/// below `threshold`; deceleration ramps apply it while above.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ramp {
    /// Units per second applied to the rate
    pub value: f32,
    /// Normalized-age threshold in [0, 1]
    pub threshold: f32,
}

impl Ramp {
    pub const fn new(value: f32, threshold: f32) -> Self {
        Self { value, threshold }
    }
}

/// Immutable configuration for one class of particle
///
/// All fields are authoring data; unset attributes default to zero/false
/// except where zero is degenerate (UV grid, life range, fade window,
/// ratios, intensity, pivot, directions), see [`Default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleTemplate {
    /// Texture sheet for quad particles (mutually exclusive with `geometry`)
    pub texture: Option<String>,
    /// Mesh resource for geometry particles (mutually exclusive with `texture`)
    pub geometry: Option<String>,
    /// Blend mode recorded for the render backend
    pub blend_mode: BlendMode,
    /// Quad orientation mode
    pub align: ParticleAlign,
    /// Render the quad from both sides
    pub double_sided: bool,
    /// Render a second quad perpendicular to the first
    pub cross: bool,

    /// Seconds after emitter activation before this template starts emitting
    pub start_after: f32,
    /// Steady-state emission rate, particles per second
    pub emit_per_sec: f32,
    /// Particles pre-loaded into the emission accumulator on activation
    pub initial_particles: u32,
    /// Soft cap on alive particles; pools are provisioned at twice this
    pub max_particles: u32,
    /// When full: keep emitting and recycle the oldest (true), or pause
    /// emission until the population drops (false)
    pub delete_when_full: bool,
    /// Particle life span range in seconds; `-1` means infinite
    pub life_min_max: Vec2,

    /// Spawn region shape
    pub range: EmitRange,
    /// Spawn region radius / half-extent
    pub range_radius: f32,
    /// Simulation space after spawn
    pub emit_to: EmitSpace,
    /// Authored reference direction the emitter's forward is matched against
    pub default_direction: Vec3,
    /// Offset added to every spawn position
    pub pos_offset: Vec3,
    /// Spread each frame's batch between the previous and current spawn
    /// positions to form continuous trails
    pub pos_interpolation: bool,

    /// Speed range, units per second
    pub velocity_min_max: Vec2,
    /// Lower corner of the velocity-direction sampling cone
    pub velocity_dir_min: Vec3,
    /// Upper corner of the velocity-direction sampling cone
    pub velocity_dir_max: Vec3,
    /// Speed gain while young
    pub accel: Ramp,
    /// Speed loss while old
    pub decel: Ramp,

    /// Initial rotation range, radians
    pub rot_min_max: Vec2,
    /// Rotation speed range, radians per second
    pub rot_speed_min_max: Vec2,
    /// Spin gain while young
    pub rot_accel: Ramp,
    /// Spin loss while old
    pub rot_decel: Ramp,

    /// Size growth speed range, units per second
    pub scale_vel_min_max: Vec2,
    /// x/y asymmetry of the growth speed
    pub scale_vel_ratio: Vec2,
    /// Growth gain while young
    pub scale_accel: Ramp,
    /// Growth loss while old
    pub scale_decel: Ramp,

    /// Base size range
    pub size_min_max: Vec2,
    /// x/y asymmetry of the base size
    pub size_ratio_min_max: Vec2,
    /// Quad anchor in [0, 1] per axis
    pub pivot: Vec2,
    /// Motion stretch cap; zero disables stretching
    pub stretch_max: f32,

    /// Normalized-age fade window: opaque between `x` (fade-in end) and
    /// `y` (fade-out start)
    pub fade_in_out: Vec2,
    /// Start color, tinted by the emitter color at spawn
    pub color: Color,
    /// End color; when absent the start color is held for the whole life
    pub color_end: Option<Color>,
    /// Shader intensity range
    pub intensity_min_max: Vec2,

    /// UV sheet grid as columns x rows; `[1, 1]` disables UV animation
    pub uv_anim_col_row: [u32; 2],
    /// Explicit UV animation rate; when absent and the grid has more than
    /// one cell, the sheet plays exactly once over each particle's life
    pub uv_anim_frames_per_sec: Option<f32>,
    /// Continuous per-second UV drift
    pub uv_flow: Vec2,
}

impl Default for ParticleTemplate {
    fn default() -> Self {
        Self {
            texture: None,
            geometry: None,
            blend_mode: BlendMode::default(),
            align: ParticleAlign::default(),
            double_sided: false,
            cross: false,
            start_after: 0.0,
            emit_per_sec: 0.0,
            initial_particles: 0,
            max_particles: 0,
            delete_when_full: false,
            life_min_max: Vec2::ONE,
            range: EmitRange::default(),
            range_radius: 0.0,
            emit_to: EmitSpace::default(),
            default_direction: Vec3::UP,
            pos_offset: Vec3::ZERO,
            pos_interpolation: false,
            velocity_min_max: Vec2::ZERO,
            velocity_dir_min: Vec3::UP,
            velocity_dir_max: Vec3::UP,
            accel: Ramp::default(),
            decel: Ramp::default(),
            rot_min_max: Vec2::ZERO,
            rot_speed_min_max: Vec2::ZERO,
            rot_accel: Ramp::default(),
            rot_decel: Ramp::default(),
            scale_vel_min_max: Vec2::ZERO,
            scale_vel_ratio: Vec2::ONE,
            scale_accel: Ramp::default(),
            scale_decel: Ramp::default(),
            size_min_max: Vec2::ZERO,
            size_ratio_min_max: Vec2::ONE,
            pivot: Vec2::splat(0.5),
            stretch_max: 0.0,
            fade_in_out: Vec2::new(0.0, 1.0),
            color: Color::WHITE,
            color_end: None,
            intensity_min_max: Vec2::ONE,
            uv_anim_col_row: [1, 1],
            uv_anim_frames_per_sec: None,
            uv_flow: Vec2::ZERO,
        }
    }
}

impl ParticleTemplate {
    /// Whether particles simulate in the emitter's local space
    pub fn is_local_space(&self) -> bool {
        self.emit_to == EmitSpace::Local
    }

    /// Whether this template spawns particles that never expire
    pub fn is_infinite_life(&self) -> bool {
        self.life_min_max.x == INFINITE_LIFE || self.life_min_max.y == INFINITE_LIFE
    }

    /// UV grid columns, never below one
    pub fn grid_cols(&self) -> u32 {
        self.uv_anim_col_row[0].max(1)
    }

    /// UV grid rows, never below one
    pub fn grid_rows(&self) -> u32 {
        self.uv_anim_col_row[1].max(1)
    }

    /// Total UV cells in the sheet
    pub fn uv_cells(&self) -> u32 {
        self.grid_cols() * self.grid_rows()
    }

    /// Whether the UV sheet animates at all
    pub fn has_uv_anim(&self) -> bool {
        self.uv_cells() > 1
    }

    /// Per-cell UV extent
    pub fn uv_step(&self) -> Vec2 {
        Vec2::new(1.0 / self.grid_cols() as f32, 1.0 / self.grid_rows() as f32)
    }

    /// Effective end color (start color when no end color is authored)
    pub fn end_color(&self) -> Color {
        self.color_end.unwrap_or(self.color)
    }

    /// Largest extent a particle of this template can reach at spawn,
    /// used for the emitter-wide conservative bound margin
    pub fn max_extent(&self) -> f32 {
        let max_ratio = self.size_ratio_min_max.x.max(self.size_ratio_min_max.y);
        (self.size_min_max.x * max_ratio).max(self.size_min_max.y)
    }

    /// Check the record's invariants
    ///
    /// A template must name exactly one visual (texture or geometry) and a
    /// non-zero particle cap.
    pub fn validate(&self) -> Result<()> {
        match (&self.texture, &self.geometry) {
            (Some(_), Some(_)) => {
                return Err(ParticleError::InvalidTemplate(
                    "texture and geometry are mutually exclusive".into(),
                ))
            }
            (None, None) => {
                return Err(ParticleError::InvalidTemplate(
                    "template needs either a texture or a geometry".into(),
                ))
            }
            _ => {}
        }
        if self.max_particles == 0 {
            return Err(ParticleError::InvalidTemplate(
                "max_particles must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
