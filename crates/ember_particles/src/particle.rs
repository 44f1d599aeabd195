//! Individual particle runtime state

use crate::scene::MeshObject;
use crate::template::INFINITE_LIFE;
use ember_core::{Color, Vec2, Vec3};

/// Lifecycle state of one pool slot
///
/// Replaces the legacy sentinel encoding (`-1` infinite, `0` dead, `-2`
/// already swept) with explicit states. A slot is *alive* iff it is
/// `Alive` or `Infinite`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum LifeState {
    /// Free slot, available for recycling
    #[default]
    Dead,
    /// Never self-expires; force-expired when the emitter stops gracefully
    Infinite,
    /// Expires once `age` reaches `span`
    Alive {
        /// Seconds lived so far
        age: f32,
        /// Total seconds to live
        span: f32,
    },
    /// Dead and already handled by an immediate-stop sweep; skipped by
    /// every later pass over the pool
    Swept,
}

impl LifeState {
    /// Build the state for a freshly sampled life span
    ///
    /// The authored `-1` sentinel maps to `Infinite`; a non-positive span
    /// is degenerate and spawns the particle already dead.
    pub fn from_span(span: f32) -> Self {
        if span == INFINITE_LIFE {
            LifeState::Infinite
        } else if span <= 0.0 {
            LifeState::Dead
        } else {
            LifeState::Alive { age: 0.0, span }
        }
    }

    /// Whether the slot holds a living particle
    pub fn is_alive(&self) -> bool {
        matches!(self, LifeState::Alive { .. } | LifeState::Infinite)
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, LifeState::Infinite)
    }

    /// Age as a fraction of the life span, in [0, 1)
    ///
    /// `None` for infinite particles, whose normalized age is undefined.
    pub fn normalized_age(&self) -> Option<f32> {
        match self {
            LifeState::Alive { age, span } => Some(age / span),
            _ => None,
        }
    }

    /// Seconds lived; infinite particles do not accumulate age
    pub fn age(&self) -> f32 {
        match self {
            LifeState::Alive { age, .. } => *age,
            _ => 0.0,
        }
    }
}

/// One slot in a particle pool
///
/// Plain mutable state; all behavior lives in the emitter's integration
/// step. The optional mesh handle is only set for geometry-mode particles
/// and survives slot recycling so the mesh instance is created at most
/// once per slot.
#[derive(Default)]
pub struct Particle {
    /// Lifecycle state
    pub life: LifeState,
    /// Position in the template's simulation space
    pub position: Vec3,
    /// World-space position derived each frame
    pub world_position: Vec3,
    /// World-space position of the previous frame, for motion stretch
    pub prev_position: Vec3,
    /// Speed along `velocity_dir`, units per second
    pub velocity: f32,
    /// Unit travel direction
    pub velocity_dir: Vec3,
    /// Quad U basis direction
    pub u_dir: Vec3,
    /// Quad V basis direction
    pub v_dir: Vec3,
    /// Quad roll, radians
    pub rotation: f32,
    /// Roll speed, radians per second
    pub rotation_speed: f32,
    /// Current quad size
    pub size: Vec2,
    /// Size change per second, separate x/y rates
    pub scale_speed: Vec2,
    /// Fade alpha in [0, 1]
    pub alpha: f32,
    /// Shader intensity
    pub intensity: f32,
    /// Current color, interpolated over life and tinted by the emitter
    pub color: Color,
    /// Current UV cell as (column, row)
    pub uv_index: Vec2,
    /// Per-cell UV extent
    pub uv_step: Vec2,
    /// Sub-frame accumulator for UV animation
    pub uv_frame: f32,
    /// Seconds per UV frame; non-positive disables UV animation
    pub uv_seconds_per_frame: f32,
    /// Scene mesh for geometry-mode particles
    pub mesh: Option<Box<dyn MeshObject>>,
}

impl Particle {
    /// Mark the particle dead and pull its mesh out of the scene
    pub fn kill(&mut self) {
        self.life = LifeState::Dead;
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.detach_from_scene();
        }
    }

    /// Mark the particle handled by an immediate-stop sweep
    pub fn sweep(&mut self) {
        self.life = LifeState::Swept;
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.detach_from_scene();
        }
    }

    /// Reset the slot for reuse, detaching but keeping any mesh instance
    pub fn reset(&mut self) {
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.detach_from_scene();
        }
        let mesh = self.mesh.take();
        *self = Particle {
            mesh,
            ..Default::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct ProbeMesh {
        attached: Rc<Cell<bool>>,
    }

    impl MeshObject for ProbeMesh {
        fn attach_to_scene(&mut self) {
            self.attached.set(true);
        }
        fn detach_from_scene(&mut self) {
            self.attached.set(false);
        }
        fn set_position(&mut self, _position: Vec3) {}
        fn set_direction(&mut self, _direction: Vec3) {}
    }

    #[test]
    fn test_life_state_from_span() {
        assert!(matches!(
            LifeState::from_span(2.0),
            LifeState::Alive { span, .. } if span == 2.0
        ));
        assert_eq!(LifeState::from_span(INFINITE_LIFE), LifeState::Infinite);
        assert_eq!(LifeState::from_span(0.0), LifeState::Dead);
        assert_eq!(LifeState::from_span(-0.5), LifeState::Dead);
    }

    #[test]
    fn test_alive_predicate() {
        assert!(LifeState::Infinite.is_alive());
        assert!(LifeState::Alive { age: 0.0, span: 1.0 }.is_alive());
        assert!(!LifeState::Dead.is_alive());
        assert!(!LifeState::Swept.is_alive());
    }

    #[test]
    fn test_normalized_age() {
        let state = LifeState::Alive { age: 0.5, span: 2.0 };
        assert!((state.normalized_age().unwrap() - 0.25).abs() < 1e-6);
        assert!(LifeState::Infinite.normalized_age().is_none());
        assert!(LifeState::Dead.normalized_age().is_none());
    }

    #[test]
    fn test_reset_keeps_mesh() {
        let attached = Rc::new(Cell::new(true));
        let mut p = Particle {
            life: LifeState::Infinite,
            velocity: 3.0,
            mesh: Some(Box::new(ProbeMesh {
                attached: attached.clone(),
            })),
            ..Default::default()
        };

        p.reset();
        assert_eq!(p.life, LifeState::Dead);
        assert_eq!(p.velocity, 0.0);
        assert!(p.mesh.is_some(), "mesh instance must survive recycling");
        assert!(!attached.get(), "mesh must be detached on recycle");
    }

    #[test]
    fn test_kill_detaches_mesh() {
        let attached = Rc::new(Cell::new(true));
        let mut p = Particle {
            life: LifeState::Alive { age: 0.0, span: 1.0 },
            mesh: Some(Box::new(ProbeMesh {
                attached: attached.clone(),
            })),
            ..Default::default()
        };
        p.kill();
        assert!(!attached.get());
        assert_eq!(p.life, LifeState::Dead);
    }
}
