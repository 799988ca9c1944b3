//! Emitters and impulse sources applied before every solver step.

use glam::Vec3;
use smoke_kernel::{BackendError, FluidSolver};

use crate::config::{EmitMode, EmitterConfig, ImpulseConfig};

/// The fluid and velocity sources of a run.
#[derive(Debug, Clone, Default)]
pub struct SourceSchedule {
    emitters: Vec<EmitterConfig>,
    impulses: Vec<ImpulseConfig>,
}

impl SourceSchedule {
    /// Build a schedule from validated config entries.
    pub fn new(emitters: Vec<EmitterConfig>, impulses: Vec<ImpulseConfig>) -> Self {
        Self { emitters, impulses }
    }

    /// True when nothing is ever injected.
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty() && self.impulses.is_empty()
    }

    /// Inject every source at simulated time `t`.
    pub fn apply(&self, solver: &mut FluidSolver, t: f64) -> Result<(), BackendError> {
        for emitter in &self.emitters {
            let pos = emitter_position(emitter, t);
            match emitter.mode {
                EmitMode::Set => solver.set_fluid(pos, emitter.density, emitter.temperature)?,
                EmitMode::Add => solver.add_fluid(pos, emitter.density, emitter.temperature)?,
            }
        }
        for impulse in &self.impulses {
            solver.apply_impulse(Vec3::from(impulse.position), Vec3::from(impulse.impulse))?;
        }
        Ok(())
    }
}

/// Where `emitter` sits at simulated time `t`.
pub fn emitter_position(emitter: &EmitterConfig, t: f64) -> Vec3 {
    let mut pos = Vec3::from(emitter.position);
    if let Some(sweep) = emitter.sweep {
        let phase = std::f64::consts::TAU * sweep.frequency as f64 * t;
        pos.x += sweep.amplitude * phase.sin() as f32;
    }
    pos
}
