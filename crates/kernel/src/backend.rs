//! The seam between the solver and the device that runs its kernels.
//!
//! A [`ComputeBackend`] owns device memory and executes [`Kernel`] dispatches.
//! The solver only ever holds [`BufferHandle`]s; it never sees device memory
//! directly.

use glam::Vec3;

use crate::error::BackendError;
use crate::grid::{ElementKind, FluidState};
use crate::params::FluidParams;
use crate::runner::WorkShape;

/// Opaque reference to a buffer owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u32);

impl BufferHandle {
    /// Slot index inside the owning backend.
    #[inline]
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Size and layout of a backend buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label.
    pub label: String,
    /// Number of grid cells covered.
    pub elements: usize,
    /// f32 channels per cell.
    pub channels: usize,
}

impl BufferDesc {
    /// Describe a buffer of `elements` cells with `channels` floats each.
    pub fn new(label: impl Into<String>, elements: usize, channels: usize) -> Self {
        Self { label: label.into(), elements, channels }
    }

    /// Total number of f32 values.
    #[inline]
    pub fn len(&self) -> usize {
        self.elements * self.channels
    }

    /// True for a zero-sized buffer.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        (self.len() * std::mem::size_of::<f32>()) as u64
    }
}

/// A kernel invocation with its arguments bound.
///
/// Every kernel runs one work-item per grid cell. Kernels listing both an
/// input and an output buffer require them to be distinct; kernels that
/// update a buffer in place only touch each work-item's own cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Kernel {
    /// Semi-Lagrangian step: `output[c] = sample(input, pos(c) - velocity[c] * dt)`.
    AdvectBacktrace {
        /// Element layout of `input` and `output`.
        element: ElementKind,
        /// Velocity field (vector elements).
        velocity: BufferHandle,
        /// Field being advected.
        input: BufferHandle,
        /// Destination, distinct from `input` and `velocity`.
        output: BufferHandle,
        /// Signed step length.
        dt: f32,
    },
    /// MacCormack correction applied in place to the forward result held in
    /// `target`, clamped to the neighbors of the backtraced position in
    /// `original`.
    MacCormackCorrect {
        /// Element layout of the advected buffers.
        element: ElementKind,
        /// Velocity field.
        velocity: BufferHandle,
        /// Forward result advected back by `-dt`.
        backward: BufferHandle,
        /// Field before advection.
        original: BufferHandle,
        /// Forward result; overwritten with the corrected value.
        target: BufferHandle,
        /// Step length of the forward pass.
        dt: f32,
    },
    /// Buoyancy, density weight and drag added to velocity in place.
    ApplyForces {
        /// Velocity field, updated in place.
        velocity: BufferHandle,
        /// Fluid state driving the forces.
        state: BufferHandle,
        /// Step length.
        dt: f32,
    },
    /// Temperature decay in place.
    CoolFluid {
        /// Fluid state, updated in place.
        state: BufferHandle,
        /// Step length.
        dt: f32,
    },
    /// Overwrite the fluid state of one cell.
    SetFluid {
        /// Fluid state, updated in place.
        state: BufferHandle,
        /// Target cell.
        cell: [u32; 3],
        /// New value.
        value: FluidState,
    },
    /// Add to the fluid state of one cell.
    AddFluid {
        /// Fluid state, updated in place.
        state: BufferHandle,
        /// Target cell.
        cell: [u32; 3],
        /// Amount added.
        value: FluidState,
    },
    /// Add an impulse to the velocity of one cell.
    ApplyImpulse {
        /// Velocity field, updated in place.
        velocity: BufferHandle,
        /// Target cell.
        cell: [u32; 3],
        /// Velocity added.
        impulse: Vec3,
    },
    /// Projection stage 1: divergence into scratch channel 0, pressure
    /// channels 1 and 2 zeroed.
    ProjectDivergence {
        /// Velocity field.
        velocity: BufferHandle,
        /// 3-channel scratch buffer.
        scratch: BufferHandle,
    },
    /// Projection stage 2: one Jacobi sweep of the pressure Poisson equation,
    /// reading pressure from `read_channel` and writing `write_channel`.
    ProjectJacobi {
        /// 3-channel scratch buffer.
        scratch: BufferHandle,
        /// Pressure channel read (1 or 2).
        read_channel: u32,
        /// Pressure channel written (2 or 1).
        write_channel: u32,
    },
    /// Projection stage 3: subtract the pressure gradient from velocity in place.
    ProjectSubtractGradient {
        /// Velocity field, updated in place.
        velocity: BufferHandle,
        /// 3-channel scratch buffer.
        scratch: BufferHandle,
        /// Channel holding the solved pressure.
        pressure_channel: u32,
    },
    /// `clamp(density, 0, 1)^gamma` into channel 0 of `output`.
    VisualizeDensity {
        /// Fluid state.
        state: BufferHandle,
        /// Destination, one intensity per cell in channel 0.
        output: BufferHandle,
        /// Exponent applied to the clamped density.
        gamma: f32,
    },
    /// `clamp(|velocity|, 0, 1)` into channel 0 of `output`.
    VisualizeVelocity {
        /// Velocity field.
        velocity: BufferHandle,
        /// Destination, one intensity per cell in channel 0.
        output: BufferHandle,
    },
}

impl Kernel {
    /// Entry-point name, used for logging and pipeline lookup.
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::AdvectBacktrace { .. } => "advect_backtrace",
            Kernel::MacCormackCorrect { .. } => "maccormack_correct",
            Kernel::ApplyForces { .. } => "apply_forces",
            Kernel::CoolFluid { .. } => "cool_fluid",
            Kernel::SetFluid { .. } => "set_fluid",
            Kernel::AddFluid { .. } => "add_fluid",
            Kernel::ApplyImpulse { .. } => "apply_impulse",
            Kernel::ProjectDivergence { .. } => "project_divergence",
            Kernel::ProjectJacobi { .. } => "project_jacobi",
            Kernel::ProjectSubtractGradient { .. } => "project_subtract_gradient",
            Kernel::VisualizeDensity { .. } => "visualize_density",
            Kernel::VisualizeVelocity { .. } => "visualize_velocity",
        }
    }
}

/// A device able to hold grid buffers and run [`Kernel`]s over them.
pub trait ComputeBackend: Send {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Allocate a zero-initialized buffer.
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferHandle, BackendError>;

    /// Layout of an allocated buffer.
    fn buffer_desc(&self, handle: BufferHandle) -> &BufferDesc;

    /// Overwrite the whole contents of a buffer.
    fn write_buffer(&mut self, handle: BufferHandle, data: &[f32]) -> Result<(), BackendError>;

    /// Copy the whole contents of a buffer back to the host.
    fn read_buffer(&self, handle: BufferHandle) -> Result<Vec<f32>, BackendError>;

    /// Replace the constant parameter block read by the force and cooling kernels.
    fn upload_params(&mut self, params: &FluidParams) -> Result<(), BackendError>;

    /// Build everything needed to dispatch over `shape`. Called once before
    /// the first dispatch.
    fn prepare(&mut self, _shape: &WorkShape) -> Result<(), BackendError> {
        Ok(())
    }

    /// Run `kernel` over `shape` and block until it has completed.
    fn dispatch(&mut self, kernel: &Kernel, shape: &WorkShape) -> Result<(), BackendError>;
}

/// Check that `data` exactly fills the buffer described by `desc`.
pub(crate) fn check_write_size(desc: &BufferDesc, data: &[f32]) -> Result<(), BackendError> {
    if data.len() != desc.len() {
        return Err(BackendError::BufferSize {
            label: desc.label.clone(),
            expected: desc.len(),
            actual: data.len(),
        });
    }
    Ok(())
}
