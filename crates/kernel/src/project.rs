//! Pressure projection of a velocity field onto its divergence-free part.
//!
//! Three stages against one 3-channel scratch buffer:
//!
//! 1. divergence into channel 0, pressure channels zeroed;
//! 2. a fixed number of Jacobi sweeps on `lap(p) = div(u)`, ping-ponging the
//!    pressure between channels 1 and 2;
//! 3. subtraction of the pressure gradient from the velocity, in place.
//!
//! There is no residual check: the iteration count bounds the per-step cost,
//! and the result is only approximately divergence-free.

use crate::backend::{BufferHandle, Kernel};
use crate::error::BackendError;
use crate::runner::KernelRunner;

/// Jacobi sweeps per projection unless overridden.
pub const DEFAULT_JACOBI_ITERATIONS: u32 = 20;

/// Scratch channel holding the divergence.
pub const DIVERGENCE_CHANNEL: u32 = 0;

/// The two scratch channels the pressure alternates between.
pub const PRESSURE_CHANNELS: [u32; 2] = [1, 2];

/// Scratch channels required by the projection.
pub const SCRATCH_CHANNELS: usize = 3;

/// Makes velocity fields approximately divergence-free.
#[derive(Debug, Clone)]
pub struct DivergenceFreeProjector {
    scratch: BufferHandle,
    iterations: u32,
}

impl DivergenceFreeProjector {
    /// Projector using [`DEFAULT_JACOBI_ITERATIONS`].
    pub fn new(scratch: BufferHandle) -> Self {
        Self::with_iterations(scratch, DEFAULT_JACOBI_ITERATIONS)
    }

    /// Projector with an explicit Jacobi iteration count.
    pub fn with_iterations(scratch: BufferHandle, iterations: u32) -> Self {
        Self { scratch, iterations }
    }

    /// Jacobi sweeps per call.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Channel that holds the solved pressure after `iterations` sweeps.
    pub fn pressure_channel(iterations: u32) -> u32 {
        PRESSURE_CHANNELS[(iterations % 2) as usize]
    }

    /// Project `velocity` in place.
    ///
    /// The scratch buffer must cover the domain with at least
    /// [`SCRATCH_CHANNELS`] (3) channels per cell: channel 0 holds the
    /// divergence and the pressure alternates between channels 1 and 2, so no
    /// sweep reads the channel it writes. Narrower scratch buffers panic.
    pub fn make_divergence_free(
        &self,
        runner: &mut KernelRunner,
        velocity: BufferHandle,
    ) -> Result<(), BackendError> {
        assert_ne!(velocity, self.scratch, "projection scratch must not be the velocity buffer");
        let desc = runner.backend().buffer_desc(self.scratch);
        assert!(
            desc.channels >= SCRATCH_CHANNELS && desc.elements >= runner.dims().cell_count(),
            "projection scratch `{}` too small: {} cells x {} channels",
            desc.label,
            desc.elements,
            desc.channels
        );

        runner.run(&Kernel::ProjectDivergence {
            velocity,
            scratch: self.scratch,
        })?;

        for i in 0..self.iterations {
            runner.run(&Kernel::ProjectJacobi {
                scratch: self.scratch,
                read_channel: Self::pressure_channel(i),
                write_channel: Self::pressure_channel(i + 1),
            })?;
        }

        runner.run(&Kernel::ProjectSubtractGradient {
            velocity,
            scratch: self.scratch,
            pressure_channel: Self::pressure_channel(self.iterations),
        })
    }
}
