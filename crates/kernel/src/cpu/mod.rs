//! Reference CPU backend.
//!
//! Buffers live in host memory and every dispatch runs the matching body from
//! [`kernels`] across all cells with rayon. Results are bit-for-bit
//! deterministic for a given thread count and serve as the baseline the GPU
//! backend is checked against.

pub mod kernels;

use glam::Vec3;

use crate::backend::{check_write_size, BufferDesc, BufferHandle, ComputeBackend, Kernel};
use crate::error::BackendError;
use crate::grid::{view, view_mut, ElementKind, FluidState, GridDims, GridElement};
use crate::params::FluidParams;
use crate::runner::WorkShape;

struct CpuBuffer {
    desc: BufferDesc,
    data: Vec<f32>,
}

/// Host-memory implementation of [`ComputeBackend`].
#[derive(Default)]
pub struct CpuBackend {
    buffers: Vec<CpuBuffer>,
    params: FluidParams,
}

impl CpuBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self, handle: BufferHandle) -> &[f32] {
        &self.buffers[handle.slot()].data
    }

    fn channels(&self, handle: BufferHandle) -> usize {
        self.buffers[handle.slot()].desc.channels
    }

    /// Temporarily detach `output` so it can be written while the other
    /// buffers are read.
    fn with_output<R>(
        &mut self,
        kernel: &'static str,
        output: BufferHandle,
        inputs: &[BufferHandle],
        f: impl FnOnce(&Self, &mut [f32]) -> R,
    ) -> R {
        for input in inputs {
            assert_ne!(
                *input, output,
                "{kernel}: output buffer `{}` is also bound as an input",
                self.buffers[output.slot()].desc.label
            );
        }
        let mut data = std::mem::take(&mut self.buffers[output.slot()].data);
        let result = f(self, &mut data);
        self.buffers[output.slot()].data = data;
        result
    }

    fn check_covers(&self, kernel: &'static str, handle: BufferHandle, dims: GridDims) {
        let desc = &self.buffers[handle.slot()].desc;
        assert!(
            desc.elements >= dims.cell_count(),
            "{kernel}: buffer `{}` holds {} cells, domain has {}",
            desc.label,
            desc.elements,
            dims.cell_count()
        );
    }
}

fn advect<T: GridElement>(
    backend: &CpuBackend,
    dims: GridDims,
    velocity: BufferHandle,
    input: BufferHandle,
    output: &mut [f32],
    dt: f32,
) {
    let cells = dims.cell_count();
    kernels::advect_backtrace::<T>(
        dims,
        view(backend.data(velocity), cells),
        view(backend.data(input), cells),
        view_mut(output, cells),
        dt,
    );
}

fn correct<T: GridElement>(
    backend: &CpuBackend,
    dims: GridDims,
    velocity: BufferHandle,
    backward: BufferHandle,
    original: BufferHandle,
    target: &mut [f32],
    dt: f32,
) {
    let cells = dims.cell_count();
    kernels::maccormack_correct::<T>(
        dims,
        view(backend.data(velocity), cells),
        view(backend.data(backward), cells),
        view(backend.data(original), cells),
        view_mut(target, cells),
        dt,
    );
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.buffers.len() as u32);
        let data = vec![0.0; desc.len()];
        self.buffers.push(CpuBuffer { desc, data });
        Ok(handle)
    }

    fn buffer_desc(&self, handle: BufferHandle) -> &BufferDesc {
        &self.buffers[handle.slot()].desc
    }

    fn write_buffer(&mut self, handle: BufferHandle, data: &[f32]) -> Result<(), BackendError> {
        let buffer = &mut self.buffers[handle.slot()];
        check_write_size(&buffer.desc, data)?;
        buffer.data.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, handle: BufferHandle) -> Result<Vec<f32>, BackendError> {
        Ok(self.buffers[handle.slot()].data.clone())
    }

    fn upload_params(&mut self, params: &FluidParams) -> Result<(), BackendError> {
        self.params = *params;
        Ok(())
    }

    fn dispatch(&mut self, kernel: &Kernel, shape: &WorkShape) -> Result<(), BackendError> {
        let dims = shape.dims();
        let cells = dims.cell_count();
        let name = kernel.name();
        let params = self.params;

        match *kernel {
            Kernel::AdvectBacktrace { element, velocity, input, output, dt } => {
                for h in [velocity, input, output] {
                    self.check_covers(name, h, dims);
                }
                self.with_output(name, output, &[velocity, input], |b, out| match element {
                    ElementKind::FluidState => advect::<FluidState>(b, dims, velocity, input, out, dt),
                    ElementKind::Vector => advect::<Vec3>(b, dims, velocity, input, out, dt),
                });
            }
            Kernel::MacCormackCorrect { element, velocity, backward, original, target, dt } => {
                for h in [velocity, backward, original, target] {
                    self.check_covers(name, h, dims);
                }
                self.with_output(name, target, &[velocity, backward, original], |b, out| {
                    match element {
                        ElementKind::FluidState => {
                            correct::<FluidState>(b, dims, velocity, backward, original, out, dt)
                        }
                        ElementKind::Vector => {
                            correct::<Vec3>(b, dims, velocity, backward, original, out, dt)
                        }
                    }
                });
            }
            Kernel::ApplyForces { velocity, state, dt } => {
                self.with_output(name, velocity, &[state], |b, out| {
                    kernels::apply_forces(&params, view(b.data(state), cells), view_mut(out, cells), dt)
                });
            }
            Kernel::CoolFluid { state, dt } => {
                let data = &mut self.buffers[state.slot()].data;
                kernels::cool_fluid(&params, view_mut(data, cells), dt);
            }
            Kernel::SetFluid { state, cell, value } => {
                let data = &mut self.buffers[state.slot()].data;
                kernels::set_fluid(dims, view_mut(data, cells), cell, value);
            }
            Kernel::AddFluid { state, cell, value } => {
                let data = &mut self.buffers[state.slot()].data;
                kernels::add_fluid(dims, view_mut(data, cells), cell, value);
            }
            Kernel::ApplyImpulse { velocity, cell, impulse } => {
                let data = &mut self.buffers[velocity.slot()].data;
                kernels::apply_impulse(dims, view_mut(data, cells), cell, impulse);
            }
            Kernel::ProjectDivergence { velocity, scratch } => {
                let stride = self.channels(scratch);
                self.with_output(name, scratch, &[velocity], |b, out| {
                    kernels::project_divergence(dims, view(b.data(velocity), cells), out, stride)
                });
            }
            Kernel::ProjectJacobi { scratch, read_channel, write_channel } => {
                let stride = self.channels(scratch);
                let data = &mut self.buffers[scratch.slot()].data;
                kernels::project_jacobi(dims, data, stride, read_channel as usize, write_channel as usize);
            }
            Kernel::ProjectSubtractGradient { velocity, scratch, pressure_channel } => {
                let stride = self.channels(scratch);
                self.with_output(name, velocity, &[scratch], |b, out| {
                    kernels::project_subtract_gradient(
                        dims,
                        b.data(scratch),
                        stride,
                        pressure_channel as usize,
                        view_mut(out, cells),
                    )
                });
            }
            Kernel::VisualizeDensity { state, output, gamma } => {
                let stride = self.channels(output);
                self.with_output(name, output, &[state], |b, out| {
                    kernels::visualize_density(view(b.data(state), cells), out, stride, gamma)
                });
            }
            Kernel::VisualizeVelocity { velocity, output } => {
                let stride = self.channels(output);
                self.with_output(name, output, &[velocity], |b, out| {
                    kernels::visualize_velocity(view(b.data(velocity), cells), out, stride)
                });
            }
        }
        Ok(())
    }
}
