//! The smoke solver: double-buffered grids and the fixed per-step pipeline.

use glam::Vec3;

use crate::advect::{AdvectionScheme, Advecter};
use crate::backend::{BufferDesc, BufferHandle, ComputeBackend, Kernel};
use crate::error::BackendError;
use crate::grid::{view, ElementKind, FluidState, GridDims, GridElement};
use crate::params::FluidParams;
use crate::pool::{TempBufferPool, DEFAULT_TEMP_BUFFER_COUNT, TEMP_BUFFER_CHANNELS};
use crate::project::{DivergenceFreeProjector, DEFAULT_JACOBI_ITERATIONS};
use crate::runner::KernelRunner;
use crate::vis::{quantize, TextureSink, VisualizationMode};

/// Scratch buffer the visualization write renders into.
const VIS_TEMP_BUFFER: usize = 0;
/// Scratch buffer shared by advection and projection.
const SOLVER_TEMP_BUFFER: usize = 1;

/// Everything fixed when a solver is built.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    /// Grid resolution.
    pub dims: GridDims,
    /// Advection scheme used for both velocity and fluid state.
    pub advection: AdvectionScheme,
    /// Jacobi sweeps per pressure projection.
    pub jacobi_iterations: u32,
    /// Initial force and cooling parameters.
    pub params: FluidParams,
    /// What the visualization write shows.
    pub visualization: VisualizationMode,
    /// Scratch buffers to allocate (at least 2).
    pub temp_buffers: usize,
}

impl SolverSettings {
    /// Default settings for a grid.
    pub fn new(dims: GridDims) -> Self {
        Self {
            dims,
            advection: AdvectionScheme::default(),
            jacobi_iterations: DEFAULT_JACOBI_ITERATIONS,
            params: FluidParams::default(),
            visualization: VisualizationMode::default(),
            temp_buffers: DEFAULT_TEMP_BUFFER_COUNT,
        }
    }
}

/// A pair of grids whose read/write roles swap after each advection.
#[derive(Debug, Clone, Copy)]
struct PingPong {
    slots: [BufferHandle; 2],
    active: usize,
}

impl PingPong {
    fn new(slots: [BufferHandle; 2]) -> Self {
        Self { slots, active: 0 }
    }

    /// The stable, most recently completed grid.
    fn input(&self) -> BufferHandle {
        self.slots[self.active]
    }

    /// The grid the next advection writes.
    fn output(&self) -> BufferHandle {
        self.slots[1 - self.active]
    }

    fn swap(&mut self) {
        self.active = 1 - self.active;
    }
}

/// Grid-based smoke simulation.
///
/// Owns two fluid-state grids and two velocity grids. Each [`update`] runs
/// velocity self-advection, forces, pressure projection, cooling and state
/// advection in that order, then writes the attached texture, if any.
///
/// [`update`]: FluidSolver::update
pub struct FluidSolver {
    runner: KernelRunner,
    dims: GridDims,
    pool: TempBufferPool,
    state: PingPong,
    velocity: PingPong,
    velocity_advecter: Advecter<Vec3>,
    state_advecter: Advecter<FluidState>,
    projector: DivergenceFreeProjector,
    params: FluidParams,
    output_gamma: f32,
    visualization: VisualizationMode,
    sink: Option<Box<dyn TextureSink>>,
    steps: u64,
}

impl FluidSolver {
    /// Build a solver on `backend`. All grids start at zero.
    pub fn new(backend: Box<dyn ComputeBackend>, settings: SolverSettings) -> Result<Self, BackendError> {
        let SolverSettings {
            dims,
            advection,
            jacobi_iterations,
            params,
            visualization,
            temp_buffers,
        } = settings;
        assert!(
            temp_buffers > SOLVER_TEMP_BUFFER,
            "solver needs at least {} temp buffers",
            SOLVER_TEMP_BUFFER + 1
        );

        let mut runner = KernelRunner::new(backend, dims)?;
        let cells = dims.cell_count();
        let backend = runner.backend_mut();

        let mut grids = |label: &str, kind: ElementKind| -> Result<[BufferHandle; 2], BackendError> {
            Ok([
                backend.create_buffer(BufferDesc::new(format!("{label}_0"), cells, kind.channels()))?,
                backend.create_buffer(BufferDesc::new(format!("{label}_1"), cells, kind.channels()))?,
            ])
        };
        let state = PingPong::new(grids("fluid_state", FluidState::KIND)?);
        let velocity = PingPong::new(grids("velocity", Vec3::KIND)?);
        let pool = TempBufferPool::new(backend, cells, temp_buffers)?;

        let scratch = pool.buffer(SOLVER_TEMP_BUFFER);
        tracing::info!(
            backend = runner.backend().name(),
            width = dims.width,
            height = dims.height,
            depth = dims.depth,
            advection = ?advection,
            jacobi_iterations,
            "fluid solver created"
        );

        Ok(Self {
            runner,
            dims,
            state,
            velocity,
            velocity_advecter: Advecter::new(advection, scratch),
            state_advecter: Advecter::new(advection, scratch),
            projector: DivergenceFreeProjector::with_iterations(scratch, jacobi_iterations),
            pool,
            params,
            output_gamma: 1.0,
            visualization,
            sink: None,
            steps: 0,
        })
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Any backend failure aborts the step and is returned; the grids are then
    /// in an unspecified state.
    pub fn update(&mut self, dt: f32) -> Result<(), BackendError> {
        self.runner.backend_mut().upload_params(&self.params)?;
        self.simulate(dt)?;
        self.visualize()?;
        self.steps += 1;
        Ok(())
    }

    fn simulate(&mut self, dt: f32) -> Result<(), BackendError> {
        let runner = &mut self.runner;

        self.velocity_advecter.advect(
            runner,
            self.velocity.output(),
            self.velocity.input(),
            self.velocity.input(),
            dt,
        )?;
        self.velocity.swap();

        runner.run(&Kernel::ApplyForces {
            velocity: self.velocity.input(),
            state: self.state.input(),
            dt,
        })?;

        self.projector.make_divergence_free(runner, self.velocity.input())?;

        runner.run(&Kernel::CoolFluid {
            state: self.state.input(),
            dt,
        })?;

        self.state_advecter.advect(
            runner,
            self.state.output(),
            self.state.input(),
            self.velocity.input(),
            dt,
        )?;
        self.state.swap();
        Ok(())
    }

    fn visualize(&mut self) -> Result<(), BackendError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let output = self.pool.buffer(VIS_TEMP_BUFFER);
        let kernel = match self.visualization {
            VisualizationMode::Density => Kernel::VisualizeDensity {
                state: self.state.input(),
                output,
                gamma: self.output_gamma,
            },
            VisualizationMode::Velocity => Kernel::VisualizeVelocity {
                velocity: self.velocity.input(),
                output,
            },
        };
        self.runner.run(&kernel)?;
        let values = self.runner.backend().read_buffer(output)?;
        let texels = quantize(&values, TEMP_BUFFER_CHANNELS, self.dims.cell_count());

        sink.acquire();
        sink.write_texels(self.dims, &texels);
        sink.release();
        Ok(())
    }

    /// Overwrite the fluid state of the cell nearest `pos`.
    pub fn set_fluid(&mut self, pos: Vec3, density: f32, temperature: f32) -> Result<(), BackendError> {
        self.runner.run(&Kernel::SetFluid {
            state: self.state.input(),
            cell: self.dims.nearest_cell(pos),
            value: FluidState::new(density, temperature),
        })
    }

    /// Add density and temperature to the cell nearest `pos`.
    pub fn add_fluid(&mut self, pos: Vec3, density: f32, temperature: f32) -> Result<(), BackendError> {
        self.runner.run(&Kernel::AddFluid {
            state: self.state.input(),
            cell: self.dims.nearest_cell(pos),
            value: FluidState::new(density, temperature),
        })
    }

    /// Add `impulse` to the velocity of the cell nearest `pos`.
    pub fn apply_impulse(&mut self, pos: Vec3, impulse: Vec3) -> Result<(), BackendError> {
        self.runner.run(&Kernel::ApplyImpulse {
            velocity: self.velocity.input(),
            cell: self.dims.nearest_cell(pos),
            impulse,
        })
    }

    /// Handle of the most recently completed fluid-state grid.
    ///
    /// The handle alternates between two buffers from one update to the next;
    /// do not hold on to it across [`update`](FluidSolver::update).
    pub fn output_buffer(&self) -> BufferHandle {
        self.state.input()
    }

    /// Handle of the most recently completed velocity grid.
    pub fn velocity_buffer(&self) -> BufferHandle {
        self.velocity.input()
    }

    /// Exponent applied to density in the visualization write.
    pub fn set_output_write_gamma_power(&mut self, power: f32) {
        self.output_gamma = power;
    }

    /// See [`set_output_write_gamma_power`](FluidSolver::set_output_write_gamma_power).
    pub fn output_write_gamma_power(&self) -> f32 {
        self.output_gamma
    }

    /// Current parameters.
    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    /// Mutable parameters; changes are uploaded at the start of the next update.
    pub fn params_mut(&mut self) -> &mut FluidParams {
        &mut self.params
    }

    /// Switch what the visualization write shows.
    pub fn set_visualization_mode(&mut self, mode: VisualizationMode) {
        self.visualization = mode;
    }

    /// Attach a texture for the visualization write, returning the previous one.
    pub fn attach_texture_sink(&mut self, sink: Box<dyn TextureSink>) -> Option<Box<dyn TextureSink>> {
        self.sink.replace(sink)
    }

    /// Detach the texture; later updates skip the visualization write.
    pub fn detach_texture_sink(&mut self) -> Option<Box<dyn TextureSink>> {
        self.sink.take()
    }

    /// Copy the current fluid state back to the host.
    pub fn read_state(&self) -> Result<Vec<FluidState>, BackendError> {
        self.read_grid(self.state.input())
    }

    /// Copy the current velocity back to the host.
    pub fn read_velocity(&self) -> Result<Vec<Vec3>, BackendError> {
        self.read_grid(self.velocity.input())
    }

    /// Replace the current fluid state.
    pub fn write_state(&mut self, state: &[FluidState]) -> Result<(), BackendError> {
        let handle = self.state.input();
        self.runner.backend_mut().write_buffer(handle, bytemuck::cast_slice(state))
    }

    /// Replace the current velocity.
    pub fn write_velocity(&mut self, velocity: &[Vec3]) -> Result<(), BackendError> {
        let handle = self.velocity.input();
        self.runner.backend_mut().write_buffer(handle, bytemuck::cast_slice(velocity))
    }

    fn read_grid<T: GridElement>(&self, handle: BufferHandle) -> Result<Vec<T>, BackendError> {
        let data = self.runner.backend().read_buffer(handle)?;
        Ok(view::<T>(&data, self.dims.cell_count()).to_vec())
    }

    /// Grid resolution.
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Advection scheme fixed at construction.
    pub fn advection_scheme(&self) -> AdvectionScheme {
        self.state_advecter.scheme()
    }

    /// Jacobi sweeps per projection.
    pub fn jacobi_iterations(&self) -> u32 {
        self.projector.iterations()
    }

    /// Completed updates.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// The kernel runner, for dispatch statistics.
    pub fn runner(&self) -> &KernelRunner {
        &self.runner
    }

    /// The scratch buffers.
    pub fn temp_buffers(&self) -> &TempBufferPool {
        &self.pool
    }

    /// Name of the backend running the kernels.
    pub fn backend_name(&self) -> &str {
        self.runner.backend().name()
    }
}
