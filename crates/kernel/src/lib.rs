//! Grid-based smoke simulation kernel.
//!
//! This crate provides the numerical core of an incompressible smoke solver:
//! semi-Lagrangian advection with MacCormack correction, Jacobi pressure
//! projection, and the per-step pipeline that ties them together. Kernels run
//! on a [`ComputeBackend`]: the rayon-parallel [`CpuBackend`] always, and the
//! wgpu [`GpuBackend`] with the `gpu` feature.
//!
//! # Modules
//! - [`grid`] -- Grid dimensions, `FluidState`, and the `GridElement` trait.
//! - [`sampling`] -- Trilinear/bilinear sampling and neighbor gathers.
//! - [`backend`] -- The `ComputeBackend` trait and typed `Kernel` invocations.
//! - [`runner`] -- Synchronous dispatch over a fixed work shape.
//! - [`pool`] -- Scratch buffers shared between stages.
//! - [`advect`] -- Semi-Lagrangian and MacCormack advection.
//! - [`project`] -- Divergence-free projection.
//! - [`solver`] -- `FluidSolver`, the public simulation API.
//! - [`vis`] -- Writing solver output into a texture.

#![warn(missing_docs)]

pub mod advect;
pub mod backend;
pub mod cpu;
pub mod error;
pub mod grid;
pub mod params;
pub mod pool;
pub mod project;
pub mod runner;
pub mod sampling;
pub mod solver;
pub mod vis;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use advect::{AdvectionScheme, Advecter};
pub use backend::{BufferDesc, BufferHandle, ComputeBackend, Kernel};
pub use cpu::CpuBackend;
pub use error::BackendError;
pub use grid::{ElementKind, FluidState, GridDims, GridElement};
pub use params::FluidParams;
pub use pool::TempBufferPool;
pub use project::{DivergenceFreeProjector, DEFAULT_JACOBI_ITERATIONS};
pub use runner::{KernelRunner, WorkShape};
pub use solver::{FluidSolver, SolverSettings};
pub use vis::{HostTexture, TextureSink, VisualizationMode};

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, GpuBackend};
