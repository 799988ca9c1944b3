//! Orchestration Layer
//!
//! This crate provides orchestration for the smoke solver, including:
//! - JSON configuration loading and validation
//! - Compute backend selection with CPU fallback
//! - Emitters and impulse sources driven over simulated time
//! - Simulation runner with lifecycle management

#![warn(missing_docs)]

pub mod config;
pub mod runner;
pub mod sources;

pub use config::{BackendType, SimulationConfig};
pub use runner::{RunSnapshot, RunnerState, SimulationRunner};
pub use sources::SourceSchedule;

use smoke_kernel::{ComputeBackend, CpuBackend, FluidSolver, SolverSettings};
use std::path::Path;

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Select and initialize the compute backend
/// 3. Build the solver with the configured scheme and parameters
/// 4. Wrap it in a SimulationRunner for lifecycle management
///
/// # Arguments
/// * `config_path` - Path to the JSON configuration file
///
/// # Returns
/// A `SimulationRunner` ready to be started, or an error if setup fails
///
/// # Example
/// ```no_run
/// use orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/plume_3d.json")?;
/// runner.start();
/// // ... query status, pause, resume, etc.
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(config_path: &str) -> Result<SimulationRunner, Box<dyn std::error::Error>> {
    tracing::info!("Creating simulation from config: {}", config_path);

    // 1. Load and validate configuration
    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    // 2-3. Backend and solver; kernel_dir resolves relative to the config file
    let config_dir = Path::new(config_path)
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let solver = build_solver(&config, config_dir)?;

    // 4. Wrap in SimulationRunner
    tracing::info!("Creating simulation runner...");
    let runner = SimulationRunner::new(
        solver,
        SourceSchedule::new(config.emitters.clone(), config.impulses.clone()),
        config.time_step.effective(),
        config.max_steps,
    );

    tracing::info!("Simulation ready to start");
    Ok(runner)
}

/// Build a solver for a validated configuration.
///
/// `config_dir` anchors a relative `kernel_dir`.
pub fn build_solver(
    config: &SimulationConfig,
    config_dir: &Path,
) -> Result<FluidSolver, Box<dyn std::error::Error>> {
    let kernel_dir = config.kernel_dir.as_ref().map(|dir| config_dir.join(dir));
    let backend = create_backend(config.backend, kernel_dir.as_deref())?;

    let mut settings = SolverSettings::new(config.dims());
    settings.advection = config.advection;
    settings.jacobi_iterations = config.jacobi_iterations;
    settings.params = config.params;
    settings.visualization = config.visualization;

    let mut solver = FluidSolver::new(backend, settings)?;
    solver.set_output_write_gamma_power(config.output_gamma);
    Ok(solver)
}

/// Create a compute backend based on the backend configuration.
///
/// For `Auto`, attempts GPU first and falls back to CPU if unavailable.
/// For `Gpu`, returns a GPU backend or an error if GPU is unavailable.
/// For `Cpu`, always returns a CPU backend.
///
/// `kernel_dir` overrides the GPU kernel sources compiled into the binary.
pub fn create_backend(
    backend: BackendType,
    kernel_dir: Option<&Path>,
) -> Result<Box<dyn ComputeBackend>, Box<dyn std::error::Error>> {
    match backend {
        BackendType::Cpu => {
            tracing::info!("Creating CPU compute backend...");
            Ok(Box::new(CpuBackend::new()))
        }
        #[cfg(feature = "gpu")]
        BackendType::Gpu => {
            tracing::info!("Creating GPU compute backend...");
            Ok(gpu_backend(kernel_dir)?)
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Gpu => {
            let _ = kernel_dir;
            Err("GPU backend requested but 'gpu' feature is not enabled. Compile with --features gpu".into())
        }
        #[cfg(feature = "gpu")]
        BackendType::Auto => {
            tracing::info!("Auto-detecting backend...");
            if smoke_kernel::gpu_available() {
                tracing::info!("GPU available, creating GPU backend...");
                match gpu_backend(kernel_dir) {
                    Ok(gpu) => Ok(gpu),
                    Err(e) => {
                        tracing::warn!("GPU init failed ({e}), falling back to CPU");
                        Ok(Box::new(CpuBackend::new()))
                    }
                }
            } else {
                tracing::info!("No GPU available, using CPU backend");
                Ok(Box::new(CpuBackend::new()))
            }
        }
        #[cfg(not(feature = "gpu"))]
        BackendType::Auto => {
            let _ = kernel_dir;
            tracing::info!("GPU feature not enabled, using CPU backend");
            Ok(Box::new(CpuBackend::new()))
        }
    }
}

#[cfg(feature = "gpu")]
fn gpu_backend(kernel_dir: Option<&Path>) -> Result<Box<dyn ComputeBackend>, smoke_kernel::BackendError> {
    let gpu = match kernel_dir {
        Some(dir) => smoke_kernel::GpuBackend::from_kernel_dir(dir)?,
        None => smoke_kernel::GpuBackend::new()?,
    };
    tracing::info!("GPU adapter: {}", gpu.adapter_name());
    Ok(Box::new(gpu))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_selection() {
        let backend = create_backend(BackendType::Cpu, None).unwrap();
        assert_eq!(backend.name(), "cpu");
    }

    #[test]
    fn test_auto_always_yields_a_backend() {
        let backend = create_backend(BackendType::Auto, None).unwrap();
        assert!(["cpu", "wgpu"].contains(&backend.name()));
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_without_feature_is_an_error() {
        let err = create_backend(BackendType::Gpu, None).err().unwrap();
        assert!(err.to_string().contains("'gpu' feature"));
    }

    #[test]
    fn test_build_solver_applies_config() {
        let mut config = SimulationConfig::new("t", [6, 5, 1]);
        config.backend = BackendType::Cpu;
        config.jacobi_iterations = 8;
        config.output_gamma = 2.2;
        let solver = build_solver(&config, Path::new(".")).unwrap();
        assert_eq!(solver.dims(), config.dims());
        assert_eq!(solver.jacobi_iterations(), 8);
        assert_eq!(solver.output_write_gamma_power(), 2.2);
    }
}
