//! Headless smoke simulation.
//!
//! Usage: smoke-sim <CONFIG> [--steps N]

use clap::Parser;
use orchestrator::{BackendType, RunnerState, SimulationConfig, SimulationRunner, SourceSchedule};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run a smoke simulation config headless and print a summary
#[derive(Parser, Debug)]
#[command(name = "smoke-sim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Headless grid smoke solver", long_about = None)]
struct Args {
    /// Simulation config (JSON)
    config: PathBuf,

    /// Number of steps; overrides `max_steps` in the config
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    steps: Option<u64>,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = SimulationConfig::load(&args.config.to_string_lossy())?;
    let max_steps = args
        .steps
        .or(config.max_steps)
        .ok_or("No step limit: set max_steps in the config or pass --steps")?;
    tracing::info!(
        "Running '{}' at {:?} for {} steps (backend {:?})",
        config.name,
        config.resolution,
        max_steps,
        config.backend
    );
    if config.backend == BackendType::Gpu && cfg!(not(feature = "gpu")) {
        tracing::warn!("Config asks for the GPU backend; this binary was built without it");
    }

    let config_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let solver = orchestrator::build_solver(&config, config_dir)?;
    tracing::info!("Solver backend: {}", solver.backend_name());

    let runner = SimulationRunner::new(
        solver,
        SourceSchedule::new(config.emitters.clone(), config.impulses.clone()),
        config.time_step.effective(),
        Some(max_steps),
    );

    let start = Instant::now();
    runner.start();
    while matches!(runner.state(), RunnerState::Running) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let state = runner.state();
    let error = runner.error_message();
    let snapshot = runner.snapshot();
    let steps = runner.step_count();
    let sim_time = runner.sim_time();
    runner.join()?;

    if state == RunnerState::Error {
        return Err(error.unwrap_or_else(|| "Simulation failed".to_string()).into());
    }

    let wall = start.elapsed().as_secs_f64();
    println!("Simulation: {}", config.name);
    println!("Steps: {} ({:.3}s simulated, {:.2}s wall, {:.1} steps/s)", steps, sim_time, wall, steps as f64 / wall.max(1e-9));
    if let Some(s) = snapshot {
        println!("Total density: {:.6}", s.total_density);
        println!("Density range: [{:.6}, {:.6}]", s.min_density, s.max_density);
        println!("Max speed: {:.4}", s.max_speed);
    }
    Ok(())
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smoke_sim=info,orchestrator=info,smoke_kernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parses_config_and_steps() {
        let args = Args::try_parse_from(["smoke-sim", "configs/plume_2d.json", "--steps", "12"]).unwrap();
        assert_eq!(args.config, PathBuf::from("configs/plume_2d.json"));
        assert_eq!(args.steps, Some(12));

        let args = Args::try_parse_from(["smoke-sim", "plume.json"]).unwrap();
        assert_eq!(args.steps, None);
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(Args::try_parse_from(["smoke-sim"]).is_err());
        assert!(Args::try_parse_from(["smoke-sim", "a.json", "--steps", "0"]).is_err());
        assert!(Args::try_parse_from(["smoke-sim", "a.json", "--steps", "many"]).is_err());
        assert!(Args::try_parse_from(["smoke-sim", "a.json", "b.json"]).is_err());
    }
}
