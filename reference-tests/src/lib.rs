//! Reference test framework for smoke simulation validation
//!
//! Each reference test runs a JSON scenario from `configs/` through the full
//! solver pipeline and validates the final fields against physical and
//! structural expectations: density bounds, buoyant rise, divergence removal
//! by the projection, and the double-buffer alternation of the output grid.


pub mod scenarios;

use glam::Vec3;
use orchestrator::{build_solver, RunSnapshot, SimulationConfig, SourceSchedule};
use smoke_kernel::{
    BufferDesc, BufferHandle, CpuBackend, DivergenceFreeProjector, FluidParams, FluidState, GridDims,
    KernelRunner, TempBufferPool,
};
use std::path::Path;

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Density range validation
    pub density_bounds: Option<DensityBoundsCheck>,
    /// Buoyant rise of the density centroid
    pub plume_rise: Option<PlumeRiseCheck>,
    /// Divergence removed by one more projection of the final field
    pub divergence: Option<DivergenceCheck>,
    /// Check that the output grid alternates between two buffers
    pub output_alternation: bool,
}

/// Check that every cell density lies within bounds
#[derive(Debug, Clone)]
pub struct DensityBoundsCheck {
    /// Minimum allowed density
    pub min: f32,
    /// Maximum allowed density, if bounded
    pub max: Option<f32>,
}

/// Check that density has moved upward from its sources
#[derive(Debug, Clone)]
pub struct PlumeRiseCheck {
    /// Minimum rise of the density centroid above the emitter centroid (cells)
    pub min_rise: f32,
}

/// Check that projection reduces divergence of the final, re-forced field
#[derive(Debug, Clone)]
pub struct DivergenceCheck {
    /// Maximum allowed ratio of interior |div v| after vs before projection
    pub max_ratio: f32,
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Final field summary
    pub summary: RunSnapshot,
    /// Number of steps executed
    pub timesteps: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Detail message
    pub message: Option<String>,
}

impl CheckResult {
    fn new(name: &str, passed: bool, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed,
            message: Some(message),
        }
    }
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Path to configuration file
    pub config_path: String,
    /// Number of steps to run; the config's `max_steps` when `None`
    pub timesteps: Option<u64>,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        // Load configuration
        let config = SimulationConfig::load(&self.config_path)?;
        let timesteps = self
            .timesteps
            .or(config.max_steps)
            .ok_or("Test has no step count and the config no max_steps")?;

        // Build solver relative to config directory
        let config_dir = Path::new(&self.config_path)
            .parent()
            .ok_or("Invalid config path")?;
        let mut solver = build_solver(&config, config_dir).map_err(|e| e.to_string())?;
        let sources = SourceSchedule::new(config.emitters.clone(), config.impulses.clone());
        let dt = config.time_step.effective();

        tracing::info!(
            "Initialized: {:?} grid on {}, dt={}",
            config.resolution,
            solver.backend_name(),
            dt
        );

        // Run simulation with fixed timestep
        tracing::info!("Running {} steps...", timesteps);
        let mut sim_time = 0.0_f64;
        let mut outputs = vec![solver.output_buffer()];
        for step in 0..timesteps {
            sources.apply(&mut solver, sim_time).map_err(|e| e.to_string())?;
            solver.update(dt).map_err(|e| e.to_string())?;
            sim_time += dt as f64;
            outputs.push(solver.output_buffer());

            // Log progress every 10% of steps
            if (step + 1) % (timesteps / 10).max(1) == 0 {
                let progress = ((step + 1) as f32 / timesteps as f32) * 100.0;
                tracing::info!("Progress: {:.0}% ({}/{})", progress, step + 1, timesteps);
            }
        }
        tracing::info!("Simulation complete: {} steps, {:.4}s simulated", timesteps, sim_time);

        // Get final state
        let dims = solver.dims();
        let state = solver.read_state().map_err(|e| e.to_string())?;
        let velocity = solver.read_velocity().map_err(|e| e.to_string())?;
        let summary = RunSnapshot::capture(&solver, sim_time).map_err(|e| e.to_string())?;

        // Validate results
        let mut checks = vec![validate_finite(&state, &velocity)];

        if let Some(ref bounds) = self.expected.density_bounds {
            checks.push(validate_density_bounds(&state, bounds));
        }

        if let Some(ref rise) = self.expected.plume_rise {
            checks.push(validate_plume_rise(dims, &state, &config, rise));
        }

        if let Some(ref divergence) = self.expected.divergence {
            checks.push(validate_divergence(
                dims,
                &state,
                &velocity,
                solver.params(),
                dt,
                solver.jacobi_iterations(),
                divergence,
            )?);
        }

        if self.expected.output_alternation {
            checks.push(validate_output_alternation(&outputs));
        }

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            summary,
            timesteps,
            sim_time,
        })
    }
}

/// Validate that no field holds NaN or infinity
fn validate_finite(state: &[FluidState], velocity: &[Vec3]) -> CheckResult {
    let bad_state = state
        .iter()
        .filter(|c| !c.density.is_finite() || !c.temperature.is_finite())
        .count();
    let bad_velocity = velocity.iter().filter(|v| !v.is_finite()).count();
    CheckResult::new(
        "Finite Fields",
        bad_state == 0 && bad_velocity == 0,
        format!("{} non-finite state cells, {} non-finite velocity cells", bad_state, bad_velocity),
    )
}

/// Validate that densities stay within bounds
fn validate_density_bounds(state: &[FluidState], check: &DensityBoundsCheck) -> CheckResult {
    const SLACK: f32 = 1e-6;
    let min = state.iter().map(|c| c.density).fold(f32::INFINITY, f32::min);
    let max = state.iter().map(|c| c.density).fold(f32::NEG_INFINITY, f32::max);

    let low_ok = min >= check.min - SLACK;
    let high_ok = check.max.map_or(true, |limit| max <= limit + SLACK);
    let limit = match check.max {
        Some(limit) => format!("[{:.6}, {:.6}]", check.min, limit),
        None => format!("[{:.6}, inf)", check.min),
    };
    CheckResult::new(
        "Density Bounds",
        low_ok && high_ok,
        format!("Range [{:.6}, {:.6}], limit {}", min, max, limit),
    )
}

/// Validate that the density centroid sits above the emitters
fn validate_plume_rise(
    dims: GridDims,
    state: &[FluidState],
    config: &SimulationConfig,
    check: &PlumeRiseCheck,
) -> CheckResult {
    let total: f32 = state.iter().map(|c| c.density).sum();
    let weight: f32 = config.emitters.iter().map(|e| e.density).sum();
    if total <= 0.0 || weight <= 0.0 {
        return CheckResult::new("Plume Rise", false, "No density to track".to_string());
    }

    let centroid = state
        .iter()
        .enumerate()
        .map(|(i, c)| c.density * dims.position(i).y)
        .sum::<f32>()
        / total;
    let source = config
        .emitters
        .iter()
        .map(|e| e.density * e.position[1])
        .sum::<f32>()
        / weight;
    let rise = centroid - source;

    CheckResult::new(
        "Plume Rise",
        rise >= check.min_rise,
        format!(
            "Centroid y {:.2} vs source y {:.2}: rise {:.2} cells (min {:.2})",
            centroid, source, rise, check.min_rise
        ),
    )
}

/// Re-apply the step's forces to the final velocity and project once more on
/// the CPU, comparing interior divergence before and after.
fn validate_divergence(
    dims: GridDims,
    state: &[FluidState],
    velocity: &[Vec3],
    params: &FluidParams,
    dt: f32,
    iterations: u32,
    check: &DivergenceCheck,
) -> Result<CheckResult, String> {
    let damping = params.drag_factor(dt);
    let forced: Vec<Vec3> = velocity
        .iter()
        .zip(state)
        .map(|(v, s)| (*v + Vec3::Y * params.lift(s.density, s.temperature) * dt) * damping)
        .collect();

    let projected = project_on_cpu(dims, &forced, iterations).map_err(|e| e.to_string())?;
    let before = interior_divergence(dims, &forced);
    let after = interior_divergence(dims, &projected);
    if before <= 0.0 {
        return Ok(CheckResult::new(
            "Divergence Reduction",
            true,
            "Field already divergence-free".to_string(),
        ));
    }

    let ratio = after / before;
    Ok(CheckResult::new(
        "Divergence Reduction",
        ratio <= check.max_ratio,
        format!(
            "Interior |div v| {:.4} -> {:.4} (ratio {:.3}, limit {:.3})",
            before, after, ratio, check.max_ratio
        ),
    ))
}

fn project_on_cpu(
    dims: GridDims,
    velocity: &[Vec3],
    iterations: u32,
) -> Result<Vec<Vec3>, smoke_kernel::BackendError> {
    let mut runner = KernelRunner::new(Box::new(CpuBackend::new()), dims)?;
    let handle = runner
        .backend_mut()
        .create_buffer(BufferDesc::new("velocity", dims.cell_count(), 3))?;
    let pool = TempBufferPool::new(runner.backend_mut(), dims.cell_count(), 1)?;
    runner
        .backend_mut()
        .write_buffer(handle, bytemuck::cast_slice(velocity))?;
    DivergenceFreeProjector::with_iterations(pool.buffer(0), iterations).make_divergence_free(&mut runner, handle)?;

    let data = runner.backend().read_buffer(handle)?;
    Ok(bytemuck::cast_slice::<f32, Vec3>(&data)[..dims.cell_count()].to_vec())
}

/// Sum of |div v| over cells whose face neighbors all lie inside the grid
fn interior_divergence(dims: GridDims, v: &[Vec3]) -> f32 {
    let at = |x: u32, y: u32, z: u32| v[dims.index(x, y, z)];
    let (z_lo, z_hi) = if dims.is_2d() { (0, 1) } else { (1, dims.depth - 1) };
    let mut sum = 0.0_f32;
    for z in z_lo..z_hi {
        for y in 1..dims.height.saturating_sub(1) {
            for x in 1..dims.width.saturating_sub(1) {
                let dz = if dims.is_2d() {
                    0.0
                } else {
                    at(x, y, z + 1).z - at(x, y, z - 1).z
                };
                let div = 0.5 * ((at(x + 1, y, z).x - at(x - 1, y, z).x) + (at(x, y + 1, z).y - at(x, y - 1, z).y) + dz);
                sum += div.abs();
            }
        }
    }
    sum
}

/// Validate that the output grid swaps buffers every step with period 2
fn validate_output_alternation(outputs: &[BufferHandle]) -> CheckResult {
    let swaps = outputs.windows(2).all(|w| w[0] != w[1]);
    let period_two = outputs.windows(3).all(|w| w[0] == w[2]);
    CheckResult::new(
        "Output Alternation",
        swaps && period_two,
        format!("{} handles observed", outputs.len()),
    )
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Timesteps: {}", self.timesteps);
        println!("Simulated time: {:.4} s", self.sim_time);
        println!("\nFinal Fields:");
        println!("  Total density: {:.6}", self.summary.total_density);
        println!(
            "  Density range: [{:.6}, {:.6}]",
            self.summary.min_density, self.summary.max_density
        );
        println!("  Max speed: {:.4} cells/s", self.summary.max_speed);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
