//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which steps a `FluidSolver` in
//! a background thread, including start, pause, resume, stop, and status
//! tracking.

use smoke_kernel::{BackendError, FluidSolver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::sources::SourceSchedule;

/// Steps between refreshes of the summary snapshot.
pub const SNAPSHOT_INTERVAL: u64 = 10;

/// Runner state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (reached stopping condition or stopped)
    Finished,
    /// Simulation encountered an error
    Error,
}

/// Summary statistics of the fluid at one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSnapshot {
    /// Completed steps when captured
    pub step: u64,
    /// Simulated time when captured (seconds)
    pub sim_time: f64,
    /// Sum of density over all cells
    pub total_density: f64,
    /// Largest cell density
    pub max_density: f32,
    /// Smallest cell density
    pub min_density: f32,
    /// Largest velocity magnitude
    pub max_speed: f32,
}

impl RunSnapshot {
    /// Read the solver grids back and summarize them.
    pub fn capture(solver: &FluidSolver, sim_time: f64) -> Result<Self, BackendError> {
        let state = solver.read_state()?;
        let velocity = solver.read_velocity()?;
        let mut snapshot = Self {
            step: solver.step_count(),
            sim_time,
            min_density: f32::INFINITY,
            ..Self::default()
        };
        for cell in &state {
            snapshot.total_density += cell.density as f64;
            snapshot.max_density = snapshot.max_density.max(cell.density);
            snapshot.min_density = snapshot.min_density.min(cell.density);
        }
        snapshot.max_speed = velocity.iter().map(|v| v.length()).fold(0.0, f32::max);
        Ok(snapshot)
    }
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Current simulation time (seconds)
    sim_time: f64,
    /// Number of steps executed
    step_count: u64,
    /// Most recent summary
    snapshot: Option<RunSnapshot>,
    /// Most recent error message (if state is Error)
    error_message: Option<String>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Arc<Mutex<SharedState>>,
    /// Handle to the background thread; yields the solver back on exit
    thread_handle: Option<thread::JoinHandle<FluidSolver>>,
}

impl SimulationRunner {
    /// Create a new simulation runner around `solver`
    ///
    /// # Arguments
    /// * `solver` - The solver to step
    /// * `sources` - Emitters and impulses applied before every step
    /// * `dt` - Seconds advanced per step
    /// * `max_steps` - Optional maximum number of steps
    pub fn new(solver: FluidSolver, sources: SourceSchedule, dt: f32, max_steps: Option<u64>) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            sim_time: 0.0,
            step_count: 0,
            snapshot: None,
            error_message: None,
        }));

        let shared_clone = Arc::clone(&shared);

        // Spawn background thread
        let thread_handle = thread::spawn(move || {
            let mut solver = solver;
            run_simulation_loop(&mut solver, &sources, shared_clone, dt, max_steps);
            solver
        });

        Self {
            shared,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Get current step count
    pub fn step_count(&self) -> u64 {
        lock(&self.shared).step_count
    }

    /// Most recent summary, refreshed every [`SNAPSHOT_INTERVAL`] steps and on exit
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        lock(&self.shared).snapshot
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Ask the simulation thread to finish after the current step
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if state.state != RunnerState::Error {
            state.state = RunnerState::Finished;
        }
    }

    /// Wait for the simulation thread to complete and take the solver back
    pub fn join(mut self) -> Result<FluidSolver, String> {
        match self.thread_handle.take() {
            Some(handle) => handle.join().map_err(|_| "Thread panicked".to_string()),
            None => Err("Simulation thread already joined".to_string()),
        }
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit, including one that was never started
        let mut state = lock(&self.shared);
        if state.state != RunnerState::Error {
            state.state = RunnerState::Finished;
        }
    }
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    solver: &mut FluidSolver,
    sources: &SourceSchedule,
    shared: Arc<Mutex<SharedState>>,
    dt: f32,
    max_steps: Option<u64>,
) {
    // Wait for start signal
    loop {
        let state = lock(&shared).state;
        match state {
            RunnerState::Created => {
                // Wait a bit and check again
                thread::sleep(Duration::from_millis(10));
            }
            RunnerState::Running => break,
            _ => return, // Exit if finished or error
        }
    }

    let start_wall_time = Instant::now();
    let mut sim_time = 0.0_f64;
    let mut step_count = 0_u64;

    loop {
        let current_state = lock(&shared).state;

        match current_state {
            RunnerState::Running => {
                let step = sources
                    .apply(solver, sim_time)
                    .and_then(|()| solver.update(dt));
                if let Err(e) = step {
                    tracing::error!("Simulation step {} failed: {}", step_count + 1, e);
                    let mut guard = lock(&shared);
                    guard.state = RunnerState::Error;
                    guard.error_message = Some(e.to_string());
                    break;
                }

                // Update counters
                sim_time += dt as f64;
                step_count += 1;

                let snapshot = if step_count % SNAPSHOT_INTERVAL == 0 {
                    capture(solver, sim_time)
                } else {
                    None
                };

                // Update shared state
                {
                    let mut guard = lock(&shared);
                    guard.sim_time = sim_time;
                    guard.step_count = step_count;
                    if snapshot.is_some() {
                        guard.snapshot = snapshot;
                    }
                }

                // Check stopping condition
                if let Some(max_steps) = max_steps {
                    if step_count >= max_steps {
                        tracing::info!("Simulation finished: reached max_steps = {}", max_steps);
                        break;
                    }
                }

                // Log progress periodically
                if step_count % 100 == 0 {
                    let wall_time = start_wall_time.elapsed().as_secs_f64();
                    tracing::debug!(
                        "Step {}: sim_time={:.4}s, wall_time={:.2}s, {:.1} steps/s",
                        step_count,
                        sim_time,
                        wall_time,
                        step_count as f64 / wall_time.max(1e-9),
                    );
                }
            }
            RunnerState::Paused => {
                // Wait while paused
                thread::sleep(Duration::from_millis(50));
            }
            RunnerState::Finished | RunnerState::Error | RunnerState::Created => {
                // Exit loop
                break;
            }
        }
    }

    if lock(&shared).state != RunnerState::Error {
        // Publish the final summary before reporting Finished
        let last = capture(solver, sim_time);
        let mut guard = lock(&shared);
        if let Some(snapshot) = last {
            tracing::info!(
                "Simulation summary: total density {:.4}, max density {:.4}, max speed {:.3}",
                snapshot.total_density,
                snapshot.max_density,
                snapshot.max_speed
            );
            guard.snapshot = Some(snapshot);
        }
        if guard.state != RunnerState::Error {
            guard.state = RunnerState::Finished;
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} steps, {:.4}s simulated",
        step_count,
        sim_time
    );
}

fn capture(solver: &FluidSolver, sim_time: f64) -> Option<RunSnapshot> {
    match RunSnapshot::capture(solver, sim_time) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("Failed to read back solver state: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmitMode, EmitterConfig};
    use smoke_kernel::{CpuBackend, GridDims, SolverSettings};

    fn make_runner(max_steps: Option<u64>) -> SimulationRunner {
        let dims = GridDims::new(8, 8, 1);
        let solver = FluidSolver::new(Box::new(CpuBackend::new()), SolverSettings::new(dims)).unwrap();
        let sources = SourceSchedule::new(
            vec![EmitterConfig {
                position: [4.0, 1.0, 0.0],
                density: 0.01,
                temperature: 10.0,
                mode: EmitMode::Set,
                sweep: None,
            }],
            Vec::new(),
        );
        SimulationRunner::new(solver, sources, 0.02, max_steps)
    }

    #[test]
    fn test_runner_lifecycle() {
        let runner = make_runner(Some(10));

        // Initially Created
        assert_eq!(runner.state(), RunnerState::Created);

        // Start
        runner.start();
        assert!(matches!(runner.state(), RunnerState::Running | RunnerState::Finished));

        // Wait a bit for it to run
        thread::sleep(Duration::from_millis(100));

        // Should have made progress or finished
        let steps = runner.step_count();
        assert!(steps <= 10);

        // Wait for completion
        let shared = Arc::clone(&runner.shared);
        let solver = runner.join().unwrap();
        assert_eq!(solver.step_count(), 10);

        let guard = lock(&shared);
        assert_eq!(guard.state, RunnerState::Finished);
        assert_eq!(guard.step_count, 10);
        assert!((guard.sim_time - 0.2).abs() < 1e-6);
        let snapshot = guard.snapshot.unwrap();
        assert_eq!(snapshot.step, 10);
        assert!(snapshot.total_density > 0.0);
        assert!(snapshot.min_density >= 0.0);
    }

    #[test]
    fn test_runner_pause_resume() {
        let runner = make_runner(Some(200));

        runner.start();
        thread::sleep(Duration::from_millis(20));

        // Pause
        runner.pause();

        // Wait for pause to take effect
        thread::sleep(Duration::from_millis(100));
        let state = runner.state();
        if state == RunnerState::Finished {
            // Ran to completion before the pause landed
            return;
        }
        assert_eq!(state, RunnerState::Paused);

        let steps_paused = runner.step_count();
        thread::sleep(Duration::from_millis(100));

        // Should not advance significantly while paused (allow for 1 step race condition)
        let steps_after_pause = runner.step_count();
        assert!(
            steps_after_pause <= steps_paused + 1,
            "Steps should not advance while paused: before={}, after={}",
            steps_paused,
            steps_after_pause
        );

        // Resume
        runner.resume();
        assert!(matches!(runner.state(), RunnerState::Running | RunnerState::Finished));

        let solver = runner.join().unwrap();
        assert_eq!(solver.step_count(), 200);
    }

    #[test]
    fn test_stop_without_start_releases_thread() {
        let runner = make_runner(None);
        runner.stop();
        let solver = runner.join().unwrap();
        assert_eq!(solver.step_count(), 0);
    }

    #[test]
    fn test_unbounded_run_stops_on_request() {
        let runner = make_runner(None);
        runner.start();
        thread::sleep(Duration::from_millis(50));
        runner.stop();
        assert_eq!(runner.state(), RunnerState::Finished);
        let solver = runner.join().unwrap();
        assert!(solver.step_count() > 0);
    }
}
