//! End-to-end `FluidSolver` scenarios on the CPU backend.

use std::sync::{Arc, Mutex};

use glam::Vec3;
use smoke_kernel::{
    AdvectionScheme, CpuBackend, FluidParams, FluidSolver, FluidState, GridDims, SolverSettings, TextureSink,
    VisualizationMode,
};

fn solver(settings: SolverSettings) -> FluidSolver {
    FluidSolver::new(Box::new(CpuBackend::new()), settings).unwrap()
}

fn inert(dims: GridDims) -> FluidSolver {
    let mut settings = SolverSettings::new(dims);
    settings.params = FluidParams::inert();
    solver(settings)
}

/// Sink whose frames can be inspected after it is handed to the solver.
#[derive(Clone, Default)]
struct SharedSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TextureSink for SharedSink {
    fn write_texels(&mut self, _dims: GridDims, texels: &[u8]) {
        self.frames.lock().unwrap().push(texels.to_vec());
    }
}

#[test]
fn still_fluid_stays_in_its_cell() {
    let dims = GridDims::new(4, 4, 4);
    let mut s = inert(dims);
    s.set_fluid(Vec3::new(2.0, 2.0, 2.0), 1.0, 5.0).unwrap();
    s.update(0.016).unwrap();

    let state = s.read_state().unwrap();
    for (i, cell) in state.iter().enumerate() {
        let expected = if dims.coords(i) == [2, 2, 2] { 1.0 } else { 0.0 };
        assert_eq!(cell.density, expected, "cell {:?}", dims.coords(i));
    }
    assert!(s.read_velocity().unwrap().iter().all(|v| *v == Vec3::ZERO));
}

#[test]
fn output_buffer_alternates_every_update() {
    let mut s = inert(GridDims::new(4, 4, 1));
    let first = s.output_buffer();
    s.update(0.01).unwrap();
    let second = s.output_buffer();
    assert_ne!(first, second);
    s.update(0.01).unwrap();
    assert_eq!(s.output_buffer(), first);
    s.update(0.01).unwrap();
    assert_eq!(s.output_buffer(), second);
    assert_eq!(s.step_count(), 3);
}

#[test]
fn hot_block_rises() {
    let dims = GridDims::new(16, 16, 1);
    let mut s = solver(SolverSettings::new(dims));
    let centroid_y = |state: &[FluidState]| {
        let total: f32 = state.iter().map(|c| c.density).sum();
        let moment: f32 = state
            .iter()
            .enumerate()
            .map(|(i, c)| c.density * dims.coords(i)[1] as f32)
            .sum();
        moment / total
    };

    for _ in 0..10 {
        for x in 6..10 {
            for y in 2..5 {
                s.set_fluid(Vec3::new(x as f32, y as f32, 0.0), 0.01, 10.0).unwrap();
            }
        }
        s.update(0.02).unwrap();
    }

    let state = s.read_state().unwrap();
    let y = centroid_y(&state);
    println!("density centroid y = {y:.3} (source centroid 3.0)");
    assert!(y > 4.5, "plume centroid only reached y = {y}");

    let velocity = s.read_velocity().unwrap();
    assert!(velocity[dims.index(7, 3, 0)].y > 0.0);
    for c in &state {
        assert!(c.density >= 0.0 && c.density <= 0.01 + 1e-6, "{c:?}");
    }
}

#[test]
fn semi_lagrangian_solver_runs_fewer_dispatches() {
    let dims = GridDims::new(4, 4, 4);
    let mut settings = SolverSettings::new(dims);
    settings.advection = AdvectionScheme::SemiLagrangian;
    let mut s = solver(settings);
    s.update(0.01).unwrap();
    // 1 + 1 + (2 + 20) + 1 + 1
    assert_eq!(s.runner().dispatch_count(), 26);
}

#[test]
fn texture_receives_gamma_corrected_density() {
    let dims = GridDims::new(4, 4, 4);
    let mut s = inert(dims);
    let sink = SharedSink::default();
    assert!(s.attach_texture_sink(Box::new(sink.clone())).is_none());

    s.set_output_write_gamma_power(0.5);
    s.set_fluid(Vec3::new(2.0, 2.0, 2.0), 0.25, 0.0).unwrap();
    s.set_fluid(Vec3::new(1.0, 1.0, 1.0), 3.0, 0.0).unwrap();
    s.update(0.016).unwrap();

    let frames = sink.frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.len(), dims.cell_count());
    // sqrt(0.25) = 0.5
    assert!(frame[dims.index(2, 2, 2)].abs_diff(128) <= 1, "{}", frame[dims.index(2, 2, 2)]);
    // Saturates.
    assert_eq!(frame[dims.index(1, 1, 1)], 255);
    assert_eq!(frame[dims.index(0, 3, 0)], 0);
}

#[test]
fn velocity_visualization_shows_speed() {
    let dims = GridDims::new(4, 4, 1);
    let mut s = inert(dims);
    let sink = SharedSink::default();
    s.attach_texture_sink(Box::new(sink.clone()));
    s.set_visualization_mode(VisualizationMode::Velocity);
    s.update(0.01).unwrap();

    let frames = sink.frames.lock().unwrap();
    assert!(frames[0].iter().all(|&t| t == 0));
}

#[test]
fn detached_sink_stops_receiving_frames() {
    let mut s = inert(GridDims::new(4, 4, 1));
    let sink = SharedSink::default();
    s.attach_texture_sink(Box::new(sink.clone()));
    s.update(0.01).unwrap();
    assert!(s.detach_texture_sink().is_some());
    s.update(0.01).unwrap();
    assert_eq!(sink.frames.lock().unwrap().len(), 1);
}

#[test]
fn params_changes_apply_on_next_update() {
    let dims = GridDims::new(8, 8, 1);
    let mut s = inert(dims);
    s.set_fluid(Vec3::new(4.0, 4.0, 0.0), 0.0, 10.0).unwrap();
    s.update(0.02).unwrap();
    assert!(s.read_velocity().unwrap().iter().all(|v| *v == Vec3::ZERO));

    s.params_mut().temperature_buoyancy = 100.0;
    s.update(0.02).unwrap();
    let lifted = s.read_velocity().unwrap().iter().any(|v| v.y != 0.0);
    assert!(lifted);
}
