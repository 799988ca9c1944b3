//! Per-cell kernel bodies for the CPU backend.
//!
//! Each function is one dispatch: it walks every cell of the domain in
//! parallel and writes only that cell's output. The element-generic bodies are
//! monomorphized once per [`GridElement`].

use glam::Vec3;
use rayon::prelude::*;

use crate::grid::{FluidState, GridDims, GridElement};
use crate::params::FluidParams;
use crate::sampling::{clamp_to_neighbors, neighbors_with, sample};

/// Weight of the MacCormack error estimate, in `[0, 1]`.
pub const MACCORMACK_STRENGTH: f32 = 0.8;

/// Divisor of the Jacobi pressure update (six face neighbors).
pub const JACOBI_DIVISOR: f32 = 6.0;

// ---------------------------------------------------------------------------
// Advection
// ---------------------------------------------------------------------------

/// `output[c] = sample(input, pos(c) - velocity[c] * dt)`.
pub fn advect_backtrace<T: GridElement>(
    dims: GridDims,
    velocity: &[Vec3],
    input: &[T],
    output: &mut [T],
    dt: f32,
) {
    output.par_iter_mut().enumerate().for_each(|(i, out)| {
        let prev = dims.position(i) - velocity[i] * dt;
        *out = sample(input, dims, prev);
    });
}

/// MacCormack correction of the forward result held in `target`.
///
/// `target[c] = forward + 0.5 * strength * (original - backward)`, clamped to
/// the range of the `original` cells bracketing the backtraced position.
pub fn maccormack_correct<T: GridElement>(
    dims: GridDims,
    velocity: &[Vec3],
    backward: &[T],
    original: &[T],
    target: &mut [T],
    dt: f32,
) {
    let weight = 0.5 * MACCORMACK_STRENGTH;
    target.par_iter_mut().enumerate().for_each(|(i, t)| {
        let corrected = *t + (original[i] - backward[i]) * weight;
        let prev = dims.position(i) - velocity[i] * dt;
        *t = clamp_to_neighbors(corrected, original, dims, prev);
    });
}

// ---------------------------------------------------------------------------
// Forces and sources
// ---------------------------------------------------------------------------

/// Buoyancy and density weight along +y, then drag.
pub fn apply_forces(params: &FluidParams, state: &[FluidState], velocity: &mut [Vec3], dt: f32) {
    let damping = params.drag_factor(dt);
    velocity.par_iter_mut().zip(state.par_iter()).for_each(|(v, s)| {
        v.y += params.lift(s.density, s.temperature) * dt;
        *v *= damping;
    });
}

/// Exponential-ish temperature decay.
pub fn cool_fluid(params: &FluidParams, state: &mut [FluidState], dt: f32) {
    let factor = params.cooling_factor(dt);
    state.par_iter_mut().for_each(|s| s.temperature *= factor);
}

/// Overwrite one cell.
pub fn set_fluid(dims: GridDims, state: &mut [FluidState], cell: [u32; 3], value: FluidState) {
    state[dims.index(cell[0], cell[1], cell[2])] = value;
}

/// Accumulate into one cell.
pub fn add_fluid(dims: GridDims, state: &mut [FluidState], cell: [u32; 3], value: FluidState) {
    let i = dims.index(cell[0], cell[1], cell[2]);
    state[i] = state[i] + value;
}

/// Add velocity to one cell.
pub fn apply_impulse(dims: GridDims, velocity: &mut [Vec3], cell: [u32; 3], impulse: Vec3) {
    velocity[dims.index(cell[0], cell[1], cell[2])] += impulse;
}

// ---------------------------------------------------------------------------
// Projection
//
// The scratch buffer is channel-interleaved with `stride` floats per cell:
// channel 0 holds divergence, channels 1 and 2 the pressure ping-pong pair.
// ---------------------------------------------------------------------------

/// Central-difference divergence into channel 0; pressure channels zeroed.
pub fn project_divergence(dims: GridDims, velocity: &[Vec3], scratch: &mut [f32], stride: usize) {
    scratch
        .par_chunks_mut(stride)
        .take(dims.cell_count())
        .enumerate()
        .for_each(|(i, cell)| {
            let [x, y, z] = dims.coords(i);
            let v = neighbors_with(dims, x, y, z, |j| velocity[j]);
            cell[0] = 0.5 * ((v.e.x - v.w.x) + (v.s.y - v.n.y) + (v.u.z - v.d.z));
            cell[1] = 0.0;
            cell[2] = 0.0;
        });
}

/// One Jacobi sweep: `p[write] = (sum of neighbor p[read] - divergence) / 6`.
pub fn project_jacobi(dims: GridDims, scratch: &mut [f32], stride: usize, read: usize, write: usize) {
    let pressure: Vec<f32> = scratch
        .iter()
        .skip(read)
        .step_by(stride)
        .take(dims.cell_count())
        .copied()
        .collect();
    scratch
        .par_chunks_mut(stride)
        .take(dims.cell_count())
        .enumerate()
        .for_each(|(i, cell)| {
            let [x, y, z] = dims.coords(i);
            let p = neighbors_with(dims, x, y, z, |j| pressure[j]);
            let sum = p.n + p.s + p.e + p.w + p.u + p.d;
            cell[write] = (sum - cell[0]) / JACOBI_DIVISOR;
        });
}

/// `velocity -= 0.5 * grad(p)` using the pressure in `channel`.
pub fn project_subtract_gradient(
    dims: GridDims,
    scratch: &[f32],
    stride: usize,
    channel: usize,
    velocity: &mut [Vec3],
) {
    velocity.par_iter_mut().enumerate().for_each(|(i, v)| {
        let [x, y, z] = dims.coords(i);
        let p = neighbors_with(dims, x, y, z, |j| scratch[j * stride + channel]);
        *v -= 0.5 * Vec3::new(p.e - p.w, p.s - p.n, p.u - p.d);
    });
}

// ---------------------------------------------------------------------------
// Visualization
// ---------------------------------------------------------------------------

/// `clamp(density, 0, 1)^gamma` into channel 0 of each output cell.
pub fn visualize_density(state: &[FluidState], output: &mut [f32], stride: usize, gamma: f32) {
    output
        .par_chunks_mut(stride)
        .zip(state.par_iter())
        .for_each(|(cell, s)| cell[0] = s.density.clamp(0.0, 1.0).powf(gamma));
}

/// `clamp(|velocity|, 0, 1)` into channel 0 of each output cell.
pub fn visualize_velocity(velocity: &[Vec3], output: &mut [f32], stride: usize) {
    output
        .par_chunks_mut(stride)
        .zip(velocity.par_iter())
        .for_each(|(cell, v)| cell[0] = v.length().clamp(0.0, 1.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_velocity_advection_is_identity() {
        let dims = GridDims::new(4, 3, 2);
        let input: Vec<FluidState> = (0..dims.cell_count())
            .map(|i| FluidState::new(i as f32, 1.0))
            .collect();
        let velocity = vec![Vec3::ZERO; dims.cell_count()];
        let mut output = vec![FluidState::default(); dims.cell_count()];
        advect_backtrace(dims, &velocity, &input, &mut output, 0.5);
        for (a, b) in input.iter().zip(&output) {
            assert!((a.density - b.density).abs() < 0.05);
        }
    }

    #[test]
    fn uniform_translation_shifts_field_by_one_cell() {
        let dims = GridDims::new(6, 1, 1);
        let input: Vec<f32> = vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let input: Vec<FluidState> = input.into_iter().map(|d| FluidState::new(d, 0.0)).collect();
        let velocity = vec![Vec3::X; dims.cell_count()];
        let mut output = vec![FluidState::default(); dims.cell_count()];
        advect_backtrace(dims, &velocity, &input, &mut output, 1.0);
        assert!((output[3].density - 1.0).abs() < 1e-3, "{:?}", output);
        assert!(output[2].density.abs() < 1e-2);
    }

    #[test]
    fn maccormack_result_stays_within_original_neighbors() {
        let dims = GridDims::new(8, 8, 1);
        let original: Vec<FluidState> = (0..dims.cell_count())
            .map(|i| FluidState::new(if i % 3 == 0 { 1.0 } else { 0.0 }, 0.0))
            .collect();
        let velocity = vec![Vec3::new(0.7, -0.4, 0.0); dims.cell_count()];
        let mut forward = vec![FluidState::default(); dims.cell_count()];
        let mut backward = vec![FluidState::default(); dims.cell_count()];
        advect_backtrace(dims, &velocity, &original, &mut forward, 1.0);
        advect_backtrace(dims, &velocity, &forward, &mut backward, -1.0);
        maccormack_correct(dims, &velocity, &backward, &original, &mut forward, 1.0);
        for s in &forward {
            assert!((0.0..=1.0).contains(&s.density), "overshoot: {}", s.density);
        }
    }

    #[test]
    fn forces_lift_hot_cells_and_apply_drag() {
        let params = FluidParams { density_weight: 0.0, temperature_buoyancy: 10.0, cooling_rate: 0.0, drag: 5.0 };
        let state = vec![FluidState::new(0.0, 1.0)];
        let mut velocity = vec![Vec3::new(1.0, 0.0, 0.0)];
        apply_forces(&params, &state, &mut velocity, 0.1);
        assert!((velocity[0].y - 0.5).abs() < 1e-6);
        assert!((velocity[0].x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn jacobi_reads_one_channel_and_writes_the_other() {
        let dims = GridDims::new(3, 1, 1);
        let mut scratch = vec![0.0; dims.cell_count() * 3];
        scratch[3] = -6.0; // divergence at the middle cell
        project_jacobi(dims, &mut scratch, 3, 1, 2);
        assert_eq!(scratch[3 + 2], 1.0);
        assert_eq!(scratch[3 + 1], 0.0);
    }

    #[test]
    fn divergence_of_expanding_field_is_positive() {
        let dims = GridDims::new(3, 3, 3);
        let velocity: Vec<Vec3> = (0..dims.cell_count())
            .map(|i| dims.position(i) - Vec3::ONE)
            .collect();
        let mut scratch = vec![9.0; dims.cell_count() * 3];
        project_divergence(dims, &velocity, &mut scratch, 3);
        let center = dims.index(1, 1, 1) * 3;
        assert_eq!(scratch[center], 3.0);
        assert_eq!(scratch[center + 1], 0.0);
        assert_eq!(scratch[center + 2], 0.0);
    }

    #[test]
    fn density_visualization_applies_gamma_after_clamp() {
        let state = vec![FluidState::new(0.25, 0.0), FluidState::new(4.0, 0.0)];
        let mut out = vec![0.0; 6];
        visualize_density(&state, &mut out, 3, 0.5);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert_eq!(out[3], 1.0);
    }
}
