//! Pressure projection removes divergence.
//!
//! A point source `v = d / (|d|^2 + 1)` around the grid center is strongly
//! divergent everywhere. After one projection the central-difference
//! divergence over interior cells must drop, both in total and at its peak.

use glam::Vec3;
use smoke_kernel::{
    BufferDesc, CpuBackend, DivergenceFreeProjector, GridDims, KernelRunner, TempBufferPool,
    DEFAULT_JACOBI_ITERATIONS,
};

fn point_source(dims: GridDims) -> Vec<Vec3> {
    let center = Vec3::splat((dims.width as f32 - 1.0) * 0.5);
    (0..dims.cell_count())
        .map(|i| {
            let d = dims.position(i) - center;
            d / (d.length_squared() + 1.0)
        })
        .collect()
}

/// Sum and max of |div v| over cells whose six neighbors are all inside.
fn interior_divergence(dims: GridDims, v: &[Vec3]) -> (f32, f32) {
    let at = |x: u32, y: u32, z: u32| v[dims.index(x, y, z)];
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for z in 1..dims.depth - 1 {
        for y in 1..dims.height - 1 {
            for x in 1..dims.width - 1 {
                let div = 0.5
                    * ((at(x + 1, y, z).x - at(x - 1, y, z).x)
                        + (at(x, y + 1, z).y - at(x, y - 1, z).y)
                        + (at(x, y, z + 1).z - at(x, y, z - 1).z));
                sum += div.abs();
                max = max.max(div.abs());
            }
        }
    }
    (sum, max)
}

fn project(dims: GridDims, velocity: &[Vec3], iterations: u32) -> Vec<Vec3> {
    let mut runner = KernelRunner::new(Box::new(CpuBackend::new()), dims).unwrap();
    let cells = dims.cell_count();
    let handle = runner
        .backend_mut()
        .create_buffer(BufferDesc::new("velocity", cells, 3))
        .unwrap();
    let pool = TempBufferPool::new(runner.backend_mut(), cells, 2).unwrap();
    runner
        .backend_mut()
        .write_buffer(handle, bytemuck::cast_slice(velocity))
        .unwrap();

    DivergenceFreeProjector::with_iterations(pool.buffer(1), iterations)
        .make_divergence_free(&mut runner, handle)
        .unwrap();

    let data = runner.backend().read_buffer(handle).unwrap();
    bytemuck::cast_slice::<f32, Vec3>(&data)[..cells].to_vec()
}

#[test]
fn projection_reduces_point_source_divergence() {
    let dims = GridDims::new(8, 8, 8);
    let before = point_source(dims);
    let after = project(dims, &before, DEFAULT_JACOBI_ITERATIONS);

    let (sum0, max0) = interior_divergence(dims, &before);
    let (sum1, max1) = interior_divergence(dims, &after);
    println!("sum |div|: {sum0:.3} -> {sum1:.3}, max |div|: {max0:.3} -> {max1:.3}");

    assert!(sum1 < sum0 * 0.8, "total divergence {sum0} -> {sum1}");
    assert!(max1 < max0 * 0.6, "peak divergence {max0} -> {max1}");
    assert!(after.iter().all(|v| v.is_finite()));
}

#[test]
fn zero_iterations_leave_velocity_unchanged() {
    // With no sweeps the pressure stays zero and the gradient is zero.
    let dims = GridDims::new(6, 6, 6);
    let before = point_source(dims);
    let after = project(dims, &before, 0);
    assert_eq!(before, after);
}

#[test]
fn divergence_free_field_is_a_fixed_point() {
    let dims = GridDims::new(6, 6, 6);
    let uniform = vec![Vec3::new(0.3, -0.2, 0.1); dims.cell_count()];
    let after = project(dims, &uniform, DEFAULT_JACOBI_ITERATIONS);
    for (a, b) in uniform.iter().zip(&after) {
        assert!((*a - *b).length() < 1e-6, "{a} -> {b}");
    }
}
