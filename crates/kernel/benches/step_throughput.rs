//! Solver throughput across grid sizes.
//!
//! Run with: cargo bench -p smoke-kernel --bench step_throughput
//! Add `--features gpu` to include the wgpu backend.

use std::time::Instant;

use glam::Vec3;
use smoke_kernel::{ComputeBackend, CpuBackend, FluidSolver, GridDims, SolverSettings};

fn bench(label: &str, make: &dyn Fn() -> Option<Box<dyn ComputeBackend>>, dims: GridDims, steps: u32) {
    let Some(backend) = make() else {
        return;
    };
    let mut solver = match FluidSolver::new(backend, SolverSettings::new(dims)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{label}: {e}");
            return;
        }
    };
    let source = dims.extent() * Vec3::new(0.5, 0.1, 0.5);
    let dt = 0.02_f32;

    // Warmup
    for _ in 0..2 {
        solver.set_fluid(source, 0.02, 8.0).unwrap();
        solver.update(dt).unwrap();
    }

    let start = Instant::now();
    for _ in 0..steps {
        solver.set_fluid(source, 0.02, 8.0).unwrap();
        solver.update(dt).unwrap();
    }
    let elapsed = start.elapsed().as_secs_f64();
    let sps = steps as f64 / elapsed;
    let ms_per_step = elapsed * 1000.0 / steps as f64;
    let cells = dims.cell_count();

    println!(
        "{:>6} {:>14} {:>10} {:>8} {:>10.3} {:>12.1} {:>12.2}",
        label,
        format!("{}x{}x{}", dims.width, dims.height, dims.depth),
        cells,
        steps,
        elapsed,
        sps,
        ms_per_step
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Smoke Solver Throughput ===\n");

    // (grid, steps) -- fewer steps at larger sizes
    let configs = [
        (GridDims::new(128, 128, 1), 50),
        (GridDims::new(512, 512, 1), 10),
        (GridDims::new(32, 32, 32), 20),
        (GridDims::new(64, 64, 64), 5),
    ];

    println!(
        "{:>6} {:>14} {:>10} {:>8} {:>10} {:>12} {:>12}",
        "Backend", "Grid", "Cells", "Steps", "Time (s)", "steps/s", "ms/step"
    );

    let cpu = || Some(Box::new(CpuBackend::new()) as Box<dyn ComputeBackend>);
    for &(dims, steps) in &configs {
        bench("cpu", &cpu, dims, steps);
    }

    #[cfg(feature = "gpu")]
    {
        let gpu = || match smoke_kernel::GpuBackend::new() {
            Ok(g) => Some(Box::new(g) as Box<dyn ComputeBackend>),
            Err(e) => {
                eprintln!("Skipping GPU backend: {e}");
                None
            }
        };
        for &(dims, steps) in &configs {
            bench("wgpu", &gpu, dims, steps);
        }
    }
}
