//! The reference scenarios, shared by the binary and `cargo test`.

use crate::{DensityBoundsCheck, DivergenceCheck, ExpectedResult, PlumeRiseCheck, ReferenceTest};

/// Resolve a path relative to the project root (one level up from this crate)
pub fn project_path(relative: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let project_root = std::path::Path::new(manifest_dir)
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."));
    project_root.join(relative).to_string_lossy().to_string()
}

/// Hot smoke injected near the floor of a 2D box rises under buoyancy.
///
/// Emitters overwrite their cells with density 0.02, so clamped advection
/// keeps every cell in [0, 0.02].
pub fn plume_2d_test() -> ReferenceTest {
    ReferenceTest {
        name: "Plume 2D".to_string(),
        config_path: project_path("configs/plume_2d.json"),
        timesteps: None,
        expected: ExpectedResult {
            density_bounds: Some(DensityBoundsCheck {
                min: 0.0,
                max: Some(0.02),
            }),
            plume_rise: Some(PlumeRiseCheck { min_rise: 5.0 }),
            divergence: Some(DivergenceCheck { max_ratio: 0.9 }),
            output_alternation: true,
        },
    }
}

/// The same plume in a 16^3 box.
pub fn plume_3d_test() -> ReferenceTest {
    ReferenceTest {
        name: "Plume 3D".to_string(),
        config_path: project_path("configs/plume_3d.json"),
        timesteps: None,
        expected: ExpectedResult {
            density_bounds: Some(DensityBoundsCheck {
                min: 0.0,
                max: Some(0.02),
            }),
            plume_rise: Some(PlumeRiseCheck { min_rise: 3.0 }),
            divergence: None,
            output_alternation: true,
        },
    }
}

/// A sweeping additive emitter with a sideways jet; density accumulates, so
/// only the lower bound is checked.
pub fn swept_plume_test() -> ReferenceTest {
    ReferenceTest {
        name: "Swept Plume 2D".to_string(),
        config_path: project_path("configs/swept_plume_2d.json"),
        timesteps: None,
        expected: ExpectedResult {
            density_bounds: Some(DensityBoundsCheck { min: 0.0, max: None }),
            plume_rise: None,
            divergence: None,
            output_alternation: true,
        },
    }
}

/// Get all reference tests
pub fn all_tests() -> Vec<ReferenceTest> {
    vec![plume_2d_test(), plume_3d_test(), swept_plume_test()]
}
