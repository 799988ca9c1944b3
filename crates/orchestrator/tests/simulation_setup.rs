//! Config-driven setup: the shipped configs load, validate and run to completion.

use orchestrator::{create_simulation, RunnerState, SimulationConfig};
use std::path::Path;

/// Resolve a path relative to the workspace root (two levels up from this crate)
fn project_path(relative: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let project_root = Path::new(manifest_dir)
        .parent()
        .and_then(|p| p.parent())
        .expect("Could not find project root");
    project_root.join(relative).to_string_lossy().to_string()
}

#[test]
fn test_shipped_configs_validate() {
    for name in ["plume_2d.json", "plume_3d.json", "swept_plume_2d.json"] {
        let config = SimulationConfig::load(&project_path(&format!("configs/{name}")))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        println!("{name}: {} at {:?}, {} emitters", config.name, config.resolution, config.emitters.len());
        assert!(config.max_steps.is_some());
        assert!(!config.emitters.is_empty());
    }
}

#[test]
fn test_invalid_config_is_rejected_on_load() {
    let dir = std::env::temp_dir().join(format!("smoke-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.json");
    std::fs::write(&path, r#"{ "name": "bad", "resolution": [8, 8, 8], "time_step": { "dt": -1.0 } }"#).unwrap();

    let err = create_simulation(path.to_str().unwrap()).err().expect("negative dt accepted");
    assert!(err.to_string().contains("dt"), "{err}");
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_swept_plume_runs_to_completion() {
    let path = project_path("configs/swept_plume_2d.json");
    let config = SimulationConfig::load(&path).unwrap();
    let runner = create_simulation(&path).unwrap();
    runner.start();

    while runner.state() == RunnerState::Running {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    assert_eq!(runner.state(), RunnerState::Finished, "{:?}", runner.error_message());

    let max_steps = config.max_steps.unwrap();
    assert_eq!(runner.step_count(), max_steps);
    let expected_time = max_steps as f64 * config.time_step.effective() as f64;
    assert!((runner.sim_time() - expected_time).abs() < 1e-4);

    let snapshot = runner.snapshot().expect("final snapshot");
    println!("{snapshot:?}");
    assert_eq!(snapshot.step, max_steps);
    assert!(snapshot.total_density > 0.0);
    assert!(snapshot.min_density >= 0.0);
    assert!(snapshot.max_speed.is_finite());

    let solver = runner.join().unwrap();
    assert_eq!(solver.output_write_gamma_power(), 2.2);
}
