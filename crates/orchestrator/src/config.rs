//! Configuration parsing and validation for smoke simulations

use serde::{Deserialize, Serialize};
use smoke_kernel::{AdvectionScheme, FluidParams, GridDims, VisualizationMode, DEFAULT_JACOBI_ITERATIONS};
use std::fs;

/// Main simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// Grid resolution [width, height, depth]; depth 1 gives a 2D run
    pub resolution: [u32; 3],
    /// Compute backend selection
    #[serde(default)]
    pub backend: BackendType,
    /// Directory holding the GPU kernel sources, relative to the config file.
    /// The sources compiled into the binary are used when absent.
    #[serde(default)]
    pub kernel_dir: Option<String>,
    /// Advection scheme for velocity and fluid state
    #[serde(default)]
    pub advection: AdvectionScheme,
    /// Jacobi sweeps per pressure projection
    #[serde(default = "default_jacobi_iterations")]
    pub jacobi_iterations: u32,
    /// Force and cooling parameters
    #[serde(default)]
    pub params: FluidParams,
    /// Time step policy
    #[serde(default)]
    pub time_step: TimeStep,
    /// Gamma exponent of the density visualization
    #[serde(default = "default_output_gamma")]
    pub output_gamma: f32,
    /// What the visualization write shows
    #[serde(default)]
    pub visualization: VisualizationMode,
    /// Fluid sources applied before every step
    #[serde(default)]
    pub emitters: Vec<EmitterConfig>,
    /// Velocity sources applied before every step
    #[serde(default)]
    pub impulses: Vec<ImpulseConfig>,
    /// Stop after this many steps
    #[serde(default)]
    pub max_steps: Option<u64>,
}

/// Compute backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// Rayon-parallel CPU backend
    Cpu,
    /// wgpu compute backend (requires the `gpu` feature)
    Gpu,
    /// GPU when an adapter is available, CPU otherwise
    #[default]
    Auto,
}

/// Fixed time step: each update advances the solver by `dt * scale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStep {
    /// Base step in seconds
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Multiplier applied to `dt`
    #[serde(default = "default_scale")]
    pub scale: f32,
}

impl TimeStep {
    /// Step actually handed to the solver.
    pub fn effective(&self) -> f32 {
        self.dt * self.scale
    }
}

impl Default for TimeStep {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            scale: default_scale(),
        }
    }
}

/// How an emitter writes into its cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitMode {
    /// Overwrite the cell with the emitter's density and temperature
    #[default]
    Set,
    /// Add the emitter's density and temperature to the cell
    Add,
}

/// A fluid source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Cell-space position [x, y, z]
    pub position: [f32; 3],
    /// Density written per step
    pub density: f32,
    /// Temperature written per step
    pub temperature: f32,
    /// Set or add
    #[serde(default)]
    pub mode: EmitMode,
    /// Optional sideways motion of the source
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
}

/// Sinusoidal motion along x: `x + amplitude * sin(2 pi frequency t)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Peak offset in cells
    pub amplitude: f32,
    /// Oscillations per simulated second
    pub frequency: f32,
}

/// A velocity source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpulseConfig {
    /// Cell-space position [x, y, z]
    pub position: [f32; 3],
    /// Velocity added per step
    pub impulse: [f32; 3],
}

// Default values
fn default_jacobi_iterations() -> u32 {
    DEFAULT_JACOBI_ITERATIONS
}

fn default_output_gamma() -> f32 {
    1.0
}

fn default_dt() -> f32 {
    0.02
}

fn default_scale() -> f32 {
    1.0
}

impl SimulationConfig {
    /// A config with every optional field at its default.
    pub fn new(name: impl Into<String>, resolution: [u32; 3]) -> Self {
        Self {
            name: name.into(),
            resolution,
            backend: BackendType::default(),
            kernel_dir: None,
            advection: AdvectionScheme::default(),
            jacobi_iterations: default_jacobi_iterations(),
            params: FluidParams::default(),
            time_step: TimeStep::default(),
            output_gamma: default_output_gamma(),
            visualization: VisualizationMode::default(),
            emitters: Vec::new(),
            impulses: Vec::new(),
            max_steps: None,
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: SimulationConfig =
            serde_json::from_str(json).map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        // Check resolution
        if self.resolution.iter().any(|&n| n == 0) {
            return Err(format!("Resolution must be non-zero on every axis, got {:?}", self.resolution));
        }

        // Check time step
        if !(self.time_step.dt > 0.0) {
            return Err("time_step.dt must be positive".to_string());
        }
        if !(self.time_step.scale > 0.0) {
            return Err("time_step.scale must be positive".to_string());
        }

        // Check params
        let p = &self.params;
        for (name, value) in [
            ("density_weight", p.density_weight),
            ("temperature_buoyancy", p.temperature_buoyancy),
            ("cooling_rate", p.cooling_rate),
            ("drag", p.drag),
        ] {
            if !(value >= 0.0) {
                return Err(format!("params.{} must be non-negative", name));
            }
        }

        // Check gamma
        if !(self.output_gamma > 0.0) {
            return Err("output_gamma must be positive".to_string());
        }

        // Check max_steps
        if let Some(max_steps) = self.max_steps {
            if max_steps == 0 {
                return Err("max_steps must be at least 1".to_string());
            }
        }

        self.validate_sources()
    }

    /// Validate that every source stays inside the grid
    fn validate_sources(&self) -> Result<(), String> {
        let extent = self.resolution.map(|n| (n - 1) as f32);
        let inside = |pos: [f32; 3]| (0..3).all(|k| pos[k] >= 0.0 && pos[k] <= extent[k]);

        for (i, emitter) in self.emitters.iter().enumerate() {
            if !inside(emitter.position) {
                return Err(format!("Emitter {} at {:?} is outside the grid", i, emitter.position));
            }
            if !(emitter.density >= 0.0) || !emitter.temperature.is_finite() {
                return Err(format!("Emitter {} must have non-negative density and finite temperature", i));
            }
            if let Some(sweep) = emitter.sweep {
                if !(sweep.amplitude >= 0.0) || !(sweep.frequency >= 0.0) {
                    return Err(format!("Emitter {} sweep must have non-negative amplitude and frequency", i));
                }
                let x = emitter.position[0];
                if x - sweep.amplitude < 0.0 || x + sweep.amplitude > extent[0] {
                    return Err(format!("Emitter {} sweeps outside the grid", i));
                }
            }
        }

        for (i, impulse) in self.impulses.iter().enumerate() {
            if !inside(impulse.position) {
                return Err(format!("Impulse {} at {:?} is outside the grid", i, impulse.position));
            }
            if !impulse.impulse.iter().all(|c| c.is_finite()) {
                return Err(format!("Impulse {} must be finite", i));
            }
        }

        Ok(())
    }

    /// Grid dimensions. Call after [`validate`](Self::validate).
    pub fn dims(&self) -> GridDims {
        let [w, h, d] = self.resolution;
        GridDims::new(w, h, d)
    }
}
