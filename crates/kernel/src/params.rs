//! Tunable simulation parameters uploaded to the backend once per step.

use bytemuck::{Pod, Zeroable};

/// Force and cooling coefficients.
///
/// The layout matches the `FluidParams` uniform in the WGSL kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FluidParams {
    /// Downward acceleration per unit of density.
    pub density_weight: f32,
    /// Upward acceleration per unit of temperature.
    pub temperature_buoyancy: f32,
    /// Fraction of temperature lost per second.
    pub cooling_rate: f32,
    /// Fraction of velocity lost per second.
    pub drag: f32,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            density_weight: 5000.0,
            temperature_buoyancy: 120.0,
            cooling_rate: 0.2,
            drag: 2.0,
        }
    }
}

impl FluidParams {
    /// Parameters with every force and decay disabled.
    pub const fn inert() -> Self {
        Self {
            density_weight: 0.0,
            temperature_buoyancy: 0.0,
            cooling_rate: 0.0,
            drag: 0.0,
        }
    }

    /// Vertical acceleration for a cell holding `density` and `temperature`.
    #[inline]
    pub fn lift(&self, density: f32, temperature: f32) -> f32 {
        self.temperature_buoyancy * temperature - self.density_weight * density
    }

    /// Factor applied to velocity by drag over a step of `dt`.
    #[inline]
    pub fn drag_factor(&self, dt: f32) -> f32 {
        (1.0 - self.drag * dt).max(0.0)
    }

    /// Factor applied to temperature by cooling over a step of `dt`.
    #[inline]
    pub fn cooling_factor(&self, dt: f32) -> f32 {
        (1.0 - self.cooling_rate * dt).max(0.0)
    }
}
