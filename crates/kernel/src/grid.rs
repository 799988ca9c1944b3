//! Dense simulation grids and the per-cell element types stored in them.
//!
//! A grid is a flat array indexed `x + y * width + z * width * height`. The
//! resolution is fixed when the solver is built and never changes.

use std::ops::{Add, Mul, Sub};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Resolution of a simulation domain, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GridDims {
    /// Cells along x.
    pub width: u32,
    /// Cells along y.
    pub height: u32,
    /// Cells along z. A depth of 1 makes the domain two-dimensional.
    pub depth: u32,
}

impl GridDims {
    /// Create grid dimensions. Every axis must have at least one cell.
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        assert!(
            width > 0 && height > 0 && depth > 0,
            "grid dimensions must be non-zero, got {width}x{height}x{depth}"
        );
        Self { width, height, depth }
    }

    /// Total number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    /// True when the domain is a single slice (depth 1).
    #[inline]
    pub fn is_2d(&self) -> bool {
        self.depth == 1
    }

    /// Linear index of cell `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        x as usize + y as usize * self.width as usize + z as usize * self.plane_stride()
    }

    /// Linear index of `(x, y, z)` after clamping each coordinate to the grid.
    #[inline]
    pub fn index_clamped(&self, x: i64, y: i64, z: i64) -> usize {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        let z = z.clamp(0, self.depth as i64 - 1) as u32;
        self.index(x, y, z)
    }

    /// Inverse of [`GridDims::index`].
    #[inline]
    pub fn coords(&self, index: usize) -> [u32; 3] {
        let w = self.width as usize;
        let plane = self.plane_stride();
        [
            (index % w) as u32,
            ((index % plane) / w) as u32,
            (index / plane) as u32,
        ]
    }

    /// Cell-space position of a cell (cell centers sit on integer coordinates).
    #[inline]
    pub fn position(&self, index: usize) -> Vec3 {
        let [x, y, z] = self.coords(index);
        Vec3::new(x as f32, y as f32, z as f32)
    }

    /// Cell nearest to a cell-space position, clamped into the grid.
    pub fn nearest_cell(&self, pos: Vec3) -> [u32; 3] {
        let round = |v: f32, n: u32| -> u32 {
            if v.is_nan() {
                return 0;
            }
            v.round().clamp(0.0, (n - 1) as f32) as u32
        };
        [
            round(pos.x, self.width),
            round(pos.y, self.height),
            round(pos.z, self.depth),
        ]
    }

    /// Upper bound used when clamping sample positions on each axis.
    #[inline]
    pub fn extent(&self) -> Vec3 {
        Vec3::new(self.width as f32, self.height as f32, self.depth as f32)
    }

    #[inline]
    fn plane_stride(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Which element layout a grid buffer holds.
///
/// Backends use this to pick the instantiation of an element-generic kernel;
/// it is fixed by the Rust element type and never inspected per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// [`FluidState`]: density and temperature.
    FluidState,
    /// Three-component velocity.
    Vector,
}

impl ElementKind {
    /// Number of f32 channels per element.
    pub const fn channels(self) -> usize {
        match self {
            ElementKind::FluidState => 2,
            ElementKind::Vector => 3,
        }
    }

    /// Short name used for pipeline labels.
    pub const fn label(self) -> &'static str {
        match self {
            ElementKind::FluidState => "fluid_state",
            ElementKind::Vector => "vector",
        }
    }
}

/// Per-cell scalar pair advected through the velocity field.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FluidState {
    /// Smoke density.
    pub density: f32,
    /// Temperature above ambient.
    pub temperature: f32,
}

impl FluidState {
    /// Create a fluid state.
    pub const fn new(density: f32, temperature: f32) -> Self {
        Self { density, temperature }
    }
}

impl Add for FluidState {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.density + rhs.density, self.temperature + rhs.temperature)
    }
}

impl Sub for FluidState {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.density - rhs.density, self.temperature - rhs.temperature)
    }
}

impl Mul<f32> for FluidState {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.density * rhs, self.temperature * rhs)
    }
}

/// A value that can live in an advected grid.
///
/// Implemented once per element type; the advection kernels are generic over
/// it so each element type gets its own monomorphized per-cell body.
pub trait GridElement:
    Pod + Default + Send + Sync + PartialEq + std::fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f32, Output = Self>
{
    /// Layout tag handed to backends.
    const KIND: ElementKind;

    /// Component-wise minimum.
    fn min_elem(self, other: Self) -> Self;

    /// Component-wise maximum.
    fn max_elem(self, other: Self) -> Self;

    /// Linear interpolation `self + t * (other - self)`.
    #[inline]
    fn lerp_elem(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// Component-wise clamp into `[lo, hi]`.
    #[inline]
    fn clamp_elem(self, lo: Self, hi: Self) -> Self {
        self.max_elem(lo).min_elem(hi)
    }
}

impl GridElement for FluidState {
    const KIND: ElementKind = ElementKind::FluidState;

    #[inline]
    fn min_elem(self, other: Self) -> Self {
        Self::new(self.density.min(other.density), self.temperature.min(other.temperature))
    }

    #[inline]
    fn max_elem(self, other: Self) -> Self {
        Self::new(self.density.max(other.density), self.temperature.max(other.temperature))
    }
}

impl GridElement for Vec3 {
    const KIND: ElementKind = ElementKind::Vector;

    #[inline]
    fn min_elem(self, other: Self) -> Self {
        self.min(other)
    }

    #[inline]
    fn max_elem(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Reinterpret the leading `cells` elements of a channel-interleaved f32
/// buffer as typed elements.
#[inline]
pub fn view<T: GridElement>(data: &[f32], cells: usize) -> &[T] {
    bytemuck::cast_slice(&data[..cells * T::KIND.channels()])
}

/// Mutable counterpart of [`view`].
#[inline]
pub fn view_mut<T: GridElement>(data: &mut [f32], cells: usize) -> &mut [T] {
    bytemuck::cast_slice_mut(&mut data[..cells * T::KIND.channels()])
}
