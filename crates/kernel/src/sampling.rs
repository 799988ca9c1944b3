//! Interpolation and neighbor-sampling primitives shared by the kernels.
//!
//! Every function takes the grid dimensions explicitly; nothing here reads a
//! global domain size.

use glam::Vec3;

use crate::grid::{GridDims, GridElement};

/// Distance kept between a sample position and the grid boundary.
pub const SAMPLE_EDGE_MARGIN: f32 = 0.001;

/// Clamp a cell-space position into `[0.001, dim - 0.001]` on every axis.
#[inline]
pub fn clamp_sample_position(dims: GridDims, pos: Vec3) -> Vec3 {
    let lo = Vec3::splat(SAMPLE_EDGE_MARGIN);
    let hi = dims.extent() - Vec3::splat(SAMPLE_EDGE_MARGIN);
    // `max` then `min` also maps NaN components onto the lower edge.
    pos.max(lo).min(hi)
}

/// Sample a grid at a cell-space position.
///
/// Uses bilinear interpolation for 2D domains and trilinear for 3D ones. The
/// position is clamped into the grid first, so sampling outside the domain
/// returns the same value as sampling at the clamped position.
#[inline]
pub fn sample<T: GridElement>(grid: &[T], dims: GridDims, pos: Vec3) -> T {
    if dims.is_2d() {
        sample_bilinear(grid, dims, pos)
    } else {
        sample_trilinear(grid, dims, pos)
    }
}

/// Trilinear interpolation over the 8 cells surrounding `pos`.
pub fn sample_trilinear<T: GridElement>(grid: &[T], dims: GridDims, pos: Vec3) -> T {
    let pos = clamp_sample_position(dims, pos);
    // On axes of 2^16 cells or more `dim - margin` rounds up to `dim` in f32.
    let x0 = (pos.x as u32).min(dims.width - 1);
    let y0 = (pos.y as u32).min(dims.height - 1);
    let z0 = (pos.z as u32).min(dims.depth - 1);
    let x1 = (x0 + 1).min(dims.width - 1);
    let y1 = (y0 + 1).min(dims.height - 1);
    let z1 = (z0 + 1).min(dims.depth - 1);

    let fx = pos.x - x0 as f32;
    let fy = pos.y - y0 as f32;
    let fz = pos.z - z0 as f32;

    let v000 = grid[dims.index(x0, y0, z0)];
    let v100 = grid[dims.index(x1, y0, z0)];
    let v010 = grid[dims.index(x0, y1, z0)];
    let v110 = grid[dims.index(x1, y1, z0)];
    let v001 = grid[dims.index(x0, y0, z1)];
    let v101 = grid[dims.index(x1, y0, z1)];
    let v011 = grid[dims.index(x0, y1, z1)];
    let v111 = grid[dims.index(x1, y1, z1)];

    let v00 = v000.lerp_elem(v100, fx);
    let v10 = v010.lerp_elem(v110, fx);
    let v01 = v001.lerp_elem(v101, fx);
    let v11 = v011.lerp_elem(v111, fx);
    let v0 = v00.lerp_elem(v10, fy);
    let v1 = v01.lerp_elem(v11, fy);
    v0.lerp_elem(v1, fz)
}

/// Bilinear interpolation in the z = 0 slice.
pub fn sample_bilinear<T: GridElement>(grid: &[T], dims: GridDims, pos: Vec3) -> T {
    let pos = clamp_sample_position(dims, pos);
    let x0 = (pos.x as u32).min(dims.width - 1);
    let y0 = (pos.y as u32).min(dims.height - 1);
    let x1 = (x0 + 1).min(dims.width - 1);
    let y1 = (y0 + 1).min(dims.height - 1);

    let fx = pos.x - x0 as f32;
    let fy = pos.y - y0 as f32;

    let v00 = grid[dims.index(x0, y0, 0)];
    let v10 = grid[dims.index(x1, y0, 0)];
    let v01 = grid[dims.index(x0, y1, 0)];
    let v11 = grid[dims.index(x1, y1, 0)];

    let v0 = v00.lerp_elem(v10, fx);
    let v1 = v01.lerp_elem(v11, fx);
    v0.lerp_elem(v1, fy)
}

/// Component-wise `[min, max]` of the grid cells bracketing `pos`.
///
/// The lower corner is `floor(pos)` clamped so the upper corner stays inside
/// the grid; 3D domains use the 8 surrounding cells, 2D domains the 4 in the
/// slice. Axes with a single cell collapse onto that cell.
pub fn neighbor_bounds<T: GridElement>(grid: &[T], dims: GridDims, pos: Vec3) -> (T, T) {
    let corner = |v: f32, n: u32| -> (u32, u32) {
        if n < 2 {
            return (0, 0);
        }
        let lo = if v.is_nan() { 0.0 } else { v.floor().clamp(0.0, (n - 2) as f32) };
        (lo as u32, lo as u32 + 1)
    };
    let (x0, x1) = corner(pos.x, dims.width);
    let (y0, y1) = corner(pos.y, dims.height);
    let (z0, z1) = if dims.is_2d() { (0, 0) } else { corner(pos.z, dims.depth) };

    let first = grid[dims.index(x0, y0, z0)];
    let mut lo = first;
    let mut hi = first;
    for z in [z0, z1] {
        for y in [y0, y1] {
            for x in [x0, x1] {
                let v = grid[dims.index(x, y, z)];
                lo = lo.min_elem(v);
                hi = hi.max_elem(v);
            }
        }
    }
    (lo, hi)
}

/// Clamp `value` into the range spanned by the cells bracketing `pos`.
#[inline]
pub fn clamp_to_neighbors<T: GridElement>(value: T, grid: &[T], dims: GridDims, pos: Vec3) -> T {
    let (lo, hi) = neighbor_bounds(grid, dims, pos);
    value.clamp_elem(lo, hi)
}

/// A cell and its six face neighbors. Neighbors outside the grid are replaced
/// by the center cell.
#[derive(Debug, Clone, Copy)]
pub struct Neighbors<T> {
    /// Center.
    pub c: T,
    /// -y
    pub n: T,
    /// +y
    pub s: T,
    /// +x
    pub e: T,
    /// -x
    pub w: T,
    /// +z
    pub u: T,
    /// -z
    pub d: T,
}

/// Gather the edge-clamped face neighbors of cell `(x, y, z)`.
#[inline]
pub fn neighbors<T: Copy>(grid: &[T], dims: GridDims, x: u32, y: u32, z: u32) -> Neighbors<T> {
    neighbors_with(dims, x, y, z, |i| grid[i])
}

/// Like [`neighbors`] but reads each cell through `read`, so callers can
/// gather a single channel of an interleaved buffer.
#[inline]
pub fn neighbors_with<T: Copy>(
    dims: GridDims,
    x: u32,
    y: u32,
    z: u32,
    read: impl Fn(usize) -> T,
) -> Neighbors<T> {
    let (x, y, z) = (x as i64, y as i64, z as i64);
    Neighbors {
        c: read(dims.index_clamped(x, y, z)),
        n: read(dims.index_clamped(x, y - 1, z)),
        s: read(dims.index_clamped(x, y + 1, z)),
        e: read(dims.index_clamped(x + 1, y, z)),
        w: read(dims.index_clamped(x - 1, y, z)),
        u: read(dims.index_clamped(x, y, z + 1)),
        d: read(dims.index_clamped(x, y, z - 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FluidState;

    fn ramp(dims: GridDims) -> Vec<FluidState> {
        (0..dims.cell_count())
            .map(|i| {
                let p = dims.position(i);
                FluidState::new(p.x + 10.0 * p.y + 100.0 * p.z, 1.0)
            })
            .collect()
    }

    #[test]
    fn trilinear_hits_cell_values_at_integer_positions() {
        let dims = GridDims::new(4, 4, 4);
        let grid = ramp(dims);
        let v = sample(&grid, dims, Vec3::new(2.0, 1.0, 3.0));
        assert_eq!(v, grid[dims.index(2, 1, 3)]);
    }

    #[test]
    fn trilinear_reproduces_linear_field() {
        let dims = GridDims::new(4, 4, 4);
        let grid = ramp(dims);
        let v = sample(&grid, dims, Vec3::new(1.5, 2.25, 0.5));
        assert!((v.density - (1.5 + 22.5 + 50.0)).abs() < 1e-4, "got {}", v.density);
    }

    #[test]
    fn bilinear_used_for_single_slice() {
        let dims = GridDims::new(4, 4, 1);
        let grid = ramp(dims);
        let v = sample(&grid, dims, Vec3::new(0.5, 0.5, 0.7));
        assert!((v.density - 5.5).abs() < 1e-5, "got {}", v.density);
    }

    #[test]
    fn out_of_bounds_sample_matches_clamped_sample() {
        let dims = GridDims::new(5, 3, 4);
        let grid = ramp(dims);
        let outside = Vec3::new(-7.0, 12.0, 2.3);
        let clamped = clamp_sample_position(dims, outside);
        assert_eq!(sample(&grid, dims, outside), sample(&grid, dims, clamped));
    }

    #[test]
    fn sample_past_far_edge_of_wide_axis_stays_in_grid() {
        let dims = GridDims::new(65536, 1, 1);
        let grid = ramp(dims);
        let v = sample(&grid, dims, Vec3::new(1e6, 0.0, 0.0));
        assert_eq!(v, grid[dims.index(65535, 0, 0)]);

        let dims = GridDims::new(2, 2, 65536);
        let grid = ramp(dims);
        let v = sample(&grid, dims, Vec3::new(5.0, 5.0, 1e6));
        assert_eq!(v, grid[dims.index(1, 1, 65535)]);
    }

    #[test]
    fn neighbor_bounds_cover_bracketing_cells() {
        let dims = GridDims::new(4, 4, 4);
        let grid = ramp(dims);
        let (lo, hi) = neighbor_bounds(&grid, dims, Vec3::new(1.2, 1.7, 2.9));
        assert_eq!(lo.density, grid[dims.index(1, 1, 2)].density);
        assert_eq!(hi.density, grid[dims.index(2, 2, 3)].density);
    }

    #[test]
    fn neighbor_bounds_clamp_corner_into_grid() {
        let dims = GridDims::new(4, 4, 4);
        let grid = ramp(dims);
        let (lo, hi) = neighbor_bounds(&grid, dims, Vec3::new(9.0, -3.0, 3.5));
        assert_eq!(lo.density, grid[dims.index(2, 0, 2)].density);
        assert_eq!(hi.density, grid[dims.index(3, 1, 3)].density);
    }

    #[test]
    fn neighbors_clamp_to_center_at_edges() {
        let dims = GridDims::new(3, 3, 3);
        let grid: Vec<f32> = (0..dims.cell_count()).map(|i| i as f32).collect();
        let n = neighbors(&grid, dims, 0, 0, 0);
        assert_eq!(n.w, n.c);
        assert_eq!(n.n, n.c);
        assert_eq!(n.d, n.c);
        assert_eq!(n.e, 1.0);
        assert_eq!(n.s, 3.0);
        assert_eq!(n.u, 9.0);
    }
}
