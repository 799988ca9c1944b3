//! Writing solver output into an external texture.

use crate::grid::GridDims;

/// What the visualization write puts into the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum VisualizationMode {
    /// `clamp(density, 0, 1)^gamma` per cell.
    #[default]
    Density,
    /// Velocity magnitude clamped to `[0, 1]` per cell.
    Velocity,
}

/// A texture the solver writes one byte per cell into at the end of a step.
///
/// The solver calls [`acquire`](TextureSink::acquire) before writing and
/// [`release`](TextureSink::release) afterwards, so implementations sharing
/// the texture with a renderer can hand ownership back and forth.
pub trait TextureSink: Send {
    /// Take exclusive access to the texture.
    fn acquire(&mut self) {}

    /// Replace the texture contents. `texels` holds one byte per cell in grid
    /// order.
    fn write_texels(&mut self, dims: GridDims, texels: &[u8]);

    /// Return the texture to its other users.
    fn release(&mut self) {}
}

/// Convert intensities in `[0, 1]` (channel 0 of a `stride`-wide buffer) to
/// bytes.
pub fn quantize(values: &[f32], stride: usize, cells: usize) -> Vec<u8> {
    values
        .chunks(stride)
        .take(cells)
        .map(|c| (c[0].clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

/// A sink that keeps the last written frame in host memory.
#[derive(Debug, Default, Clone)]
pub struct HostTexture {
    dims: Option<GridDims>,
    texels: Vec<u8>,
    writes: u64,
    held: bool,
}

impl HostTexture {
    /// Create an empty texture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the last write.
    pub fn texels(&self) -> &[u8] {
        &self.texels
    }

    /// Dimensions of the last write.
    pub fn dims(&self) -> Option<GridDims> {
        self.dims
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> u64 {
        self.writes
    }
}

impl TextureSink for HostTexture {
    fn acquire(&mut self) {
        assert!(!self.held, "texture acquired twice");
        self.held = true;
    }

    fn write_texels(&mut self, dims: GridDims, texels: &[u8]) {
        assert!(self.held, "texture written without acquire");
        self.dims = Some(dims);
        self.texels.clear();
        self.texels.extend_from_slice(texels);
    }

    fn release(&mut self) {
        self.held = false;
        self.writes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_reads_channel_zero_only() {
        let data = [0.0, 9.0, 9.0, 1.0, 9.0, 9.0, 0.5, 9.0, 9.0];
        assert_eq!(quantize(&data, 3, 3), vec![0, 255, 128]);
    }

    #[test]
    fn host_texture_counts_released_writes() {
        let mut tex = HostTexture::new();
        tex.acquire();
        tex.write_texels(GridDims::new(2, 1, 1), &[1, 2]);
        tex.release();
        assert_eq!(tex.texels(), &[1, 2]);
        assert_eq!(tex.write_count(), 1);
    }
}
