//! Scratch buffers shared between solver stages.

use crate::backend::{BufferDesc, BufferHandle, ComputeBackend};
use crate::error::BackendError;

/// Channels per scratch element: wide enough for a velocity vector.
pub const TEMP_BUFFER_CHANNELS: usize = 3;

/// Scratch buffers allocated when no count is given.
pub const DEFAULT_TEMP_BUFFER_COUNT: usize = 2;

/// A fixed set of scratch buffers, each covering the whole domain.
///
/// Buffers are allocated once and never resized. A buffer's contents are only
/// meaningful inside the stage that wrote them.
#[derive(Debug, Clone)]
pub struct TempBufferPool {
    buffers: Vec<BufferHandle>,
    element_count: usize,
}

impl TempBufferPool {
    /// Allocate `count` scratch buffers of `element_count` three-channel cells.
    pub fn new(
        backend: &mut dyn ComputeBackend,
        element_count: usize,
        count: usize,
    ) -> Result<Self, BackendError> {
        assert!(element_count > 0, "scratch buffers must cover at least one cell");
        let buffers = (0..count)
            .map(|i| {
                backend.create_buffer(BufferDesc::new(
                    format!("temp_{i}"),
                    element_count,
                    TEMP_BUFFER_CHANNELS,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { buffers, element_count })
    }

    /// Scratch buffer `index`. Panics if `index` is out of range.
    #[inline]
    pub fn buffer(&self, index: usize) -> BufferHandle {
        assert!(
            index < self.buffers.len(),
            "temp buffer {index} requested but pool holds {}",
            self.buffers.len()
        );
        self.buffers[index]
    }

    /// Number of scratch buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True when the pool holds no buffers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Cells covered by each buffer.
    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_count
    }
}
