//! Synchronous kernel dispatch over a fixed work shape.

use crate::backend::{ComputeBackend, Kernel};
use crate::error::BackendError;
use crate::grid::GridDims;

/// Work-group tiling used for 2D domains.
pub const LOCAL_SIZE_2D: [u32; 3] = [8, 16, 1];

/// Global and local work sizes of every dispatch in a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkShape {
    /// One work-item per cell: `[width, height, depth]`.
    pub global: [u32; 3],
    /// Work-group size, or `None` to let the backend choose.
    pub local: Option<[u32; 3]>,
}

impl WorkShape {
    /// Shape for a domain: 2D domains get an explicit 8x16 tiling, 3D domains
    /// leave the tiling to the backend.
    pub fn for_domain(dims: GridDims) -> Self {
        let local = if dims.is_2d() { Some(LOCAL_SIZE_2D) } else { None };
        Self {
            global: [dims.width, dims.height, dims.depth],
            local,
        }
    }

    /// Grid dimensions covered by this shape.
    #[inline]
    pub fn dims(&self) -> GridDims {
        GridDims::new(self.global[0], self.global[1], self.global[2])
    }

    /// Local size, falling back to `default` when unset.
    #[inline]
    pub fn local_or(&self, default: [u32; 3]) -> [u32; 3] {
        self.local.unwrap_or(default)
    }

    /// Number of work-groups per axis for a given local size.
    pub fn workgroup_count(&self, local: [u32; 3]) -> [u32; 3] {
        [
            self.global[0].div_ceil(local[0]),
            self.global[1].div_ceil(local[1]),
            self.global[2].div_ceil(local[2]),
        ]
    }
}

/// Runs kernels over the solver's work shape, one blocking dispatch at a time.
///
/// Each call to [`KernelRunner::run`] returns only after the backend has
/// finished the dispatch, so the next stage always observes completed output.
pub struct KernelRunner {
    backend: Box<dyn ComputeBackend>,
    shape: WorkShape,
    dispatches: u64,
}

impl KernelRunner {
    /// Bind a backend to the work shape of `dims` and build its pipelines.
    pub fn new(mut backend: Box<dyn ComputeBackend>, dims: GridDims) -> Result<Self, BackendError> {
        let shape = WorkShape::for_domain(dims);
        backend.prepare(&shape)?;
        tracing::debug!(
            backend = backend.name(),
            global = ?shape.global,
            local = ?shape.local,
            "kernel runner ready"
        );
        Ok(Self {
            backend,
            shape,
            dispatches: 0,
        })
    }

    /// Dispatch `kernel` and wait for completion.
    pub fn run(&mut self, kernel: &Kernel) -> Result<(), BackendError> {
        tracing::trace!(kernel = kernel.name(), "dispatch");
        self.backend.dispatch(kernel, &self.shape)?;
        self.dispatches += 1;
        Ok(())
    }

    /// The bound work shape.
    #[inline]
    pub fn shape(&self) -> &WorkShape {
        &self.shape
    }

    /// Grid dimensions of the bound work shape.
    #[inline]
    pub fn dims(&self) -> GridDims {
        self.shape.dims()
    }

    /// Number of completed dispatches.
    #[inline]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    /// Shared access to the backend.
    #[inline]
    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    /// Exclusive access to the backend, for buffer allocation and transfers.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut dyn ComputeBackend {
        self.backend.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_d_domains_use_fixed_tiling() {
        let shape = WorkShape::for_domain(GridDims::new(512, 512, 1));
        assert_eq!(shape.local, Some(LOCAL_SIZE_2D));
        assert_eq!(shape.workgroup_count(LOCAL_SIZE_2D), [64, 32, 1]);
    }

    #[test]
    fn three_d_domains_leave_tiling_to_backend() {
        let shape = WorkShape::for_domain(GridDims::new(64, 128, 128));
        assert_eq!(shape.local, None);
        assert_eq!(shape.workgroup_count(shape.local_or([4, 4, 4])), [16, 32, 32]);
    }

    #[test]
    fn partial_workgroups_round_up() {
        let shape = WorkShape::for_domain(GridDims::new(5, 5, 5));
        assert_eq!(shape.workgroup_count([4, 4, 4]), [2, 2, 2]);
    }
}
