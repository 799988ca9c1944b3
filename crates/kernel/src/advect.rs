//! Semi-Lagrangian advection with optional MacCormack correction.

use std::marker::PhantomData;

use crate::backend::{BufferHandle, Kernel};
use crate::error::BackendError;
use crate::grid::GridElement;
use crate::runner::KernelRunner;

/// How a field is moved along the velocity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum AdvectionScheme {
    /// Forward backtrace, backward re-advection, clamped error correction.
    /// Three dispatches per call.
    #[default]
    MacCormack,
    /// Forward backtrace only. One dispatch per call, more numerical blur.
    SemiLagrangian,
}

/// One dispatch in an advection sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// `output = input` backtraced by `dt`.
    Forward,
    /// `scratch = output` backtraced by `-dt`.
    Backward,
    /// Correct `output` by half the round-trip error, clamped to `input`.
    Correct,
}

const SEMI_LAGRANGIAN_PASSES: &[Pass] = &[Pass::Forward];
const MACCORMACK_PASSES: &[Pass] = &[Pass::Forward, Pass::Backward, Pass::Correct];

impl AdvectionScheme {
    fn passes(self) -> &'static [Pass] {
        match self {
            AdvectionScheme::MacCormack => MACCORMACK_PASSES,
            AdvectionScheme::SemiLagrangian => SEMI_LAGRANGIAN_PASSES,
        }
    }
}

/// Advects grids of `T` through a velocity field.
///
/// The scheme, and with it the pass sequence, is fixed at construction.
/// MacCormack uses `scratch` to hold the backward re-advection for the
/// duration of a call.
#[derive(Debug, Clone)]
pub struct Advecter<T: GridElement> {
    scheme: AdvectionScheme,
    passes: &'static [Pass],
    scratch: BufferHandle,
    _element: PhantomData<T>,
}

impl<T: GridElement> Advecter<T> {
    /// Create an advecter. `scratch` must cover the domain with at least
    /// `T::KIND.channels()` channels per cell.
    pub fn new(scheme: AdvectionScheme, scratch: BufferHandle) -> Self {
        Self {
            scheme,
            passes: scheme.passes(),
            scratch,
            _element: PhantomData,
        }
    }

    /// The scheme chosen at construction.
    pub fn scheme(&self) -> AdvectionScheme {
        self.scheme
    }

    /// Advect `input` along `velocity` for `dt` into `output`.
    ///
    /// `output` must differ from `input`, `velocity` and the scratch buffer;
    /// `input` and `velocity` are left unchanged.
    pub fn advect(
        &self,
        runner: &mut KernelRunner,
        output: BufferHandle,
        input: BufferHandle,
        velocity: BufferHandle,
        dt: f32,
    ) -> Result<(), BackendError> {
        assert!(
            output != input && output != velocity && output != self.scratch,
            "advection output must not alias its inputs or the scratch buffer"
        );
        if self.uses_scratch() {
            assert!(input != self.scratch, "advection input must not be the scratch buffer");
            self.check_scratch(runner);
        }

        for pass in self.passes {
            let kernel = match pass {
                Pass::Forward => Kernel::AdvectBacktrace {
                    element: T::KIND,
                    velocity,
                    input,
                    output,
                    dt,
                },
                Pass::Backward => Kernel::AdvectBacktrace {
                    element: T::KIND,
                    velocity,
                    input: output,
                    output: self.scratch,
                    dt: -dt,
                },
                Pass::Correct => Kernel::MacCormackCorrect {
                    element: T::KIND,
                    velocity,
                    backward: self.scratch,
                    original: input,
                    target: output,
                    dt,
                },
            };
            runner.run(&kernel)?;
        }
        Ok(())
    }

    fn uses_scratch(&self) -> bool {
        self.passes.contains(&Pass::Backward)
    }

    fn check_scratch(&self, runner: &KernelRunner) {
        let desc = runner.backend().buffer_desc(self.scratch);
        assert!(
            desc.elements >= runner.dims().cell_count() && desc.channels >= T::KIND.channels(),
            "advection scratch `{}` too small: {} cells x {} channels",
            desc.label,
            desc.elements,
            desc.channels
        );
    }
}
