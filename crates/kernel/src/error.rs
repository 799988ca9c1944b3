//! Errors reported by compute backends.

use std::path::PathBuf;

/// Failure inside a compute backend.
///
/// Every variant is fatal for the current step: nothing in the solver retries
/// or degrades. Callers own logging and deciding whether to abort the run.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No adapter matched the request.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device.
    #[error("failed to create device: {0}")]
    DeviceCreation(String),

    /// A kernel source file could not be read.
    #[error("failed to load kernel source {path}: {source}")]
    KernelSource {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Kernel source failed to compile or a pipeline could not be built.
    #[error("failed to compile kernel `{kernel}`: {message}")]
    Compilation {
        /// Entry point or module label.
        kernel: String,
        /// Compiler or validation message.
        message: String,
    },

    /// The device reported an error while running a dispatch.
    #[error("dispatch of `{kernel}` failed: {message}")]
    Dispatch {
        /// Kernel that was running.
        kernel: &'static str,
        /// Device message.
        message: String,
    },

    /// Reading a buffer back to the host failed.
    #[error("buffer readback failed: {0}")]
    Readback(String),

    /// Data written to a buffer does not match its size.
    #[error("buffer `{label}` holds {expected} values, got {actual}")]
    BufferSize {
        /// Buffer label.
        label: String,
        /// Capacity in f32 values.
        expected: usize,
        /// Length of the offending data.
        actual: usize,
    },
}
