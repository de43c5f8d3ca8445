//! Pipeline Compiler Settings
//!
//! ```rust,ignore
//! use myth_pso::renderer::PipelineCompilerSettings;
//!
//! // Default: asynchronous compilation, pool sized from hardware concurrency
//! let settings = PipelineCompilerSettings::default();
//!
//! // Deterministic startup: compile everything inline, two workers for later
//! let settings = PipelineCompilerSettings {
//!     asynchronous_compilation: false,
//!     compiler_threads: Some(2),
//! };
//! ```

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Startup configuration of the pipeline compiler service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineCompilerSettings {
    /// When disabled, every cache miss compiles synchronously on the
    /// requesting thread and no fallback search is performed.
    pub asynchronous_compilation: bool,

    /// Size of each compiler thread pool. `None` derives it from hardware
    /// concurrency, leaving room for the render and builder threads.
    pub compiler_threads: Option<usize>,
}

impl Default for PipelineCompilerSettings {
    fn default() -> Self {
        Self {
            asynchronous_compilation: true,
            compiler_threads: None,
        }
    }
}

impl PipelineCompilerSettings {
    /// Effective compiler pool size (at least one).
    #[must_use]
    pub fn resolved_compiler_threads(&self) -> usize {
        self.compiler_threads
            .unwrap_or_else(default_compiler_threads)
            .max(1)
    }
}

/// Hardware concurrency minus the render and builder threads, at least one.
#[must_use]
pub fn default_compiler_threads() -> usize {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .saturating_sub(2)
        .max(1)
}
