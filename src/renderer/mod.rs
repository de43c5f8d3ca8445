//! Renderer-side pipeline machinery
//!
//! - [`backend`]: the graphics API seam ([`backend::ShaderBackend`])
//! - [`pipeline`]: signatures, caches and the asynchronous compiler
//! - [`settings`]: compiler service configuration
//! - `backends`: concrete [`backend::ShaderBackend`] implementations
//!   (behind cargo features)

pub mod backend;
#[cfg(feature = "wgpu")]
pub mod backends;
pub mod pipeline;
pub mod settings;

pub use backend::{ShaderBackend, StageShaders};
pub use settings::PipelineCompilerSettings;
