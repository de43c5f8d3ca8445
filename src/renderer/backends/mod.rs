//! Concrete [`ShaderBackend`](crate::renderer::backend::ShaderBackend)
//! implementations.

pub mod wgpu_backend;

pub use wgpu_backend::{WgpuBackend, WgpuPipelineDescription};
