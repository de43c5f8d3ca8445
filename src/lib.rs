#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Asynchronous pipeline-state cache.
//!
//! Materials request pipelines with a sparse set of integer shader
//! properties. Each request is reduced to a deterministic signature; misses
//! are compiled on background threads while a less specific, already
//! compiled pipeline is borrowed as a fallback.
//!
//! ```rust,ignore
//! use myth_pso::{PipelineCompilerService, PipelineCompilerSettings};
//!
//! let service = PipelineCompilerService::new(backend, &PipelineCompilerSettings::default())?;
//! let cache = service.create_graphics_cache(material);
//!
//! // Every frame, on the render thread:
//! if let Some(pipeline) = cache.get_or_create(&properties, false) {
//!     // draw with `pipeline`
//! }
//! service.dispatch();
//! ```

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod utils;

pub use errors::{PsoError, Result};
pub use renderer::backend::{ShaderBackend, StageShaders};
pub use renderer::pipeline::{
    CombinationId, ComputePipelineStateCacheManager, GraphicsPipelineStateCacheManager,
    PipelineCompiler, PipelineCompilerService, PipelineStateCacheEntry, PipelineStateCacheManager,
    ShaderCacheManager, SignatureId,
};
pub use renderer::settings::PipelineCompilerSettings;
pub use resources::blueprint::{
    BasicMaterialBlueprint, LoadingState, MaterialBlueprint, PropertyMetadata, ShaderBlueprint,
    ShaderLanguage, ShaderStage,
};
pub use resources::shader_properties::{ShaderProperties, ShaderProperty, ShaderPropertyId};
pub use resources::template::TemplateShaderBlueprint;
