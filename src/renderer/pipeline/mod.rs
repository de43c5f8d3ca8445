//! Pipeline state caching and compilation
//!
//! - [`signature`]: combination / signature ids
//! - [`kind`]: graphics and compute pipeline families
//! - [`shader_cache`]: compiled shader deduplication
//! - [`cache`]: per-material pipeline-state cache with fallback search
//! - [`compiler`]: builder thread, compiler pool, dispatch queue
//! - [`persistence`]: cache file codec

pub mod cache;
pub mod compiler;
pub mod kind;
pub mod persistence;
pub mod shader_cache;
pub mod signature;

pub use cache::{
    ComputePipelineStateCacheManager, GraphicsPipelineStateCacheManager, PipelineStateCacheEntry,
    PipelineStateCacheManager,
};
pub use compiler::{
    ComputePipelineCompiler, GraphicsPipelineCompiler, PipelineCompiler, PipelineCompilerService,
};
pub use kind::{Compute, Graphics, PipelineKind};
pub use persistence::PersistedPipelineCache;
pub use shader_cache::ShaderCacheManager;
pub use signature::{
    CombinationId, ComputePipelineSignature, GraphicsPipelineSignature, PipelineSignature,
    SignatureId, compute_combination_id, compute_compute_signature, compute_graphics_signature,
};
