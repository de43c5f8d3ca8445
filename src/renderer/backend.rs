//! Native backend seam
//!
//! [`ShaderBackend`] is everything the cache needs from a graphics API:
//! compile generated source into a native shader object, and assemble
//! shader objects into graphics / compute pipeline objects.
//!
//! Shader compilation may run on compiler worker threads. Pipeline creation
//! is only ever invoked on the thread that owns the graphics context (from
//! `PipelineCompilerService::dispatch` or a synchronous compile).

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::errors::Result;
use crate::resources::blueprint::{ShaderLanguage, ShaderStage};

/// Graphics API collaborator.
pub trait ShaderBackend: Send + Sync + 'static {
    type Shader: Send + Sync + 'static;
    type GraphicsPipeline: Send + Sync + 'static;
    type ComputePipeline: Send + Sync + 'static;
    /// Fixed-function state of a graphics pipeline. Its `Hash` is folded into
    /// graphics signatures, so it must not hash pointers.
    type PipelineDescription: Hash + Send + Sync + 'static;

    fn shader_language(&self) -> ShaderLanguage;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader>;

    fn create_graphics_pipeline(
        &self,
        description: &Self::PipelineDescription,
        shaders: &StageShaders<Self::Shader>,
    ) -> Result<Self::GraphicsPipeline>;

    fn create_compute_pipeline(&self, shader: &Self::Shader) -> Result<Self::ComputePipeline>;
}

/// Compiled shader objects indexed by stage.
pub struct StageShaders<S> {
    shaders: [Option<Arc<S>>; ShaderStage::COUNT],
}

impl<S> Default for StageShaders<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for StageShaders<S> {
    fn clone(&self) -> Self {
        Self {
            shaders: self.shaders.clone(),
        }
    }
}

impl<S> StageShaders<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shaders: Default::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, stage: ShaderStage) -> Option<&S> {
        self.shaders[stage.index()].as_deref()
    }

    #[inline]
    pub fn set(&mut self, stage: ShaderStage, shader: Arc<S>) {
        self.shaders[stage.index()] = Some(shader);
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, stage: ShaderStage) -> bool {
        self.shaders[stage.index()].is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shaders.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> fmt::Debug for StageShaders<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<ShaderStage> = ShaderStage::ALL
            .into_iter()
            .filter(|stage| self.contains(*stage))
            .collect();
        f.debug_tuple("StageShaders").field(&bound).finish()
    }
}
