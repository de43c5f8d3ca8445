//! Shader Cache Manager
//!
//! Deduplicates compiled native shader objects at two levels:
//!
//! | Key | Maps to | Catches |
//! |-----|---------|---------|
//! | [`CombinationId`] | compiled shader | repeated requests for the same blueprint + filtered properties |
//! | xxh3-128 of generated source | [`CombinationId`] | different combinations that generate byte-identical source |
//!
//! The second level matters for backends without binary shader caching: two
//! combinations that differ only in properties the template never prints
//! still share one compiled object.
//!
//! One instance is shared by every material that uses the same backend. It
//! owns no threads; all map access happens under a single mutex which is
//! never held across a compile call.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::Result;
use crate::renderer::backend::ShaderBackend;
use crate::renderer::pipeline::signature::CombinationId;
use crate::resources::blueprint::{ShaderBlueprint, ShaderStage};
use crate::resources::shader_properties::ShaderProperties;

struct ShaderCacheMaps<S> {
    /// Combination id → compiled shader.
    shaders: FxHashMap<CombinationId, Arc<S>>,
    /// xxh3-128 of generated source → first combination id compiled from it.
    source_to_combination: FxHashMap<u128, CombinationId>,
}

/// Centralized compiled-shader cache.
pub struct ShaderCacheManager<B: ShaderBackend> {
    maps: Mutex<ShaderCacheMaps<B::Shader>>,
}

impl<B: ShaderBackend> Default for ShaderCacheManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ShaderBackend> ShaderCacheManager<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(ShaderCacheMaps {
                shaders: FxHashMap::default(),
                source_to_combination: FxHashMap::default(),
            }),
        }
    }

    /// Returns the compiled shader for `combination_id`, if any.
    #[must_use]
    pub fn get(&self, combination_id: CombinationId) -> Option<Arc<B::Shader>> {
        self.maps.lock().shaders.get(&combination_id).cloned()
    }

    /// Synchronous build + compile, returning an existing shader when present.
    pub fn get_or_create(
        &self,
        backend: &B,
        combination_id: CombinationId,
        blueprint: &dyn ShaderBlueprint,
        properties: &ShaderProperties,
        stage: ShaderStage,
    ) -> Result<Arc<B::Shader>> {
        if let Some(shader) = self.get(combination_id) {
            return Ok(shader);
        }

        let source = blueprint.build_source(backend.shader_language(), properties)?;
        self.get_or_compile_source(backend, combination_id, stage, &source)
    }

    /// Compiles already generated `source` unless the combination or the exact
    /// source text is already cached.
    pub fn get_or_compile_source(
        &self,
        backend: &B,
        combination_id: CombinationId,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Arc<B::Shader>> {
        let source_hash = xxh3_128(source.as_bytes());

        {
            let mut maps = self.maps.lock();
            if let Some(shader) = maps.shaders.get(&combination_id) {
                return Ok(Arc::clone(shader));
            }

            let twin = maps
                .source_to_combination
                .get(&source_hash)
                .and_then(|twin_id| maps.shaders.get(twin_id))
                .cloned();
            if let Some(shader) = twin {
                log::debug!(
                    "Shader combination {combination_id} shares generated source with a cached shader"
                );
                maps.shaders.insert(combination_id, Arc::clone(&shader));
                return Ok(shader);
            }
        }

        let shader = match backend.compile_shader(stage, source) {
            Ok(shader) => Arc::new(shader),
            Err(err) => {
                log::error!(
                    "Failed to compile {stage:?} shader (combination {combination_id}): {err}\n{source}"
                );
                return Err(err);
            }
        };

        let mut maps = self.maps.lock();
        // A concurrent compile of the same combination may have won the race.
        let shader = Arc::clone(maps.shaders.entry(combination_id).or_insert(shader));
        maps.source_to_combination
            .entry(source_hash)
            .or_insert(combination_id);
        Ok(shader)
    }

    /// Releases every compiled shader object.
    pub fn clear(&self) {
        let mut maps = self.maps.lock();
        maps.shaders.clear();
        maps.source_to_combination.clear();
    }

    /// Number of cached combination ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.lock().shaders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.lock().shaders.is_empty()
    }

    /// Number of distinct generated sources compiled so far.
    #[must_use]
    pub fn source_hash_count(&self) -> usize {
        self.maps.lock().source_to_combination.len()
    }
}
