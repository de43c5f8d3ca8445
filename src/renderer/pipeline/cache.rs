//! Pipeline State Cache
//!
//! One [`PipelineStateCacheManager`] per material blueprint and pipeline kind.
//! Entries are keyed by [`SignatureId`] and never evicted individually; the
//! whole map is dropped on [`PipelineStateCacheManager::clear`].
//!
//! # Cache miss handling
//!
//! ```text
//! get_or_create(properties)
//!   ├─ hit ──────────────────────────────► entry's pipeline (final or fallback)
//!   └─ miss: insert empty entry
//!        ├─ async && donor found ────────► borrow donor, queue compile
//!        ├─ async && !emergency ─────────► queue compile, return None
//!        └─ otherwise ───────────────────► compile inline, return result
//! ```
//!
//! # Fallback search
//!
//! Greedy and local: starting from the requested properties, drop the
//! non-mandatory property with the lowest visual importance (first one in
//! ascending id order on ties), look up the reduced set, repeat until a compiled entry
//! is found or only mandatory properties remain.
//!
//! # Handle ownership
//!
//! Pipelines are shared through `Arc`. A fallback entry holds a clone of the
//! donor's `Arc`; the dispatch step is the only writer that replaces it with
//! the entry's own pipeline.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::errors::{PsoError, Result};
use crate::renderer::backend::ShaderBackend;
use crate::renderer::pipeline::compiler::PipelineCompiler;
use crate::renderer::pipeline::kind::{Compute, Graphics, PipelineKind};
use crate::renderer::pipeline::persistence::PersistedPipelineCache;
use crate::renderer::pipeline::signature::{PipelineSignature, SignatureId};
use crate::resources::blueprint::{LoadingState, MaterialBlueprint};
use crate::resources::shader_properties::{ShaderProperties, ShaderPropertyId};

// ─── Cache Entry ─────────────────────────────────────────────────────────────

struct EntrySlot<P> {
    pipeline: Option<Arc<P>>,
    using_fallback: bool,
}

/// One requested pipeline state.
///
/// The pipeline is `None` while the first compile is pending (or after it
/// failed), the donor's pipeline while a fallback is borrowed, and the
/// entry's own pipeline once dispatched.
pub struct PipelineStateCacheEntry<B: ShaderBackend, K: PipelineKind> {
    signature: K::Signature,
    slot: RwLock<EntrySlot<K::Pipeline<B>>>,
}

impl<B: ShaderBackend, K: PipelineKind> PipelineStateCacheEntry<B, K> {
    fn new(signature: K::Signature) -> Self {
        Self {
            signature,
            slot: RwLock::new(EntrySlot {
                pipeline: None,
                using_fallback: false,
            }),
        }
    }

    #[must_use]
    pub fn signature(&self) -> &K::Signature {
        &self.signature
    }

    /// Current pipeline object. Both final and fallback pipelines are valid
    /// to draw with; `None` means skip the draw.
    #[must_use]
    pub fn pipeline(&self) -> Option<Arc<K::Pipeline<B>>> {
        self.slot.read().pipeline.clone()
    }

    #[must_use]
    pub fn is_using_fallback(&self) -> bool {
        self.slot.read().using_fallback
    }

    /// Borrows a donor's pipeline unless the entry already has one.
    pub(crate) fn borrow_fallback(&self, donor: Arc<K::Pipeline<B>>) {
        let mut slot = self.slot.write();
        if slot.pipeline.is_none() {
            slot.pipeline = Some(donor);
            slot.using_fallback = true;
        }
    }

    /// Installs the entry's own pipeline, replacing any borrowed fallback.
    pub(crate) fn install(&self, pipeline: Arc<K::Pipeline<B>>) {
        let mut slot = self.slot.write();
        slot.pipeline = Some(pipeline);
        slot.using_fallback = false;
    }

    fn release(&self) {
        let mut slot = self.slot.write();
        slot.pipeline = None;
        slot.using_fallback = false;
    }
}

// ─── Cache Manager ───────────────────────────────────────────────────────────

/// Pipeline-state cache of one material blueprint.
pub struct PipelineStateCacheManager<B: ShaderBackend, K: PipelineKind> {
    material: Arc<dyn MaterialBlueprint<B>>,
    compiler: Arc<PipelineCompiler<B, K>>,
    entries: Mutex<FxHashMap<SignatureId, Arc<PipelineStateCacheEntry<B, K>>>>,
    needs_saving: AtomicBool,
}

pub type GraphicsPipelineStateCacheManager<B> = PipelineStateCacheManager<B, Graphics>;
pub type ComputePipelineStateCacheManager<B> = PipelineStateCacheManager<B, Compute>;

impl<B: ShaderBackend, K: PipelineKind> PipelineStateCacheManager<B, K> {
    #[must_use]
    pub fn new(
        material: Arc<dyn MaterialBlueprint<B>>,
        compiler: Arc<PipelineCompiler<B, K>>,
    ) -> Self {
        Self {
            material,
            compiler,
            entries: Mutex::new(FxHashMap::default()),
            needs_saving: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn material_blueprint_id(&self) -> u32 {
        self.material.id()
    }

    #[must_use]
    pub fn material(&self) -> &Arc<dyn MaterialBlueprint<B>> {
        &self.material
    }

    /// Returns the pipeline for `properties`, creating the cache entry on a
    /// miss.
    ///
    /// `None` means the pipeline is not available yet (or failed to build);
    /// the caller must skip the draw this frame.
    ///
    /// With `allow_emergency_synchronous_compile` set, a miss without a
    /// fallback donor compiles inline instead of returning `None`.
    ///
    /// # Panics
    ///
    /// Panics if the material blueprint is not loaded.
    pub fn get_or_create(
        &self,
        properties: &ShaderProperties,
        allow_emergency_synchronous_compile: bool,
    ) -> Option<Arc<K::Pipeline<B>>> {
        self.assert_material_loaded();

        let signature_id = K::compute_signature_id(&*self.material, properties);
        if let Some(entry) = self.entries.lock().get(&signature_id) {
            return entry.pipeline();
        }

        let signature = K::compute_signature(&*self.material, properties.clone());
        let entry = {
            let mut entries = self.entries.lock();
            // Another thread may have created it since the first lookup.
            if let Some(entry) = entries.get(&signature_id) {
                return entry.pipeline();
            }
            let entry = Arc::new(PipelineStateCacheEntry::new(signature));
            entries.insert(signature_id, Arc::clone(&entry));
            entry
        };
        self.needs_saving.store(true, Ordering::Release);

        let asynchronous = self.compiler.is_asynchronous_compilation_enabled();
        if asynchronous && !properties.is_empty() {
            if let Some(donor) = self.find_fallback(properties) {
                log::debug!(
                    "[{}] Signature {signature_id} borrows a fallback pipeline (material {:#010x})",
                    K::NAME,
                    self.material.id()
                );
                entry.borrow_fallback(Arc::clone(&donor));
                self.compiler
                    .add_asynchronous_compiler_request(Arc::clone(&self.material), entry);
                return Some(donor);
            }
        }

        if asynchronous && !allow_emergency_synchronous_compile {
            log::debug!(
                "[{}] Signature {signature_id} queued without fallback (material {:#010x})",
                K::NAME,
                self.material.id()
            );
            self.compiler
                .add_asynchronous_compiler_request(Arc::clone(&self.material), entry);
            return None;
        }

        log::debug!(
            "[{}] Compiling signature {signature_id} synchronously (material {:#010x})",
            K::NAME,
            self.material.id()
        );
        self.compiler
            .instant_synchronous_compiler_request(&self.material, &entry)
    }

    /// Searches for a compiled entry whose properties are a reduced version of
    /// `properties`.
    fn find_fallback(&self, properties: &ShaderProperties) -> Option<Arc<K::Pipeline<B>>> {
        let mut reduced = properties.clone();

        loop {
            let victim = self.least_important_removable(&reduced)?;
            reduced.remove(victim);

            let candidate_id = K::compute_signature_id(&*self.material, &reduced);
            // Skip entries that are still compiling or failed.
            let donor = self
                .entries
                .lock()
                .get(&candidate_id)
                .and_then(|entry| entry.pipeline());
            if donor.is_some() {
                return donor;
            }
        }
    }

    fn least_important_removable(&self, properties: &ShaderProperties) -> Option<ShaderPropertyId> {
        properties
            .iter()
            .filter_map(|property| {
                let metadata = self.material.property_metadata(property.id);
                (!metadata.mandatory).then_some((property.id, metadata.visual_importance))
            })
            .reduce(|best, candidate| if candidate.1 < best.1 { candidate } else { best })
            .map(|(id, _)| id)
    }

    /// Releases every entry's pipeline and empties the cache.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for entry in entries.values() {
            entry.release();
        }
        entries.clear();
        self.needs_saving.store(true, Ordering::Release);
        log::debug!(
            "[{}] Cleared pipeline-state cache of material {:#010x}",
            K::NAME,
            self.material.id()
        );
    }

    #[must_use]
    pub fn get_entry(
        &self,
        signature_id: SignatureId,
    ) -> Option<Arc<PipelineStateCacheEntry<B, K>>> {
        self.entries.lock().get(&signature_id).cloned()
    }

    /// Signature ids of all entries, ascending.
    #[must_use]
    pub fn signature_ids(&self) -> Vec<SignatureId> {
        let mut ids: Vec<SignatureId> = self.entries.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// `true` once an entry was created or the cache cleared since the last
    /// save.
    #[must_use]
    pub fn needs_saving(&self) -> bool {
        self.needs_saving.load(Ordering::Acquire)
    }

    // ─── Persistence ─────────────────────────────────────────────────────────

    /// Writes the property set of every entry, ordered by signature id.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        let property_sets = {
            let entries = self.entries.lock();
            let mut sorted: Vec<_> = entries.iter().collect();
            sorted.sort_unstable_by_key(|(id, _)| **id);
            sorted
                .into_iter()
                .map(|(_, entry)| entry.signature().properties().clone())
                .collect()
        };

        let persisted = PersistedPipelineCache {
            material_blueprint_id: self.material.id(),
            property_sets,
        };
        persisted.write_to(writer)?;
        self.needs_saving.store(false, Ordering::Release);

        log::info!(
            "[{}] Saved {} pipeline state(s) of material {:#010x}",
            K::NAME,
            persisted.property_sets.len(),
            self.material.id()
        );
        Ok(())
    }

    /// Restores entries from a persisted cache and compiles each new one
    /// synchronously. Must run on the owner thread.
    ///
    /// Returns the number of entries created.
    ///
    /// # Panics
    ///
    /// Panics if the material blueprint is not loaded.
    pub fn load<R: Read>(&self, reader: &mut R) -> Result<usize> {
        self.assert_material_loaded();

        let persisted = PersistedPipelineCache::read_from(reader)?;
        if persisted.material_blueprint_id != self.material.id() {
            return Err(PsoError::MaterialMismatch {
                expected: self.material.id(),
                found: persisted.material_blueprint_id,
            });
        }

        if persisted.property_sets.is_empty() {
            log::warn!(
                "[{}] Persisted cache of material {:#010x} has no entries",
                K::NAME,
                self.material.id()
            );
            return Ok(0);
        }

        let mut created = 0;
        for properties in persisted.property_sets {
            let signature = K::compute_signature(&*self.material, properties);
            let signature_id = signature.id();
            let entry = {
                let mut entries = self.entries.lock();
                if entries.contains_key(&signature_id) {
                    continue;
                }
                let entry = Arc::new(PipelineStateCacheEntry::new(signature));
                entries.insert(signature_id, Arc::clone(&entry));
                entry
            };
            created += 1;
            if self
                .compiler
                .instant_synchronous_compiler_request(&self.material, &entry)
                .is_none()
            {
                log::warn!(
                    "[{}] Pre-warming signature {signature_id} failed; it stays unavailable",
                    K::NAME
                );
            }
        }

        log::info!(
            "[{}] Loaded {created} pipeline state(s) for material {:#010x}",
            K::NAME,
            self.material.id()
        );
        Ok(created)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut reader = BufReader::new(File::open(path)?);
        self.load(&mut reader)
    }

    fn assert_material_loaded(&self) {
        assert_eq!(
            self.material.loading_state(),
            LoadingState::Loaded,
            "pipeline state requested for material blueprint {:#010x} before it finished loading",
            self.material.id()
        );
    }
}
