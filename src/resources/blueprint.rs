//! Material and shader blueprints
//!
//! The pipeline-state cache does not parse materials or shader sources itself.
//! It talks to two collaborators:
//!
//! - [`ShaderBlueprint`]: one shader template bound to a single stage. Knows
//!   which properties it branches on and can emit source text for a
//!   concrete [`ShaderProperties`] set.
//! - [`MaterialBlueprint`]: binds shader blueprints to pipeline stages, owns the
//!   fixed-function pipeline description, and tags properties with the
//!   importance metadata used by the fallback search.
//!
//! [`BasicMaterialBlueprint`] is a plain table-driven implementation for hosts
//! without their own material system.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::renderer::backend::ShaderBackend;
use crate::resources::shader_properties::{ShaderProperties, ShaderPropertyId};
use crate::utils::hash::fnv_hash_key;

// ─── Stages & Languages ──────────────────────────────────────────────────────

/// Pipeline shader stage.
///
/// The discriminant is the stage's slot index; graphics stages come first,
/// in pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ShaderStage {
    Vertex = 0,
    TessellationControl = 1,
    TessellationEvaluation = 2,
    Geometry = 3,
    Fragment = 4,
    Compute = 5,
}

impl ShaderStage {
    /// Number of stage slots.
    pub const COUNT: usize = 6;

    /// Graphics stages in the order they are folded into a signature.
    pub const GRAPHICS: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    pub const COMPUTE: [ShaderStage; 1] = [ShaderStage::Compute];

    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Shader language expected by a backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum ShaderLanguage {
    #[default]
    Wgsl,
    Glsl,
    Hlsl,
    Msl,
}

/// Loading state of a material blueprint resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Per-property metadata consulted by the fallback search.
///
/// `visual_importance` is compared as an arbitrary total order over `i32`;
/// no range or normalization is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyMetadata {
    pub visual_importance: i32,
    /// Dropping a mandatory property would change program correctness,
    /// so the fallback search never removes it.
    pub mandatory: bool,
}

impl PropertyMetadata {
    #[must_use]
    pub const fn new(visual_importance: i32, mandatory: bool) -> Self {
        Self {
            visual_importance,
            mandatory,
        }
    }

    #[must_use]
    pub const fn mandatory() -> Self {
        Self {
            visual_importance: i32::MAX,
            mandatory: true,
        }
    }
}

// ─── Collaborator traits ─────────────────────────────────────────────────────

/// A shader template bound to one stage.
pub trait ShaderBlueprint: Send + Sync {
    /// Stable resource id, folded into every shader combination id.
    fn id(&self) -> u32;

    /// Properties the template actually branches on. Only their ids matter.
    fn referenced_properties(&self) -> &ShaderProperties;

    /// Generates shader source text for `properties`.
    fn build_source(&self, language: ShaderLanguage, properties: &ShaderProperties)
    -> Result<String>;
}

/// A material blueprint: the owner of one pipeline-state cache.
pub trait MaterialBlueprint<B: ShaderBackend>: Send + Sync {
    /// Stable resource id, folded into every signature id.
    fn id(&self) -> u32;

    fn loading_state(&self) -> LoadingState;

    /// Shader blueprint bound at `stage`, if any.
    fn shader_blueprint(&self, stage: ShaderStage) -> Option<&dyn ShaderBlueprint>;

    /// Fixed-function state for graphics pipelines. `None` for compute materials.
    fn pipeline_description(&self) -> Option<&B::PipelineDescription>;

    /// Hash of [`Self::pipeline_description`], folded into graphics signatures.
    fn pipeline_description_hash(&self) -> u32 {
        self.pipeline_description().map_or(0, fnv_hash_key)
    }

    fn property_metadata(&self, id: ShaderPropertyId) -> PropertyMetadata;
}

// ─── BasicMaterialBlueprint ──────────────────────────────────────────────────

/// Table-driven [`MaterialBlueprint`].
///
/// ```rust,ignore
/// let material = BasicMaterialBlueprint::<MyBackend>::new(0x1234)
///     .with_shader(ShaderStage::Vertex, vertex_blueprint)
///     .with_shader(ShaderStage::Fragment, fragment_blueprint)
///     .with_pipeline_description(description)
///     .with_property(ShaderPropertyId::from_name("UseShadows"), PropertyMetadata::mandatory());
/// ```
pub struct BasicMaterialBlueprint<B: ShaderBackend> {
    id: u32,
    loading_state: LoadingState,
    stages: [Option<Arc<dyn ShaderBlueprint>>; ShaderStage::COUNT],
    pipeline_description: Option<B::PipelineDescription>,
    pipeline_description_hash: u32,
    property_metadata: FxHashMap<ShaderPropertyId, PropertyMetadata>,
}

impl<B: ShaderBackend> BasicMaterialBlueprint<B> {
    /// Creates a loaded material blueprint with no stages bound.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            loading_state: LoadingState::Loaded,
            stages: Default::default(),
            pipeline_description: None,
            pipeline_description_hash: 0,
            property_metadata: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_shader(mut self, stage: ShaderStage, blueprint: Arc<dyn ShaderBlueprint>) -> Self {
        self.stages[stage.index()] = Some(blueprint);
        self
    }

    #[must_use]
    pub fn with_pipeline_description(mut self, description: B::PipelineDescription) -> Self {
        self.pipeline_description_hash = fnv_hash_key(&description);
        self.pipeline_description = Some(description);
        self
    }

    #[must_use]
    pub fn with_property(mut self, id: ShaderPropertyId, metadata: PropertyMetadata) -> Self {
        self.property_metadata.insert(id, metadata);
        self
    }

    #[must_use]
    pub fn with_loading_state(mut self, state: LoadingState) -> Self {
        self.loading_state = state;
        self
    }

    pub fn set_loading_state(&mut self, state: LoadingState) {
        self.loading_state = state;
    }
}

impl<B: ShaderBackend> MaterialBlueprint<B> for BasicMaterialBlueprint<B> {
    fn id(&self) -> u32 {
        self.id
    }

    fn loading_state(&self) -> LoadingState {
        self.loading_state
    }

    fn shader_blueprint(&self, stage: ShaderStage) -> Option<&dyn ShaderBlueprint> {
        self.stages[stage.index()].as_deref()
    }

    fn pipeline_description(&self) -> Option<&B::PipelineDescription> {
        self.pipeline_description.as_ref()
    }

    fn pipeline_description_hash(&self) -> u32 {
        self.pipeline_description_hash
    }

    fn property_metadata(&self, id: ShaderPropertyId) -> PropertyMetadata {
        self.property_metadata.get(&id).copied().unwrap_or_default()
    }
}

impl<B: ShaderBackend> fmt::Debug for BasicMaterialBlueprint<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<ShaderStage> = ShaderStage::ALL
            .into_iter()
            .filter(|stage| self.stages[stage.index()].is_some())
            .collect();
        f.debug_struct("BasicMaterialBlueprint")
            .field("id", &format_args!("{:#010x}", self.id))
            .field("loading_state", &self.loading_state)
            .field("stages", &bound)
            .field("pipeline_description_hash", &self.pipeline_description_hash)
            .finish_non_exhaustive()
    }
}
