//! Pipeline-state signatures.
//!
//! A signature is the hashable identity of a requested pipeline state before
//! anything is compiled. It is built in two steps:
//!
//! 1. Per stage, a [`CombinationId`] folds the shader blueprint id with only
//!    those properties the blueprint actually references. Material
//!    configurations that differ solely in unreferenced properties collapse
//!    onto the same compiled shader.
//! 2. The [`SignatureId`] folds the material blueprint id, the pipeline
//!    description hash (graphics only) and each bound stage's combination id,
//!    in stage order.
//!
//! Equality of signatures is equality of their [`SignatureId`]. Collisions are
//! accepted as statistically negligible.

use std::fmt;

use crate::renderer::backend::ShaderBackend;
use crate::resources::blueprint::{MaterialBlueprint, ShaderBlueprint, ShaderStage};
use crate::resources::shader_properties::ShaderProperties;
use crate::utils::hash::{FNV1A_INITIAL_HASH_32, fnv1a_32, fold_u32};

/// Number of graphics stages folded into a graphics signature.
pub const NUMBER_OF_GRAPHICS_STAGES: usize = ShaderStage::GRAPHICS.len();

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// Identity of one compiled shader: blueprint + filtered properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CombinationId(pub(crate) u32);

impl CombinationId {
    /// Sentinel for stages without a bound shader.
    pub const INVALID: CombinationId = CombinationId(u32::MAX);

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for CombinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Identity of one pipeline state within a material blueprint's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignatureId(pub(crate) u32);

impl SignatureId {
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ─── Hashing rules ───────────────────────────────────────────────────────────

/// Folds `shader_blueprint_id` and every property of `properties` that
/// `referenced` contains (ascending id order) into a combination id.
///
/// Each folded property contributes its id and its value as two
/// little-endian 32 bit words.
#[must_use]
pub fn compute_combination_id(
    shader_blueprint_id: u32,
    properties: &ShaderProperties,
    referenced: &ShaderProperties,
) -> CombinationId {
    let mut hash = fold_u32(FNV1A_INITIAL_HASH_32, shader_blueprint_id);
    for property in properties {
        if referenced.has_value(property.id) {
            hash = fold_u32(hash, property.id.raw());
            hash = fnv1a_32(&property.value.to_le_bytes(), hash);
        }
    }
    CombinationId(hash)
}

/// Computes the signature id and per-stage combination ids of a graphics
/// pipeline. Unbound stages keep [`CombinationId::INVALID`] and add no term.
#[must_use]
pub fn compute_graphics_signature(
    material_blueprint_id: u32,
    pipeline_description_hash: u32,
    properties: &ShaderProperties,
    stages: &[Option<&dyn ShaderBlueprint>; NUMBER_OF_GRAPHICS_STAGES],
) -> (SignatureId, [CombinationId; NUMBER_OF_GRAPHICS_STAGES]) {
    let mut hash = fold_u32(FNV1A_INITIAL_HASH_32, material_blueprint_id);
    hash = fold_u32(hash, pipeline_description_hash);

    let mut combination_ids = [CombinationId::INVALID; NUMBER_OF_GRAPHICS_STAGES];
    for (slot, blueprint) in combination_ids.iter_mut().zip(stages) {
        if let Some(blueprint) = blueprint {
            let combination_id = compute_combination_id(
                blueprint.id(),
                properties,
                blueprint.referenced_properties(),
            );
            hash = fold_u32(hash, combination_id.raw());
            *slot = combination_id;
        }
    }

    (SignatureId(hash), combination_ids)
}

/// Single-stage counterpart of [`compute_graphics_signature`], without a
/// pipeline description term.
#[must_use]
pub fn compute_compute_signature(
    material_blueprint_id: u32,
    properties: &ShaderProperties,
    compute_shader: Option<&dyn ShaderBlueprint>,
) -> (SignatureId, CombinationId) {
    let mut hash = fold_u32(FNV1A_INITIAL_HASH_32, material_blueprint_id);
    let mut combination_id = CombinationId::INVALID;
    if let Some(blueprint) = compute_shader {
        combination_id = compute_combination_id(
            blueprint.id(),
            properties,
            blueprint.referenced_properties(),
        );
        hash = fold_u32(hash, combination_id.raw());
    }
    (SignatureId(hash), combination_id)
}

// ─── Signature types ─────────────────────────────────────────────────────────

/// Common view over graphics and compute signatures.
pub trait PipelineSignature: fmt::Debug + Clone + Send + Sync + 'static {
    fn id(&self) -> SignatureId;

    fn material_blueprint_id(&self) -> u32;

    /// Full property set the signature was requested with.
    fn properties(&self) -> &ShaderProperties;

    /// Combination id of `stage`, or [`CombinationId::INVALID`].
    fn combination_id(&self, stage: ShaderStage) -> CombinationId;
}

/// Signature of a graphics pipeline state.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineSignature {
    material_blueprint_id: u32,
    pipeline_description_hash: u32,
    properties: ShaderProperties,
    combination_ids: [CombinationId; NUMBER_OF_GRAPHICS_STAGES],
    id: SignatureId,
}

impl GraphicsPipelineSignature {
    #[must_use]
    pub fn new(
        material_blueprint_id: u32,
        pipeline_description_hash: u32,
        properties: ShaderProperties,
        stages: &[Option<&dyn ShaderBlueprint>; NUMBER_OF_GRAPHICS_STAGES],
    ) -> Self {
        let (id, combination_ids) = compute_graphics_signature(
            material_blueprint_id,
            pipeline_description_hash,
            &properties,
            stages,
        );
        Self {
            material_blueprint_id,
            pipeline_description_hash,
            properties,
            combination_ids,
            id,
        }
    }

    #[must_use]
    pub fn from_material<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: ShaderProperties,
    ) -> Self {
        let stages = ShaderStage::GRAPHICS.map(|stage| material.shader_blueprint(stage));
        Self::new(
            material.id(),
            material.pipeline_description_hash(),
            properties,
            &stages,
        )
    }

    #[must_use]
    pub fn pipeline_description_hash(&self) -> u32 {
        self.pipeline_description_hash
    }
}

impl PipelineSignature for GraphicsPipelineSignature {
    fn id(&self) -> SignatureId {
        self.id
    }

    fn material_blueprint_id(&self) -> u32 {
        self.material_blueprint_id
    }

    fn properties(&self) -> &ShaderProperties {
        &self.properties
    }

    fn combination_id(&self, stage: ShaderStage) -> CombinationId {
        self.combination_ids
            .get(stage.index())
            .copied()
            .unwrap_or(CombinationId::INVALID)
    }
}

impl PartialEq for GraphicsPipelineSignature {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GraphicsPipelineSignature {}

/// Signature of a compute pipeline state.
#[derive(Debug, Clone)]
pub struct ComputePipelineSignature {
    material_blueprint_id: u32,
    properties: ShaderProperties,
    combination_id: CombinationId,
    id: SignatureId,
}

impl ComputePipelineSignature {
    #[must_use]
    pub fn new(
        material_blueprint_id: u32,
        properties: ShaderProperties,
        compute_shader: Option<&dyn ShaderBlueprint>,
    ) -> Self {
        let (id, combination_id) =
            compute_compute_signature(material_blueprint_id, &properties, compute_shader);
        Self {
            material_blueprint_id,
            properties,
            combination_id,
            id,
        }
    }

    #[must_use]
    pub fn from_material<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: ShaderProperties,
    ) -> Self {
        Self::new(
            material.id(),
            properties,
            material.shader_blueprint(ShaderStage::Compute),
        )
    }
}

impl PipelineSignature for ComputePipelineSignature {
    fn id(&self) -> SignatureId {
        self.id
    }

    fn material_blueprint_id(&self) -> u32 {
        self.material_blueprint_id
    }

    fn properties(&self) -> &ShaderProperties {
        &self.properties
    }

    fn combination_id(&self, stage: ShaderStage) -> CombinationId {
        if stage == ShaderStage::Compute {
            self.combination_id
        } else {
            CombinationId::INVALID
        }
    }
}

impl PartialEq for ComputePipelineSignature {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComputePipelineSignature {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::resources::blueprint::ShaderLanguage;
    use crate::resources::shader_properties::ShaderPropertyId;

    struct FixedBlueprint {
        id: u32,
        referenced: ShaderProperties,
    }

    impl FixedBlueprint {
        fn new(id: u32, referenced: &[u32]) -> Self {
            Self {
                id,
                referenced: referenced
                    .iter()
                    .map(|&raw| (ShaderPropertyId::new(raw), 0))
                    .collect(),
            }
        }
    }

    impl ShaderBlueprint for FixedBlueprint {
        fn id(&self) -> u32 {
            self.id
        }

        fn referenced_properties(&self) -> &ShaderProperties {
            &self.referenced
        }

        fn build_source(&self, _: ShaderLanguage, _: &ShaderProperties) -> Result<String> {
            Ok(String::new())
        }
    }

    fn props(pairs: &[(u32, i32)]) -> ShaderProperties {
        pairs
            .iter()
            .map(|&(id, value)| (ShaderPropertyId::new(id), value))
            .collect()
    }

    #[test]
    fn test_combination_id_is_deterministic() {
        let referenced = props(&[(1, 0), (2, 0)]);
        let a = compute_combination_id(42, &props(&[(1, 1), (2, 5)]), &referenced);
        let b = compute_combination_id(42, &props(&[(2, 5), (1, 1)]), &referenced);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unreferenced_property_does_not_change_combination() {
        let referenced = props(&[(1, 0)]);
        let a = compute_combination_id(42, &props(&[(1, 1), (9, 0)]), &referenced);
        let b = compute_combination_id(42, &props(&[(1, 1), (9, 7)]), &referenced);
        let c = compute_combination_id(42, &props(&[(1, 1)]), &referenced);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_referenced_property_changes_combination() {
        let referenced = props(&[(1, 0)]);
        let a = compute_combination_id(42, &props(&[(1, 1)]), &referenced);
        let b = compute_combination_id(42, &props(&[(1, 2)]), &referenced);
        assert_ne!(a, b);
    }

    #[test]
    fn test_blueprint_id_changes_combination() {
        let referenced = props(&[(1, 0)]);
        let a = compute_combination_id(1, &props(&[(1, 1)]), &referenced);
        let b = compute_combination_id(2, &props(&[(1, 1)]), &referenced);
        assert_ne!(a, b);
    }

    #[test]
    fn test_graphics_signature_skips_unbound_stages() {
        let vs = FixedBlueprint::new(10, &[1]);
        let fs = FixedBlueprint::new(11, &[2]);
        let stages: [Option<&dyn ShaderBlueprint>; 5] = [Some(&vs), None, None, None, Some(&fs)];
        let properties = props(&[(1, 1), (2, 1)]);

        let (id, combos) = compute_graphics_signature(7, 99, &properties, &stages);

        assert!(combos[0].is_valid());
        assert!(!combos[1].is_valid());
        assert!(!combos[2].is_valid());
        assert!(!combos[3].is_valid());
        assert!(combos[4].is_valid());

        let expected = [7u32, 99, combos[0].raw(), combos[4].raw()]
            .into_iter()
            .fold(FNV1A_INITIAL_HASH_32, fold_u32);
        assert_eq!(id.raw(), expected);
    }

    #[test]
    fn test_graphics_signature_depends_on_description_hash() {
        let vs = FixedBlueprint::new(10, &[1]);
        let stages: [Option<&dyn ShaderBlueprint>; 5] = [Some(&vs), None, None, None, None];
        let properties = props(&[(1, 1)]);

        let a = GraphicsPipelineSignature::new(7, 1, properties.clone(), &stages);
        let b = GraphicsPipelineSignature::new(7, 2, properties.clone(), &stages);
        let c = GraphicsPipelineSignature::new(7, 1, properties, &stages);
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_compute_signature() {
        let cs = FixedBlueprint::new(20, &[1]);
        let a = ComputePipelineSignature::new(3, props(&[(1, 1)]), Some(&cs));
        let b = ComputePipelineSignature::new(3, props(&[(1, 1), (5, 5)]), Some(&cs));
        let c = ComputePipelineSignature::new(3, props(&[(1, 2)]), Some(&cs));

        assert_eq!(a, b, "Unreferenced property must collapse");
        assert_ne!(a, c);
        assert!(a.combination_id(ShaderStage::Compute).is_valid());
        assert!(!a.combination_id(ShaderStage::Vertex).is_valid());
    }
}
