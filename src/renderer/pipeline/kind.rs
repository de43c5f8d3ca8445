//! Graphics / compute pipeline families.
//!
//! The cache manager and the compiler are written once and instantiated per
//! [`PipelineKind`]. A kind picks the signature type, the native pipeline
//! type, the stages to build, and the backend call that assembles the final
//! pipeline object.

use crate::errors::{PsoError, Result};
use crate::renderer::backend::{ShaderBackend, StageShaders};
use crate::renderer::pipeline::signature::{
    ComputePipelineSignature, GraphicsPipelineSignature, PipelineSignature, SignatureId,
    compute_compute_signature, compute_graphics_signature,
};
use crate::resources::blueprint::{MaterialBlueprint, ShaderStage};
use crate::resources::shader_properties::ShaderProperties;

pub trait PipelineKind: Send + Sync + 'static {
    type Signature: PipelineSignature;
    type Pipeline<B: ShaderBackend>: Send + Sync + 'static;

    /// Label used in logs and thread names.
    const NAME: &'static str;

    /// Stages a request of this kind may build.
    const STAGES: &'static [ShaderStage];

    fn compute_signature<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: ShaderProperties,
    ) -> Self::Signature;

    /// Signature id only; used by the fallback search lookups.
    fn compute_signature_id<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: &ShaderProperties,
    ) -> SignatureId;

    fn create_pipeline<B: ShaderBackend>(
        backend: &B,
        material: &dyn MaterialBlueprint<B>,
        shaders: &StageShaders<B::Shader>,
    ) -> Result<Self::Pipeline<B>>;
}

/// Rasterization pipelines (up to five stages).
#[derive(Debug, Clone, Copy)]
pub struct Graphics;

/// Compute pipelines (single stage).
#[derive(Debug, Clone, Copy)]
pub struct Compute;

impl PipelineKind for Graphics {
    type Signature = GraphicsPipelineSignature;
    type Pipeline<B: ShaderBackend> = B::GraphicsPipeline;

    const NAME: &'static str = "graphics";
    const STAGES: &'static [ShaderStage] = &ShaderStage::GRAPHICS;

    fn compute_signature<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: ShaderProperties,
    ) -> Self::Signature {
        GraphicsPipelineSignature::from_material(material, properties)
    }

    fn compute_signature_id<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: &ShaderProperties,
    ) -> SignatureId {
        let stages = ShaderStage::GRAPHICS.map(|stage| material.shader_blueprint(stage));
        compute_graphics_signature(
            material.id(),
            material.pipeline_description_hash(),
            properties,
            &stages,
        )
        .0
    }

    fn create_pipeline<B: ShaderBackend>(
        backend: &B,
        material: &dyn MaterialBlueprint<B>,
        shaders: &StageShaders<B::Shader>,
    ) -> Result<Self::Pipeline<B>> {
        let description = material
            .pipeline_description()
            .ok_or(PsoError::MissingPipelineDescription(material.id()))?;
        backend.create_graphics_pipeline(description, shaders)
    }
}

impl PipelineKind for Compute {
    type Signature = ComputePipelineSignature;
    type Pipeline<B: ShaderBackend> = B::ComputePipeline;

    const NAME: &'static str = "compute";
    const STAGES: &'static [ShaderStage] = &ShaderStage::COMPUTE;

    fn compute_signature<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: ShaderProperties,
    ) -> Self::Signature {
        ComputePipelineSignature::from_material(material, properties)
    }

    fn compute_signature_id<B: ShaderBackend>(
        material: &dyn MaterialBlueprint<B>,
        properties: &ShaderProperties,
    ) -> SignatureId {
        compute_compute_signature(
            material.id(),
            properties,
            material.shader_blueprint(ShaderStage::Compute),
        )
        .0
    }

    fn create_pipeline<B: ShaderBackend>(
        backend: &B,
        _material: &dyn MaterialBlueprint<B>,
        shaders: &StageShaders<B::Shader>,
    ) -> Result<Self::Pipeline<B>> {
        let shader = shaders.get(ShaderStage::Compute).ok_or_else(|| {
            PsoError::PipelineCreateFailed("no compiled compute shader".to_owned())
        })?;
        backend.create_compute_pipeline(shader)
    }
}
