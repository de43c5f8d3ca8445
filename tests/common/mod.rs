//! Shared test fixtures: an in-memory backend and shader blueprint.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use myth_pso::errors::{PsoError, Result};
use myth_pso::renderer::backend::{ShaderBackend, StageShaders};
use myth_pso::resources::blueprint::{
    BasicMaterialBlueprint, MaterialBlueprint, PropertyMetadata, ShaderBlueprint, ShaderLanguage,
    ShaderStage,
};
use myth_pso::resources::shader_properties::{ShaderProperties, ShaderPropertyId};
use myth_pso::{PipelineCompilerService, PipelineCompilerSettings};

pub const A: ShaderPropertyId = ShaderPropertyId::new(1);
pub const B: ShaderPropertyId = ShaderPropertyId::new(2);
pub const M: ShaderPropertyId = ShaderPropertyId::new(3);
pub const UNREFERENCED: ShaderPropertyId = ShaderPropertyId::new(99);

pub const MATERIAL_ID: u32 = 0x00C0_FFEE;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn props(pairs: &[(ShaderPropertyId, i32)]) -> ShaderProperties {
    pairs.iter().copied().collect()
}

// ─── Backend ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MockShader {
    pub stage: ShaderStage,
    pub source: String,
}

#[derive(Debug)]
pub struct MockPipeline {
    pub serial: usize,
    pub sources: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    compiles: AtomicUsize,
    graphics_creates: AtomicUsize,
    compute_creates: AtomicUsize,
    fail_compile: AtomicBool,
    fail_create: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn graphics_create_count(&self) -> usize {
        self.graphics_creates.load(Ordering::SeqCst)
    }

    pub fn compute_create_count(&self) -> usize {
        self.compute_creates.load(Ordering::SeqCst)
    }

    pub fn set_fail_compile(&self, fail: bool) {
        self.fail_compile.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

impl ShaderBackend for MockBackend {
    type Shader = MockShader;
    type GraphicsPipeline = MockPipeline;
    type ComputePipeline = MockPipeline;
    type PipelineDescription = u32;

    fn shader_language(&self) -> ShaderLanguage {
        ShaderLanguage::Wgsl
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<MockShader> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if self.fail_compile.load(Ordering::SeqCst) {
            return Err(PsoError::ShaderCompileFailed {
                stage,
                reason: "rejected by mock compiler".to_owned(),
            });
        }
        Ok(MockShader {
            stage,
            source: source.to_owned(),
        })
    }

    fn create_graphics_pipeline(
        &self,
        _description: &u32,
        shaders: &StageShaders<MockShader>,
    ) -> Result<MockPipeline> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PsoError::PipelineCreateFailed("mock failure".to_owned()));
        }
        let serial = self.graphics_creates.fetch_add(1, Ordering::SeqCst);
        let sources = ShaderStage::GRAPHICS
            .into_iter()
            .filter_map(|stage| shaders.get(stage))
            .map(|shader| shader.source.clone())
            .collect();
        Ok(MockPipeline { serial, sources })
    }

    fn create_compute_pipeline(&self, shader: &MockShader) -> Result<MockPipeline> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PsoError::PipelineCreateFailed("mock failure".to_owned()));
        }
        let serial = self.compute_creates.fetch_add(1, Ordering::SeqCst);
        Ok(MockPipeline {
            serial,
            sources: vec![shader.source.clone()],
        })
    }
}

// ─── Shader blueprint ────────────────────────────────────────────────────────

/// Emits `"<name>"` followed by every referenced property value, unless a
/// constant source is configured.
#[derive(Debug)]
pub struct MockShaderBlueprint {
    pub id: u32,
    pub name: &'static str,
    pub referenced: ShaderProperties,
    pub constant_source: Option<String>,
    pub fail: bool,
}

impl MockShaderBlueprint {
    pub fn new(id: u32, name: &'static str, referenced: &[ShaderPropertyId]) -> Self {
        Self {
            id,
            name,
            referenced: referenced.iter().map(|&id| (id, 0)).collect(),
            constant_source: None,
            fail: false,
        }
    }

    pub fn with_constant_source(mut self, source: &str) -> Self {
        self.constant_source = Some(source.to_owned());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl ShaderBlueprint for MockShaderBlueprint {
    fn id(&self) -> u32 {
        self.id
    }

    fn referenced_properties(&self) -> &ShaderProperties {
        &self.referenced
    }

    fn build_source(
        &self,
        _language: ShaderLanguage,
        properties: &ShaderProperties,
    ) -> Result<String> {
        if self.fail {
            return Err(PsoError::ShaderBuildFailed {
                shader_blueprint: self.id,
                reason: "mock build failure".to_owned(),
            });
        }
        if let Some(source) = &self.constant_source {
            return Ok(source.clone());
        }
        let mut source = self.name.to_owned();
        for property in properties {
            if self.referenced.has_value(property.id) {
                source.push_str(&format!(" {}={}", property.id.raw(), property.value));
            }
        }
        Ok(source)
    }
}

// ─── Materials & services ────────────────────────────────────────────────────

/// Vertex + fragment material referencing `A`, `B` and `M`, with
/// importance `A` = 10, `B` = 1 and `M` mandatory.
pub fn graphics_material() -> BasicMaterialBlueprint<MockBackend> {
    BasicMaterialBlueprint::new(MATERIAL_ID)
        .with_shader(
            ShaderStage::Vertex,
            Arc::new(MockShaderBlueprint::new(10, "vs", &[A, B, M])),
        )
        .with_shader(
            ShaderStage::Fragment,
            Arc::new(MockShaderBlueprint::new(11, "fs", &[A, B, M])),
        )
        .with_pipeline_description(7)
        .with_property(A, PropertyMetadata::new(10, false))
        .with_property(B, PropertyMetadata::new(1, false))
        .with_property(M, PropertyMetadata::mandatory())
}

pub fn shared(
    material: BasicMaterialBlueprint<MockBackend>,
) -> Arc<dyn MaterialBlueprint<MockBackend>> {
    Arc::new(material)
}

pub fn service(backend: &Arc<MockBackend>, threads: usize) -> PipelineCompilerService<MockBackend> {
    let settings = PipelineCompilerSettings {
        asynchronous_compilation: true,
        compiler_threads: Some(threads),
    };
    PipelineCompilerService::new(Arc::clone(backend), &settings).unwrap()
}

/// Drains every queue and installs the results.
pub fn settle(service: &PipelineCompilerService<MockBackend>) -> usize {
    service.flush_all_queues();
    service.dispatch()
}
