//! wgpu backend
//!
//! WGSL only. Graphics pipelines use a vertex and a fragment stage with the
//! entry points `vs_main` / `fs_main`; compute pipelines use `main`. Layouts
//! are derived automatically from the shaders.
//!
//! `wgpu` descriptor types do not implement `Hash`, so the fixed-function
//! state is described with hashable mirror types that are converted back to
//! descriptors at pipeline creation time.
//!
//! Shader diagnostics are collected from the module's compilation info.
//! Pipeline validation errors go to the device's uncaptured-error handler.

use crate::errors::{PsoError, Result};
use crate::renderer::backend::{ShaderBackend, StageShaders};
use crate::resources::blueprint::{ShaderLanguage, ShaderStage};

// ─── Hashable Mirror Types ────────────────────────────────────────────────────

/// Hashable mirror of `wgpu::BlendComponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentKey {
    pub src_factor: wgpu::BlendFactor,
    pub dst_factor: wgpu::BlendFactor,
    pub operation: wgpu::BlendOperation,
}

impl From<wgpu::BlendComponent> for BlendComponentKey {
    fn from(b: wgpu::BlendComponent) -> Self {
        Self {
            src_factor: b.src_factor,
            dst_factor: b.dst_factor,
            operation: b.operation,
        }
    }
}

impl From<BlendComponentKey> for wgpu::BlendComponent {
    fn from(b: BlendComponentKey) -> Self {
        Self {
            src_factor: b.src_factor,
            dst_factor: b.dst_factor,
            operation: b.operation,
        }
    }
}

/// Hashable mirror of `wgpu::BlendState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateKey {
    pub color: BlendComponentKey,
    pub alpha: BlendComponentKey,
}

impl From<wgpu::BlendState> for BlendStateKey {
    fn from(b: wgpu::BlendState) -> Self {
        Self {
            color: b.color.into(),
            alpha: b.alpha.into(),
        }
    }
}

impl From<BlendStateKey> for wgpu::BlendState {
    fn from(b: BlendStateKey) -> Self {
        Self {
            color: b.color.into(),
            alpha: b.alpha.into(),
        }
    }
}

/// Hashable mirror of `wgpu::ColorTargetState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetKey {
    pub format: wgpu::TextureFormat,
    pub blend: Option<BlendStateKey>,
    pub write_mask: u32, // wgpu::ColorWrites bits
}

impl From<wgpu::ColorTargetState> for ColorTargetKey {
    fn from(c: wgpu::ColorTargetState) -> Self {
        Self {
            format: c.format,
            blend: c.blend.map(Into::into),
            write_mask: c.write_mask.bits(),
        }
    }
}

impl From<ColorTargetKey> for wgpu::ColorTargetState {
    fn from(c: ColorTargetKey) -> Self {
        Self {
            format: c.format,
            blend: c.blend.map(Into::into),
            write_mask: wgpu::ColorWrites::from_bits_truncate(c.write_mask),
        }
    }
}

/// Hashable mirror of `wgpu::DepthStencilState` without stencil testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilKey {
    pub format: wgpu::TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub bias_constant: i32,
    pub bias_slope_scale_bits: u32,
    pub bias_clamp_bits: u32,
}

impl From<DepthStencilKey> for wgpu::DepthStencilState {
    fn from(d: DepthStencilKey) -> Self {
        Self {
            format: d.format,
            depth_write_enabled: Some(d.depth_write_enabled),
            depth_compare: Some(d.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: d.bias_constant,
                slope_scale: f32::from_bits(d.bias_slope_scale_bits),
                clamp: f32::from_bits(d.bias_clamp_bits),
            },
        }
    }
}

/// Hashable mirror of `wgpu::MultisampleState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultisampleKey {
    pub count: u32,
    pub mask: u64,
    pub alpha_to_coverage_enabled: bool,
}

impl Default for MultisampleKey {
    fn default() -> Self {
        Self {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }
}

impl From<MultisampleKey> for wgpu::MultisampleState {
    fn from(m: MultisampleKey) -> Self {
        Self {
            count: m.count,
            mask: m.mask,
            alpha_to_coverage_enabled: m.alpha_to_coverage_enabled,
        }
    }
}

/// Owned, hashable vertex buffer layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferKey {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexBufferKey {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

/// Fixed-function state of a wgpu graphics pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WgpuPipelineDescription {
    pub vertex_buffers: Vec<VertexBufferKey>,
    pub color_targets: Vec<ColorTargetKey>,
    pub depth_stencil: Option<DepthStencilKey>,
    pub multisample: MultisampleKey,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
}

impl WgpuPipelineDescription {
    /// Triangle list, back-face culling, one color target, no depth.
    #[must_use]
    pub fn new(color_format: wgpu::TextureFormat) -> Self {
        Self {
            vertex_buffers: Vec::new(),
            color_targets: vec![ColorTargetKey {
                format: color_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL.bits(),
            }],
            depth_stencil: None,
            multisample: MultisampleKey::default(),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            front_face: wgpu::FrontFace::Ccw,
        }
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

/// [`ShaderBackend`] over a `wgpu::Device`.
#[derive(Debug, Clone)]
pub struct WgpuBackend {
    device: wgpu::Device,
}

impl WgpuBackend {
    #[must_use]
    pub fn new(device: wgpu::Device) -> Self {
        Self { device }
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl ShaderBackend for WgpuBackend {
    type Shader = wgpu::ShaderModule;
    type GraphicsPipeline = wgpu::RenderPipeline;
    type ComputePipeline = wgpu::ComputePipeline;
    type PipelineDescription = WgpuPipelineDescription;

    fn shader_language(&self) -> ShaderLanguage {
        ShaderLanguage::Wgsl
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader> {
        if !matches!(
            stage,
            ShaderStage::Vertex | ShaderStage::Fragment | ShaderStage::Compute
        ) {
            return Err(PsoError::UnsupportedStage(stage));
        }

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("myth-pso {stage:?} shader")),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|message| message.message_type == wgpu::CompilationMessageType::Error)
            .map(|message| message.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(PsoError::ShaderCompileFailed {
                stage,
                reason: errors.join("\n"),
            });
        }

        Ok(module)
    }

    fn create_graphics_pipeline(
        &self,
        description: &Self::PipelineDescription,
        shaders: &StageShaders<Self::Shader>,
    ) -> Result<Self::GraphicsPipeline> {
        for stage in [
            ShaderStage::TessellationControl,
            ShaderStage::TessellationEvaluation,
            ShaderStage::Geometry,
        ] {
            if shaders.contains(stage) {
                return Err(PsoError::UnsupportedStage(stage));
            }
        }

        let vertex_module = shaders.get(ShaderStage::Vertex).ok_or_else(|| {
            PsoError::PipelineCreateFailed("graphics pipeline without vertex shader".to_owned())
        })?;

        let vertex_buffers: Vec<_> = description
            .vertex_buffers
            .iter()
            .map(VertexBufferKey::as_wgpu)
            .collect();
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = description
            .color_targets
            .iter()
            .map(|target| Some((*target).into()))
            .collect();

        let fragment = shaders
            .get(ShaderStage::Fragment)
            .map(|module| wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &color_targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            });

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("myth-pso graphics pipeline"),
                layout: None,
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some("vs_main"),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment,
                primitive: wgpu::PrimitiveState {
                    topology: description.topology,
                    front_face: description.front_face,
                    cull_mode: description.cull_mode,
                    ..Default::default()
                },
                depth_stencil: description.depth_stencil.map(Into::into),
                multisample: description.multisample.into(),
                multiview_mask: None,
                cache: None,
            }))
    }

    fn create_compute_pipeline(&self, shader: &Self::Shader) -> Result<Self::ComputePipeline> {
        Ok(self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("myth-pso compute pipeline"),
                layout: None,
                module: shader,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash::fnv_hash_key;

    #[test]
    fn test_description_hash_is_stable() {
        let a = WgpuPipelineDescription::new(wgpu::TextureFormat::Bgra8UnormSrgb);
        let b = WgpuPipelineDescription::new(wgpu::TextureFormat::Bgra8UnormSrgb);
        assert_eq!(fnv_hash_key(&a), fnv_hash_key(&b));

        let mut c = b.clone();
        c.cull_mode = None;
        assert_ne!(fnv_hash_key(&a), fnv_hash_key(&c));
    }

    #[test]
    fn test_color_target_round_trips_write_mask() {
        let state = wgpu::ColorTargetState {
            format: wgpu::TextureFormat::Rgba8Unorm,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::COLOR,
        };
        let key = ColorTargetKey::from(state.clone());
        let back: wgpu::ColorTargetState = key.into();
        assert_eq!(back.write_mask, wgpu::ColorWrites::COLOR);
        assert_eq!(back.blend, state.blend);
    }
}
