//! Resource-side inputs of the pipeline-state cache
//!
//! - [`shader_properties`]: sorted integer property sets
//! - [`blueprint`]: shader / material blueprint collaborators
//! - [`template`]: template-driven shader blueprint

pub mod blueprint;
pub mod shader_properties;
pub mod template;

pub use blueprint::{
    BasicMaterialBlueprint, LoadingState, MaterialBlueprint, PropertyMetadata, ShaderBlueprint,
    ShaderLanguage, ShaderStage,
};
pub use shader_properties::{ShaderProperties, ShaderProperty, ShaderPropertyId};
pub use template::TemplateShaderBlueprint;
