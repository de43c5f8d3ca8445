//! Template Shader Blueprint
//!
//! A [`ShaderBlueprint`] whose source text is produced by the minijinja
//! template engine. Every referenced property is exposed to the template
//! under its human readable name, holding the live `i32` value (or the
//! registered default when the caller did not set it).
//!
//! Templates use the same delimiters as the engine's WGSL chunks:
//!
//! ```text
//! {$ if UseNormalMap $}
//!     let n = sample_normal(in.uv);
//! {$ endif $}
//! const LIGHT_COUNT: u32 = {{ NumberOfLights }}u;
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::{Environment, syntax::SyntaxConfig};
use rustc_hash::FxHashMap;

use crate::errors::{PsoError, Result};
use crate::resources::blueprint::{ShaderBlueprint, ShaderLanguage};
use crate::resources::shader_properties::{ShaderProperties, ShaderPropertyId};

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("Failed to configure Jinja2 syntax");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);

        env
    })
}

/// Shader blueprint backed by per-language minijinja templates.
#[derive(Debug, Clone)]
pub struct TemplateShaderBlueprint {
    id: u32,
    name: String,
    referenced: ShaderProperties,
    property_names: FxHashMap<ShaderPropertyId, String>,
    templates: FxHashMap<ShaderLanguage, String>,
}

impl TemplateShaderBlueprint {
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            referenced: ShaderProperties::new(),
            property_names: FxHashMap::default(),
            templates: FxHashMap::default(),
        }
    }

    /// Registers a property the template branches on, with the value used
    /// when a request does not set it.
    #[must_use]
    pub fn with_property(mut self, name: &str, default: i32) -> Self {
        let id = ShaderPropertyId::from_name(name);
        self.referenced.set_value(id, default);
        self.property_names.insert(id, name.to_owned());
        self
    }

    #[must_use]
    pub fn with_template(mut self, language: ShaderLanguage, source: impl Into<String>) -> Self {
        self.templates.insert(language, source.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template context: referenced property name -> live value.
    fn template_context(&self, properties: &ShaderProperties) -> BTreeMap<&str, i32> {
        self.referenced
            .iter()
            .filter_map(|referenced| {
                let name = self.property_names.get(&referenced.id)?;
                let value = properties.get_value_or(referenced.id, referenced.value);
                Some((name.as_str(), value))
            })
            .collect()
    }
}

impl ShaderBlueprint for TemplateShaderBlueprint {
    fn id(&self) -> u32 {
        self.id
    }

    fn referenced_properties(&self) -> &ShaderProperties {
        &self.referenced
    }

    fn build_source(
        &self,
        language: ShaderLanguage,
        properties: &ShaderProperties,
    ) -> Result<String> {
        let template = self
            .templates
            .get(&language)
            .ok_or_else(|| PsoError::ShaderBuildFailed {
                shader_blueprint: self.id,
                reason: format!("no {language:?} template for '{}'", self.name),
            })?;

        let source = get_env().render_str(template, self.template_context(properties))?;
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint() -> TemplateShaderBlueprint {
        TemplateShaderBlueprint::new(7, "lit")
            .with_property("UseFog", 0)
            .with_property("NumberOfLights", 4)
            .with_template(
                ShaderLanguage::Wgsl,
                concat!(
                    "{$ if UseFog $}\nfog();\n{$ endif $}\n",
                    "const LIGHTS: u32 = {{ NumberOfLights }}u;\n",
                ),
            )
    }

    #[test]
    fn test_defaults_are_substituted() {
        let source = blueprint()
            .build_source(ShaderLanguage::Wgsl, &ShaderProperties::new())
            .unwrap();
        assert!(!source.contains("fog();"));
        assert!(source.contains("const LIGHTS: u32 = 4u;"));
    }

    #[test]
    fn test_live_values_are_substituted() {
        let mut properties = ShaderProperties::new();
        properties.set_value(ShaderPropertyId::from_name("UseFog"), 1);
        properties.set_value(ShaderPropertyId::from_name("NumberOfLights"), 8);
        // Not referenced by the template; must not matter.
        properties.set_value(ShaderPropertyId::from_name("Unrelated"), 3);

        let source = blueprint()
            .build_source(ShaderLanguage::Wgsl, &properties)
            .unwrap();
        assert!(source.contains("fog();"));
        assert!(source.contains("const LIGHTS: u32 = 8u;"));
    }

    #[test]
    fn test_missing_language_is_a_build_failure() {
        let err = blueprint()
            .build_source(ShaderLanguage::Hlsl, &ShaderProperties::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PsoError::ShaderBuildFailed {
                shader_blueprint: 7,
                ..
            }
        ));
    }

    #[test]
    fn test_referenced_properties() {
        let bp = blueprint();
        let referenced = bp.referenced_properties();
        assert!(referenced.has_value(ShaderPropertyId::from_name("UseFog")));
        assert!(referenced.has_value(ShaderPropertyId::from_name("NumberOfLights")));
        assert!(!referenced.has_value(ShaderPropertyId::from_name("Unrelated")));
    }
}
