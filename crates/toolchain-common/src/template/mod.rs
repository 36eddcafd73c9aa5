//! Parameterized object templates
//!
//! A template is a YAML document with a `parameters` list (name, optional
//! default value, optional `required` flag) and an `objects` list. Processing
//! merges caller-supplied variables over the declared defaults, substitutes
//! every `${NAME}` placeholder and returns the rendered objects as JSON.

mod engine;
mod error;

use std::collections::BTreeMap;

use serde::Deserialize;

pub use engine::TemplateEngine;
pub use error::TemplateError;

/// A parameter declared by a template
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Parameter {
    /// Placeholder name, referenced as `${NAME}`
    pub name: String,
    /// Default value used when the caller supplies none
    #[serde(default)]
    pub value: Option<String>,
    /// Processing fails when a required parameter ends up without a value
    #[serde(default)]
    pub required: bool,
}

#[derive(Deserialize)]
struct TemplateHeader {
    #[serde(default)]
    parameters: Vec<Parameter>,
}

#[derive(Deserialize)]
struct RenderedTemplate {
    #[serde(default)]
    objects: Vec<serde_json::Value>,
}

/// A parsed template ready to be processed with variables
pub struct Template {
    source: String,
    parameters: Vec<Parameter>,
    engine: TemplateEngine,
}

impl Template {
    /// Parse a template from YAML source
    pub fn parse(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let header: TemplateHeader = serde_yaml::from_str(&source)?;
        Ok(Self {
            source,
            parameters: header.parameters,
            engine: TemplateEngine::new()?,
        })
    }

    /// Declared parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Render the template objects with `vars` layered over parameter defaults
    ///
    /// Variables not declared as parameters are ignored by the parameter
    /// check but still available to placeholders.
    pub fn process(
        &self,
        vars: &BTreeMap<String, String>,
    ) -> Result<Vec<serde_json::Value>, TemplateError> {
        let mut resolved = BTreeMap::new();
        for param in &self.parameters {
            let value = vars
                .get(&param.name)
                .cloned()
                .or_else(|| param.value.clone());
            match value {
                Some(v) => {
                    resolved.insert(param.name.clone(), v);
                }
                None if param.required => {
                    return Err(TemplateError::MissingParameter(param.name.clone()))
                }
                None => {
                    resolved.insert(param.name.clone(), String::new());
                }
            }
        }
        for (key, value) in vars {
            resolved.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let rendered = self.engine.render(&self.source, &resolved)?;
        let rendered: RenderedTemplate = serde_yaml::from_str(&rendered)?;
        Ok(rendered.objects)
    }
}
