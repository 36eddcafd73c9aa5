//! Template engine with `${...}` parameter syntax
//!
//! Placeholders are minijinja expressions between `${` and `}`, so filters
//! such as `tojson` work inside them. `$${` renders as a literal `${`.

use std::collections::BTreeMap;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior};

use super::error::TemplateError;

/// Stand-in for `$${` while the template is rendered
const ESCAPED_PLACEHOLDER: &str = "\x00__TOOLCHAIN_ESCAPED_DOLLAR_BRACE__\x00";

/// Template engine resolving `${NAME}` placeholders from a flat variable map
///
/// Undefined variables are an error, never an empty string.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine with `${...}` variable delimiters
    pub fn new() -> Result<Self, TemplateError> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters("${", "}")
            .block_delimiters("{%", "%}")
            .comment_delimiters("{#", "#}")
            .build()?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Ok(Self { env })
    }

    /// Render a template string with the given variables
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Render` on invalid syntax or an undefined variable.
    pub fn render(
        &self,
        template: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        let preprocessed = template.replace("$${", ESCAPED_PLACEHOLDER);
        let rendered = self.env.render_str(&preprocessed, vars)?;
        Ok(rendered.replace(ESCAPED_PLACEHOLDER, "${"))
    }
}
