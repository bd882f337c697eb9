//! Templating collaborator
//!
//! Rendering is a pure function of (directory, template name, context);
//! template syntax is not this crate's concern.

use std::path::Path;

use tera::Tera;

use crate::context::DeploymentContext;
use crate::errors::DeployerError;

/// Renders a stack configuration file from a template and the context
pub trait TemplateEngine: Send + Sync {
    fn render(
        &self,
        dir: &Path,
        name: &str,
        context: &DeploymentContext,
    ) -> Result<String, DeployerError>;
}

/// Tera-backed engine, one-shot per template
#[derive(Debug, Clone, Default)]
pub struct TeraEngine;

impl TeraEngine {
    pub fn new() -> Self {
        Self
    }

    fn tera_context(context: &DeploymentContext) -> tera::Context {
        let mut ctx = tera::Context::new();
        ctx.insert("STACK", &context.stack);
        ctx.insert("FQDN", &context.fqdn);
        ctx.insert("HTTPSMODE", &context.https_mode);
        for (key, value) in &context.vars {
            ctx.insert(key, value);
        }
        ctx
    }
}

impl TemplateEngine for TeraEngine {
    fn render(
        &self,
        dir: &Path,
        name: &str,
        context: &DeploymentContext,
    ) -> Result<String, DeployerError> {
        let path = dir.join(name);
        let source = std::fs::read_to_string(&path).map_err(|e| {
            DeployerError::TemplateError(format!("cannot read template {}: {}", path.display(), e))
        })?;

        let mut tera = Tera::default();
        tera.add_raw_template(name, &source)?;
        let rendered = tera.render(name, &Self::tera_context(context))?;
        Ok(rendered)
    }
}
