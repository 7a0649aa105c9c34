use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ParseError;
use crate::{compile_with, Template};

/// Compiled templates keyed by their text.
///
/// Each distinct text is compiled at most once; later lookups share the
/// same [`Template`].
#[derive(Debug, Default)]
pub struct TemplateCache {
    config: Config,
    templates: HashMap<String, Arc<Template>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            templates: HashMap::new(),
        }
    }

    pub fn get_or_compile(&mut self, source: &str) -> Result<Arc<Template>, ParseError> {
        if let Some(template) = self.templates.get(source) {
            log::trace!("template cache hit ({} bytes)", source.len());
            return Ok(Arc::clone(template));
        }
        log::debug!("template cache miss ({} bytes)", source.len());
        let template = Arc::new(compile_with(source, &self.config)?);
        self.templates.insert(source.to_string(), Arc::clone(&template));
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }
}
