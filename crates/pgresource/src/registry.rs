//! The allow-list of mounted resources.
//!
//! A table reaches SQL construction only through a [`ResourceBinding`]
//! registered here at startup; request paths select a binding by name and
//! never name a table directly.

use crate::engine::{EngineConfig, ResourceEngine};
use crate::error::{ResourceError, ResourceResult};
use crate::ident::Ident;
use crate::schema::SchemaCache;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One exposed resource and the table it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    /// Resource name as it appears in request paths.
    pub name: String,
    pub table: Ident,
    pub primary_key: String,
    /// Candidate columns for `search=` (may be empty).
    pub search_columns: Vec<String>,
}

impl ResourceBinding {
    /// Bind resource `name` to `table` with primary key `id` and no search columns.
    pub fn new(name: impl Into<String>, table: &str) -> ResourceResult<Self> {
        let name = name.into();
        validate_resource_name(&name)?;
        Ok(Self {
            name,
            table: Ident::parse(table)?,
            primary_key: "id".to_string(),
            search_columns: Vec::new(),
        })
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn with_search_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.search_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Resource names are path segments: ASCII letters, digits, `_` and `-`.
pub fn validate_resource_name(name: &str) -> ResourceResult<()> {
    if name.is_empty() {
        return Err(ResourceError::validation("resource name cannot be empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ResourceError::validation(format!(
            "invalid character '{c}' in resource name '{name}'"
        )));
    }
    Ok(())
}

/// All mounted engines, keyed by resource name.
#[derive(Debug)]
pub struct ResourceRegistry {
    config: EngineConfig,
    schema: Arc<SchemaCache>,
    engines: BTreeMap<String, Arc<ResourceEngine>>,
}

impl ResourceRegistry {
    /// Engines mounted on this registry share `config` and the schema cache.
    pub fn new(config: EngineConfig, schema: Arc<SchemaCache>) -> Self {
        Self {
            config,
            schema,
            engines: BTreeMap::new(),
        }
    }

    /// Mount a binding. Resource names must be unique.
    pub fn mount(&mut self, binding: ResourceBinding) -> ResourceResult<Arc<ResourceEngine>> {
        if self.engines.contains_key(&binding.name) {
            return Err(ResourceError::validation(format!(
                "resource '{}' is already mounted",
                binding.name
            )));
        }
        let name = binding.name.clone();
        let engine = Arc::new(ResourceEngine::new(
            binding,
            self.config.clone(),
            self.schema.clone(),
        ));
        self.engines.insert(name, engine.clone());
        Ok(engine)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceEngine>> {
        self.engines.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn engines(&self) -> impl Iterator<Item = &Arc<ResourceEngine>> {
        self.engines.values()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_defaults() {
        let b = ResourceBinding::new("prompts", "public.prompts").unwrap();
        assert_eq!(b.primary_key, "id");
        assert_eq!(b.table.to_sql(), "public.prompts");
        assert!(b.search_columns.is_empty());

        let b = b.with_primary_key("prompt_id").with_search_columns(["title", "body"]);
        assert_eq!(b.primary_key, "prompt_id");
        assert_eq!(b.search_columns, ["title", "body"]);
    }

    #[test]
    fn resource_names_are_path_safe() {
        assert!(validate_resource_name("gallery-items_2").is_ok());
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("a/b").is_err());
        assert!(validate_resource_name("a b").is_err());
    }

    #[test]
    fn rejects_bad_tables_and_duplicates() {
        assert!(ResourceBinding::new("x", "items; drop table x").is_err());

        let mut registry = ResourceRegistry::new(EngineConfig::default(), Arc::default());
        registry.mount(ResourceBinding::new("items", "items").unwrap()).unwrap();
        let dup = registry.mount(ResourceBinding::new("items", "other").unwrap());
        assert!(dup.unwrap_err().is_validation());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["items"]);
        assert!(registry.get("other").is_none());
    }
}
