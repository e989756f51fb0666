// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contexts and the registry that owns them
//!
//! The registry is an ordinary value owned by the application. It creates
//! contexts, builds their structures on first use and tears both down on
//! disposal.

use crate::config::{RegistryConfig, StructureHints};
use crate::crs::{CachedCrsResolver, CrsResolver, StaticCrsResolver};
use crate::error::{RegistryError, Result};
use crate::id_factory::IdFactory;
use crate::model::ModelProvider;
use crate::structure::{ContextStructure, StructureNode};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Context identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(String);

impl ContextId {
    /// Create an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContextId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Top-level scope: an ID factory plus the live model it describes
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    ids: IdFactory,
    model: Arc<dyn ModelProvider>,
    hints: StructureHints,
    resolver: Arc<dyn CrsResolver>,
}

impl Context {
    /// Create a context
    pub fn new(
        id: ContextId,
        model: Arc<dyn ModelProvider>,
        config: &RegistryConfig,
        resolver: Arc<dyn CrsResolver>,
    ) -> Self {
        Self {
            id,
            ids: IdFactory::new(config.identity),
            model,
            hints: config.hints.clone(),
            resolver,
        }
    }

    /// Context ID
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// ID factory of this context
    pub fn id_factory(&self) -> &IdFactory {
        &self.ids
    }

    /// Live model provider
    pub fn model(&self) -> &Arc<dyn ModelProvider> {
        &self.model
    }

    /// Structure hints
    pub fn hints(&self) -> &StructureHints {
        &self.hints
    }

    /// CRS resolver shared by every structure of this context
    pub fn resolver(&self) -> &Arc<dyn CrsResolver> {
        &self.resolver
    }
}

#[derive(Debug)]
struct ContextEntry {
    context: Arc<Context>,
    structure: OnceCell<Arc<ContextStructure>>,
}

/// Owner of every context and its structure
#[derive(Debug)]
pub struct ContextRegistry {
    config: RegistryConfig,
    resolver: Arc<CachedCrsResolver>,
    contexts: DashMap<ContextId, Arc<ContextEntry>>,
}

impl ContextRegistry {
    /// Create a registry resolving CRS codes with [`StaticCrsResolver`]
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_resolver(config, Arc::new(StaticCrsResolver::new()))
    }

    /// Create a registry with a custom CRS resolver, cached per the config
    pub fn with_resolver(config: RegistryConfig, resolver: Arc<dyn CrsResolver>) -> Self {
        let resolver = Arc::new(CachedCrsResolver::new(resolver, config.crs_cache_capacity));
        Self {
            config,
            resolver,
            contexts: DashMap::new(),
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Cached CRS resolver shared by all contexts
    pub fn resolver(&self) -> &Arc<CachedCrsResolver> {
        &self.resolver
    }

    /// Create a context. Fails if the ID is taken.
    pub fn create_context(
        &self,
        id: impl Into<ContextId>,
        model: Arc<dyn ModelProvider>,
    ) -> Result<Arc<Context>> {
        let id = id.into();
        match self.contexts.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::configuration(format!(
                "context {id} already exists"
            ))),
            Entry::Vacant(vacant) => {
                let resolver: Arc<dyn CrsResolver> = self.resolver.clone();
                let context = Arc::new(Context::new(id.clone(), model, &self.config, resolver));
                vacant.insert(Arc::new(ContextEntry {
                    context: context.clone(),
                    structure: OnceCell::new(),
                }));
                debug!("created context {id}");
                Ok(context)
            }
        }
    }

    fn entry(&self, id: &ContextId) -> Option<Arc<ContextEntry>> {
        self.contexts.get(id).map(|e| e.value().clone())
    }

    /// Context by ID
    pub fn context(&self, id: &ContextId) -> Option<Arc<Context>> {
        self.entry(id).map(|e| e.context.clone())
    }

    /// Check if a context exists
    pub fn contains(&self, id: &ContextId) -> bool {
        self.contexts.contains_key(id)
    }

    /// IDs of all contexts
    pub fn context_ids(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|e| e.key().clone()).collect()
    }

    /// Structure of a context, built and validated on first use
    pub fn structure(&self, id: &ContextId) -> Result<Arc<ContextStructure>> {
        let entry = self
            .entry(id)
            .ok_or_else(|| RegistryError::configuration(format!("context {id} not found")))?;
        entry
            .structure
            .get_or_try_init(|| {
                let structure = Arc::new(ContextStructure::new(entry.context.clone()));
                let status = structure.validate();
                if status.is_failure() {
                    structure.dispose();
                    return Err(RegistryError::configuration(format!(
                        "context {id} is invalid: {status}"
                    )));
                }
                Ok(structure)
            })
            .cloned()
    }

    /// Dispose a context and its structure
    pub fn dispose_context(&self, id: &ContextId) -> bool {
        let Some((_, entry)) = self.contexts.remove(id) else {
            return false;
        };
        if let Some(structure) = entry.structure.get() {
            structure.dispose();
        }
        entry.context.id_factory().dispose();
        debug!("disposed context {id}");
        true
    }

    /// Dispose every context
    pub fn dispose(&self) {
        for id in self.context_ids() {
            self.dispose_context(&id);
        }
    }

    /// Number of contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Check if there are no contexts
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LiveClass, LiveDomain, LivePackage, MemoryModel};

    fn model() -> Arc<MemoryModel> {
        let model = MemoryModel::new();
        model.insert_domain(
            LiveDomain::new("main").with_package(
                LivePackage::new("urn:roads", "roads")
                    .with_class(LiveClass::builder("Road", 0).id("id").geometry("geom").build()),
            ),
        );
        Arc::new(model)
    }

    #[test]
    fn test_duplicate_context_is_configuration_error() {
        let registry = ContextRegistry::new(RegistryConfig::testing());
        registry.create_context("c1", model()).unwrap();
        let err = registry.create_context("c1", model()).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_structure_is_built_once() {
        let registry = ContextRegistry::new(RegistryConfig::testing());
        registry.create_context("c1", model()).unwrap();
        let id = ContextId::from("c1");
        let first = registry.structure(&id).unwrap();
        let second = registry.structure(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_available());
        assert!(registry.structure(&ContextId::from("missing")).is_err());
    }

    #[test]
    fn test_dispose_context() {
        let registry = ContextRegistry::new(RegistryConfig::testing());
        registry.create_context("c1", model()).unwrap();
        let id = ContextId::from("c1");
        let structure = registry.structure(&id).unwrap();
        let road = structure.feature("urn:roads", "roads", "Road").unwrap().unwrap();

        assert!(registry.dispose_context(&id));
        assert!(!registry.dispose_context(&id));
        assert!(structure.is_disposed());
        assert!(road.is_disposed());
        assert!(registry.context(&id).is_none());
    }

    #[test]
    fn test_dispose_all() {
        let registry = ContextRegistry::default();
        registry.create_context("c1", model()).unwrap();
        registry.create_context("c2", model()).unwrap();
        registry.dispose();
        assert!(registry.is_empty());
    }
}
