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

//! Model provider trait and the in-memory provider

use super::schema::{LiveClass, LiveDomain, LivePackage};
use crate::error::{RegistryError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;

/// Source of the live schema a context describes.
///
/// Implementations return snapshots: the registry reads them without holding
/// any lock of its own, and may call them redundantly from several threads.
pub trait ModelProvider: Send + Sync + Debug {
    /// IDs of the live domains
    fn domain_ids(&self) -> Vec<String>;

    /// Snapshot of one domain
    fn domain(&self, id: &str) -> Option<Arc<LiveDomain>>;

    /// Snapshot of one package
    fn package(&self, domain: &str, ns_uri: &str) -> Option<Arc<LivePackage>> {
        self.domain(domain)?.package(ns_uri).cloned()
    }
}

/// In-memory model provider.
///
/// Mutations replace the affected domain, package and class values instead of
/// editing them in place, so snapshots handed out earlier stay unchanged and
/// weak links to replaced members stop resolving.
#[derive(Debug, Default)]
pub struct MemoryModel {
    domains: RwLock<IndexMap<String, Arc<LiveDomain>>>,
}

impl MemoryModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a domain
    pub fn insert_domain(&self, domain: LiveDomain) {
        self.domains
            .write()
            .insert(domain.id.clone(), Arc::new(domain));
    }

    /// Remove a domain
    pub fn remove_domain(&self, id: &str) -> Option<Arc<LiveDomain>> {
        self.domains.write().shift_remove(id)
    }

    /// Add or replace a package in an existing domain
    pub fn insert_package(&self, domain: &str, package: LivePackage) -> Result<()> {
        self.update_domain(domain, |d| {
            d.packages
                .insert(package.ns_uri.clone(), Arc::new(package));
            Ok(())
        })
    }

    /// Remove a package from a domain
    pub fn remove_package(&self, domain: &str, ns_uri: &str) -> Result<Option<Arc<LivePackage>>> {
        let mut removed = None;
        self.update_domain(domain, |d| {
            removed = d.packages.shift_remove(ns_uri);
            Ok(())
        })?;
        Ok(removed)
    }

    /// Add or replace a class in an existing package
    pub fn insert_class(&self, domain: &str, ns_uri: &str, class: LiveClass) -> Result<()> {
        self.update_package(domain, ns_uri, |p| {
            p.classes.insert(class.name.clone(), Arc::new(class));
        })
    }

    /// Remove a class from a package
    pub fn remove_class(&self, domain: &str, ns_uri: &str, name: &str) -> Result<()> {
        self.update_package(domain, ns_uri, |p| {
            p.classes.shift_remove(name);
        })
    }

    fn update_package(
        &self,
        domain: &str,
        ns_uri: &str,
        f: impl FnOnce(&mut LivePackage),
    ) -> Result<()> {
        self.update_domain(domain, |d| {
            let current = d.packages.get(ns_uri).ok_or_else(|| {
                RegistryError::model(format!("package {ns_uri} not found in domain {}", d.id))
            })?;
            let mut package = LivePackage::clone(current);
            f(&mut package);
            d.packages.insert(ns_uri.to_string(), Arc::new(package));
            Ok(())
        })
    }

    fn update_domain(
        &self,
        id: &str,
        f: impl FnOnce(&mut LiveDomain) -> Result<()>,
    ) -> Result<()> {
        let mut domains = self.domains.write();
        let current = domains
            .get(id)
            .ok_or_else(|| RegistryError::model(format!("domain {id} not found")))?;
        let mut domain = LiveDomain::clone(current);
        f(&mut domain)?;
        domains.insert(id.to_string(), Arc::new(domain));
        Ok(())
    }
}

impl ModelProvider for MemoryModel {
    fn domain_ids(&self) -> Vec<String> {
        self.domains.read().keys().cloned().collect()
    }

    fn domain(&self, id: &str) -> Option<Arc<LiveDomain>> {
        self.domains.read().get(id).cloned()
    }
}
