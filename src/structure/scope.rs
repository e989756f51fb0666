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

//! Hierarchical scopes: context, domain, package and folder
//!
//! Validation runs top-down. Each scope invalidates itself, checks that its
//! live counterpart still exists, synchronizes its children against the live
//! model and validates them, stopping at the first failure. The failing
//! status collects one context frame per scope it passes through.

use super::arena::Handle;
use super::cache::{CacheKey, StructureCache};
use super::feature::{FeatureSource, FeatureStructure};
use super::node::{Lifecycle, StructureKind, StructureNode};
use super::sync::{SyncReport, synchronize};
use crate::context::{Context, ContextId};
use crate::error::{RegistryError, Result};
use crate::model::{LiveDomain, LivePackage};
use crate::status::Status;
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use log::{debug, warn};
use std::sync::Arc;

/// How [`ContextStructure::adapt`] hands a structure to another context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptMode {
    /// Deep copy; the caller attaches the copy
    Copy,
    /// Detach from the source cache and attach to the target
    Move,
}

fn sync_failure(scope: &str, err: RegistryError) -> Status {
    Status::failure_with("synchronization failed", err).with_context(scope)
}

fn log_sync<V>(kind: StructureKind, name: &str, report: &SyncReport<V>) {
    if report.changed() {
        debug!(
            "{kind} {name} synchronized: {} added, {} removed, {} retained",
            report.added.len(),
            report.removed.len(),
            report.retained
        );
    }
}

/// Scan unit of a package holding feature structures by class name
#[derive(Debug)]
pub struct FolderStructure {
    lifecycle: Lifecycle,
    domain_id: String,
    ns_uri: String,
    name: String,
    context: Arc<Context>,
    cache: Arc<StructureCache>,
    features: ArcSwap<IndexMap<String, Handle<FeatureStructure>>>,
}

impl FolderStructure {
    /// Create an empty folder scope
    pub fn new(
        context: Arc<Context>,
        cache: Arc<StructureCache>,
        domain_id: impl Into<String>,
        ns_uri: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(StructureKind::Folder),
            domain_id: domain_id.into(),
            ns_uri: ns_uri.into(),
            name: name.into(),
            context,
            cache,
            features: ArcSwap::from_pointee(IndexMap::new()),
        }
    }

    /// Namespace URI of the owning package
    pub fn namespace(&self) -> &str {
        &self.ns_uri
    }

    /// Handles of the cached features, by class name
    pub fn children(&self) -> Result<Arc<IndexMap<String, Handle<FeatureStructure>>>> {
        self.verify(false)?;
        Ok(self.features.load_full())
    }

    /// Point the entry of a class at `to`, or drop it, if it still holds
    /// `from`
    pub(crate) fn rebind(
        &self,
        class_name: &str,
        from: Handle<FeatureStructure>,
        to: Option<Handle<FeatureStructure>>,
    ) {
        self.features.rcu(|current| {
            let mut next = (**current).clone();
            if next.get(class_name) == Some(&from) {
                match to {
                    Some(handle) => {
                        next.insert(class_name.to_string(), handle);
                    }
                    None => {
                        next.shift_remove(class_name);
                    }
                }
            }
            next
        });
    }

    /// Feature structure of a class
    pub fn get(&self, class_name: &str) -> Result<Option<Arc<FeatureStructure>>> {
        self.verify(false)?;
        match self.features.load().get(class_name) {
            Some(handle) => self.cache.resolve(*handle).map(Some),
            None => Ok(None),
        }
    }

    /// Every feature structure
    pub fn features(&self) -> Result<Vec<Arc<FeatureStructure>>> {
        self.verify(false)?;
        self.features
            .load()
            .values()
            .map(|handle| self.cache.resolve(*handle))
            .collect()
    }

    /// Validate against the live model
    pub fn validate(&self) -> Status {
        match self.context.model().package(&self.domain_id, &self.ns_uri) {
            Some(package) => self.validate_with(&package),
            None => {
                self.lifecycle.invalidate();
                Status::failure(format!("package {} not found", self.ns_uri)).with_context(&self.name)
            }
        }
    }

    pub(crate) fn validate_with(&self, package: &LivePackage) -> Status {
        if let Err(err) = self.verify(false) {
            return Status::failure_with("folder is disposed", err).with_context(&self.name);
        }
        self.lifecycle.invalidate();
        let Some(classes) = package.folder_classes(&self.name) else {
            return Status::failure(format!("folder {} not found", self.name))
                .with_context(&self.name);
        };
        // Classes without geometry are not features
        let classes: IndexMap<String, _> = classes
            .into_iter()
            .filter(|c| c.geometry_attributes().next().is_some())
            .map(|c| (c.name.clone(), c))
            .collect();
        let keys: Vec<String> = classes.keys().cloned().collect();

        let report = synchronize(
            &self.features,
            &keys,
            |_, handle| {
                self.cache
                    .resolve(*handle)
                    .is_ok_and(|feature| !feature.is_disposed())
            },
            |name| {
                let class = classes.get(name).cloned().ok_or_else(|| {
                    RegistryError::state(format!("class {name} vanished during synchronization"))
                })?;
                let feature = FeatureStructure::create(
                    &self.context,
                    &self.cache,
                    FeatureSource::root(&self.ns_uri, &self.name, class),
                )?;
                self.cache.handle(&feature.cache_key()).ok_or_else(|| {
                    RegistryError::state(format!("feature {name} is not cached"))
                })
            },
        );
        let report = match report {
            Ok(report) => report,
            Err(err) => return sync_failure(&self.name, err),
        };
        log_sync(StructureKind::Folder, &self.name, &report);
        for (_, handle) in report.removed {
            if let Ok(feature) = self.cache.resolve(handle) {
                self.cache.detach(&feature);
                feature.dispose();
            }
        }

        for handle in self.features.load().values() {
            let feature = match self.cache.resolve(*handle) {
                Ok(feature) => feature,
                Err(err) => return sync_failure(&self.name, err),
            };
            let status = feature.validate(self.context.id_factory(), package, None);
            if status.is_failure() {
                return status.with_context(&self.name);
            }
        }
        self.lifecycle.mark_valid();
        Status::success(format!("folder {} is valid", self.name))
    }
}

impl StructureNode for FolderStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_content(&self) -> bool {
        !self.features.load().is_empty()
    }

    fn invalidate(&self, deep: bool) {
        self.lifecycle.invalidate();
        if deep {
            for handle in self.features.load().values() {
                if let Ok(feature) = self.cache.resolve(*handle) {
                    feature.invalidate(true);
                }
            }
        }
    }

    fn dispose(&self) {
        if !self.lifecycle.dispose() {
            return;
        }
        let features = self.features.swap(Arc::new(IndexMap::new()));
        for handle in features.values() {
            if let Ok(feature) = self.cache.resolve(*handle) {
                self.cache.detach(&feature);
                feature.dispose();
            }
        }
    }
}

/// Namespace scope holding folders
#[derive(Debug)]
pub struct PackageStructure {
    lifecycle: Lifecycle,
    domain_id: String,
    ns_uri: String,
    context: Arc<Context>,
    cache: Arc<StructureCache>,
    folders: ArcSwap<IndexMap<String, Arc<FolderStructure>>>,
}

impl PackageStructure {
    /// Create an empty package scope
    pub fn new(
        context: Arc<Context>,
        cache: Arc<StructureCache>,
        domain_id: impl Into<String>,
        ns_uri: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(StructureKind::Package),
            domain_id: domain_id.into(),
            ns_uri: ns_uri.into(),
            context,
            cache,
            folders: ArcSwap::from_pointee(IndexMap::new()),
        }
    }

    /// Folders by name
    pub fn children(&self) -> Result<Arc<IndexMap<String, Arc<FolderStructure>>>> {
        self.verify(false)?;
        Ok(self.folders.load_full())
    }

    /// Folder by name
    pub fn get(&self, name: &str) -> Result<Option<Arc<FolderStructure>>> {
        self.verify(false)?;
        Ok(self.folders.load().get(name).cloned())
    }

    /// Validate against the live model
    pub fn validate(&self) -> Status {
        match self.context.model().package(&self.domain_id, &self.ns_uri) {
            Some(package) => self.validate_with(&package),
            None => {
                self.lifecycle.invalidate();
                Status::failure(format!("package {} not found", self.ns_uri))
                    .with_context(&self.ns_uri)
            }
        }
    }

    pub(crate) fn validate_with(&self, package: &LivePackage) -> Status {
        if let Err(err) = self.verify(false) {
            return Status::failure_with("package is disposed", err).with_context(&self.ns_uri);
        }
        self.lifecycle.invalidate();
        let report = synchronize(
            &self.folders,
            &package.folder_names(),
            |_, folder| !folder.is_disposed(),
            |name| {
                Ok(Arc::new(FolderStructure::new(
                    self.context.clone(),
                    self.cache.clone(),
                    &self.domain_id,
                    &self.ns_uri,
                    name,
                )))
            },
        );
        let report = match report {
            Ok(report) => report,
            Err(err) => return sync_failure(&self.ns_uri, err),
        };
        log_sync(StructureKind::Package, &self.ns_uri, &report);
        for (_, folder) in report.removed {
            folder.dispose();
        }

        for folder in self.folders.load().values() {
            let status = folder.validate_with(package);
            if status.is_failure() {
                return status.with_context(&self.ns_uri);
            }
        }
        self.lifecycle.mark_valid();
        Status::success(format!("package {} is valid", self.ns_uri))
    }
}

impl StructureNode for PackageStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        &self.ns_uri
    }

    fn has_content(&self) -> bool {
        !self.folders.load().is_empty()
    }

    fn invalidate(&self, deep: bool) {
        self.lifecycle.invalidate();
        if deep {
            for folder in self.folders.load().values() {
                folder.invalidate(true);
            }
        }
    }

    fn dispose(&self) {
        if self.lifecycle.dispose() {
            for folder in self.folders.swap(Arc::new(IndexMap::new())).values() {
                folder.dispose();
            }
        }
    }
}

/// Resource scope holding packages by namespace URI
#[derive(Debug)]
pub struct DomainStructure {
    lifecycle: Lifecycle,
    id: String,
    context: Arc<Context>,
    cache: Arc<StructureCache>,
    packages: ArcSwap<IndexMap<String, Arc<PackageStructure>>>,
}

impl DomainStructure {
    /// Create an empty domain scope
    pub fn new(context: Arc<Context>, cache: Arc<StructureCache>, id: impl Into<String>) -> Self {
        Self {
            lifecycle: Lifecycle::new(StructureKind::Domain),
            id: id.into(),
            context,
            cache,
            packages: ArcSwap::from_pointee(IndexMap::new()),
        }
    }

    /// Packages by namespace URI
    pub fn children(&self) -> Result<Arc<IndexMap<String, Arc<PackageStructure>>>> {
        self.verify(false)?;
        Ok(self.packages.load_full())
    }

    /// Package by namespace URI
    pub fn get(&self, ns_uri: &str) -> Result<Option<Arc<PackageStructure>>> {
        self.verify(false)?;
        Ok(self.packages.load().get(ns_uri).cloned())
    }

    /// Validate against the live model
    pub fn validate(&self) -> Status {
        match self.context.model().domain(&self.id) {
            Some(domain) => self.validate_with(&domain),
            None => {
                self.lifecycle.invalidate();
                Status::failure(format!("domain {} not found", self.id)).with_context(&self.id)
            }
        }
    }

    fn validate_with(&self, domain: &LiveDomain) -> Status {
        if let Err(err) = self.verify(false) {
            return Status::failure_with("domain is disposed", err).with_context(&self.id);
        }
        self.lifecycle.invalidate();
        let keys: Vec<String> = domain.packages.keys().cloned().collect();
        let report = synchronize(
            &self.packages,
            &keys,
            |_, package| !package.is_disposed(),
            |ns_uri| {
                Ok(Arc::new(PackageStructure::new(
                    self.context.clone(),
                    self.cache.clone(),
                    &self.id,
                    ns_uri,
                )))
            },
        );
        let report = match report {
            Ok(report) => report,
            Err(err) => return sync_failure(&self.id, err),
        };
        log_sync(StructureKind::Domain, &self.id, &report);
        for (_, package) in report.removed {
            package.dispose();
        }

        for (ns_uri, package) in self.packages.load().iter() {
            let Some(live) = domain.package(ns_uri) else {
                return Status::failure(format!("package {ns_uri} vanished"))
                    .with_context(&self.id);
            };
            let status = package.validate_with(live);
            if status.is_failure() {
                return status.with_context(&self.id);
            }
        }
        self.lifecycle.mark_valid();
        Status::success(format!("domain {} is valid", self.id))
    }
}

impl StructureNode for DomainStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn has_content(&self) -> bool {
        !self.packages.load().is_empty()
    }

    fn invalidate(&self, deep: bool) {
        self.lifecycle.invalidate();
        if deep {
            for package in self.packages.load().values() {
                package.invalidate(true);
            }
        }
    }

    fn dispose(&self) {
        if self.lifecycle.dispose() {
            for package in self.packages.swap(Arc::new(IndexMap::new())).values() {
                package.dispose();
            }
        }
    }
}

/// Root scope describing one context.
///
/// Owns the context's structure cache; disposing it tears the cache down and
/// invalidates every handle held by the scopes below.
#[derive(Debug)]
pub struct ContextStructure {
    lifecycle: Lifecycle,
    context: Arc<Context>,
    cache: Arc<StructureCache>,
    domains: ArcSwap<IndexMap<String, Arc<DomainStructure>>>,
}

impl ContextStructure {
    /// Create an empty structure for a context
    pub fn new(context: Arc<Context>) -> Self {
        let cache = Arc::new(StructureCache::new(context.id().clone()));
        Self {
            lifecycle: Lifecycle::new(StructureKind::Context),
            context,
            cache,
            domains: ArcSwap::from_pointee(IndexMap::new()),
        }
    }

    /// Described context
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Context ID
    pub fn id(&self) -> &ContextId {
        self.context.id()
    }

    /// Structure cache of this context
    pub fn cache(&self) -> &Arc<StructureCache> {
        &self.cache
    }

    /// Domains by ID
    pub fn children(&self) -> Result<Arc<IndexMap<String, Arc<DomainStructure>>>> {
        self.verify(false)?;
        Ok(self.domains.load_full())
    }

    /// Domain by ID
    pub fn get(&self, id: &str) -> Result<Option<Arc<DomainStructure>>> {
        self.verify(false)?;
        Ok(self.domains.load().get(id).cloned())
    }

    /// Synchronize with the live domains and validate everything below
    pub fn validate(&self) -> Status {
        let name = self.context.id().to_string();
        if let Err(err) = self.verify(false) {
            return Status::failure_with("context is disposed", err).with_context(name);
        }
        self.lifecycle.invalidate();
        if self.cache.owner() != self.context.id() {
            return Status::failure("structure cache belongs to another context").with_context(name);
        }

        let report = synchronize(
            &self.domains,
            &self.context.model().domain_ids(),
            |_, domain| !domain.is_disposed(),
            |id| {
                Ok(Arc::new(DomainStructure::new(
                    self.context.clone(),
                    self.cache.clone(),
                    id,
                )))
            },
        );
        let report = match report {
            Ok(report) => report,
            Err(err) => return sync_failure(&name, err),
        };
        log_sync(StructureKind::Context, &name, &report);
        for (_, domain) in report.removed {
            domain.dispose();
        }

        for domain in self.domains.load().values() {
            let status = domain.validate();
            if status.is_failure() {
                return status.with_context(name);
            }
        }
        self.lifecycle.mark_valid();
        Status::success(format!("context {name} is valid"))
    }

    /// Cached root feature by namespace, folder and class
    pub fn feature(
        &self,
        ns_uri: &str,
        folder: &str,
        class_name: &str,
    ) -> Result<Option<Arc<FeatureStructure>>> {
        self.verify(false)?;
        Ok(self.cache.get(&CacheKey::new(ns_uri, folder, class_name)))
    }

    /// Every feature reachable through the scope tree
    pub fn features(&self) -> Result<Vec<Arc<FeatureStructure>>> {
        self.verify(false)?;
        let mut features = Vec::new();
        for domain in self.domains.load().values() {
            for package in domain.children()?.values() {
                for folder in package.children()?.values() {
                    features.extend(folder.features()?);
                }
            }
        }
        Ok(features)
    }

    /// Root folders scanning the namespace and folder of a key
    fn folders_of(&self, key: &CacheKey) -> Vec<Arc<FolderStructure>> {
        self.domains
            .load()
            .values()
            .filter_map(|domain| domain.packages.load().get(&key.ns_uri).cloned())
            .filter_map(|package| package.folders.load().get(&key.path).cloned())
            .collect()
    }

    fn rebind(
        &self,
        key: &CacheKey,
        from: Option<Handle<FeatureStructure>>,
        to: Option<Handle<FeatureStructure>>,
    ) {
        let Some(from) = from else {
            return;
        };
        for folder in self.folders_of(key) {
            folder.rebind(&key.class_name, from, to);
        }
    }

    /// Build or reuse a feature structure outside the folder scan, e.g. for
    /// nested features
    pub fn create_feature(&self, source: FeatureSource) -> Result<Arc<FeatureStructure>> {
        self.verify(false)?;
        FeatureStructure::create(&self.context, &self.cache, source)
    }

    /// Register a structure's ID attribute and cache it
    pub fn attach(&self, structure: &Arc<FeatureStructure>) -> Status {
        if let Err(err) = self.verify(false) {
            return Status::failure_with("context is disposed", err);
        }
        self.context
            .id_factory()
            .add(structure.class_name(), structure.id_attribute_name());
        self.cache.attach(structure)
    }

    /// Hand a structure of this context to `target`.
    ///
    /// A copy is returned unattached. A move detaches the structure from this
    /// cache and its folder, and returns the target's cached instance with
    /// the same checksum if there is one, otherwise the moved structure after
    /// attaching it. A refused attach puts the structure back where it was.
    pub fn adapt(
        &self,
        structure: &Arc<FeatureStructure>,
        mode: AdaptMode,
        target: &ContextStructure,
    ) -> Result<Arc<FeatureStructure>> {
        self.verify(false)?;
        target.verify(false)?;
        match mode {
            AdaptMode::Copy => structure.copy_into(target.id().clone()),
            AdaptMode::Move => {
                let key = structure.cache_key();
                let handle = self.cache.handle(&key);
                let status = self.cache.detach(structure);
                if status.is_failure() {
                    return Err(RegistryError::configuration(format!(
                        "cannot move {}: {status}",
                        structure.class_name()
                    )));
                }
                structure.set_context(target.id().clone());

                if let Some(existing) = structure.uid().and_then(|uid| target.cache.find_by_uid(uid)) {
                    self.rebind(&key, handle, None);
                    debug!(
                        "moved feature {} resolved to an existing instance in {}",
                        structure.class_name(),
                        target.id()
                    );
                    return Ok(existing);
                }
                let status = target.attach(structure);
                if status.is_failure() {
                    structure.set_context(self.id().clone());
                    let restored = self.cache.attach(structure);
                    if restored.is_failure() {
                        warn!(
                            "feature {key} could not be restored after a refused move: {restored}"
                        );
                    }
                    self.rebind(&key, handle, self.cache.handle(&key));
                    return Err(RegistryError::configuration(format!(
                        "cannot attach {} to {}: {status}",
                        structure.class_name(),
                        target.id()
                    )));
                }
                self.rebind(&key, handle, None);
                Ok(target
                    .cache
                    .get(&key)
                    .unwrap_or_else(|| structure.clone()))
            }
        }
    }
}

impl StructureNode for ContextStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        self.context.id().as_str()
    }

    fn has_content(&self) -> bool {
        !self.domains.load().is_empty()
    }

    fn invalidate(&self, deep: bool) {
        self.lifecycle.invalidate();
        if deep {
            for domain in self.domains.load().values() {
                domain.invalidate(true);
            }
        }
    }

    fn dispose(&self) {
        if !self.lifecycle.dispose() {
            return;
        }
        for domain in self.domains.swap(Arc::new(IndexMap::new())).values() {
            domain.dispose();
        }
        let released = self.cache.teardown();
        debug!("context {} disposed, {released} structures released", self.context.id());
    }
}
