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

//! Feature structures
//!
//! A feature structure describes one live class as a record type. Its shape
//! (class, nesting, ID attribute, attribute and geometry names) is fixed at
//! construction. Its metadata (SRID, reference system, default geometry) can
//! change, but never affects the checksum computed by
//! [`FeatureStructure::validate`].

use super::attribute::{AttributeStructure, GeometryStructure};
use super::cache::{CacheKey, StructureCache};
use super::feature_type::{AttributeDescriptor, FeatureRecord, FeatureType, RecordHints};
use super::node::{ChangeEvent, ChangeProperty, Lifecycle, NodeState, StructureKind, StructureNode};
use crate::context::{Context, ContextId};
use crate::crs::{CoordinateReferenceSystem, CrsResolver};
use crate::error::{RegistryError, Result};
use crate::id_factory::IdFactory;
use crate::model::{LiveClass, LiveObject, LivePackage, ValueType};
use crate::status::Status;
use indexmap::IndexMap;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Relation through which a nested feature is reached
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureReference {
    /// Containment relation name
    pub relation: String,
    /// Name of the class declaring the relation
    pub container: String,
}

/// Where a feature structure is built from
#[derive(Debug, Clone)]
pub struct FeatureSource {
    /// Namespace URI of the package
    pub ns_uri: String,
    /// Folder scanning the class
    pub folder: String,
    /// Live class
    pub class: Arc<LiveClass>,
    /// Relation for nested features, `None` for roots
    pub reference: Option<FeatureReference>,
}

impl FeatureSource {
    /// Root feature of a class
    pub fn root(ns_uri: impl Into<String>, folder: impl Into<String>, class: Arc<LiveClass>) -> Self {
        Self {
            ns_uri: ns_uri.into(),
            folder: folder.into(),
            class,
            reference: None,
        }
    }

    /// Feature nested in `container` through `relation`
    pub fn nested(
        ns_uri: impl Into<String>,
        folder: impl Into<String>,
        class: Arc<LiveClass>,
        relation: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            ns_uri: ns_uri.into(),
            folder: folder.into(),
            class,
            reference: Some(FeatureReference {
                relation: relation.into(),
                container: container.into(),
            }),
        }
    }

    /// Feature of a live object's class, nested if the object has a container
    pub fn for_object(ns_uri: impl Into<String>, folder: impl Into<String>, object: &LiveObject) -> Self {
        Self {
            ns_uri: ns_uri.into(),
            folder: folder.into(),
            class: object.class().clone(),
            reference: object.container().map(|c| FeatureReference {
                relation: c.relation,
                container: c.class.name.clone(),
            }),
        }
    }

    /// Cache key of the structure built from this source
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            &self.ns_uri,
            feature_path(&self.folder, self.reference.as_ref()),
            &self.class.name,
        )
    }
}

fn feature_path(folder: &str, reference: Option<&FeatureReference>) -> String {
    match reference {
        Some(r) => format!("{folder}/{}", r.relation),
        None => folder.to_string(),
    }
}

/// Order-independent 32-bit checksum over `(namespace, class, member)`
/// identity triples
pub fn shape_checksum(triples: &mut [(String, u32, u32)]) -> u32 {
    triples.sort();
    let encoded = triples
        .iter()
        .map(|(ns, class, member)| format!("{ns}/{class}/{member}"))
        .collect::<Vec<_>>()
        .join(";");
    crc32fast::hash(encoded.as_bytes())
}

#[derive(Debug, Clone)]
struct Metadata {
    srid: String,
    crs: Option<Arc<CoordinateReferenceSystem>>,
    default_geometry: Option<String>,
}

/// Structural description of one record type
#[derive(Debug)]
pub struct FeatureStructure {
    lifecycle: Lifecycle,
    ns_uri: String,
    folder: String,
    class_name: String,
    reference: Option<FeatureReference>,
    id_attribute: String,
    srid_attribute: Option<String>,
    order: Vec<String>,
    resolver: Arc<dyn CrsResolver>,
    context: RwLock<ContextId>,
    uid: RwLock<Option<u32>>,
    metadata: RwLock<Metadata>,
    attributes: RwLock<IndexMap<String, Arc<AttributeStructure>>>,
    geometries: RwLock<IndexMap<String, Arc<GeometryStructure>>>,
    record_hints: Mutex<RecordHints>,
}

impl FeatureStructure {
    /// Build a structure for a live class, or return the one already cached
    /// under the same key.
    ///
    /// The ID attribute is registered with the context's ID factory. Fails
    /// with a configuration error if no ID attribute can be found, the
    /// default SRID does not resolve or the cache refuses the structure.
    pub fn create(ctx: &Context, cache: &StructureCache, source: FeatureSource) -> Result<Arc<Self>> {
        let key = source.cache_key();
        if let Some(existing) = cache.get(&key) {
            debug!("reusing cached feature {key}");
            return Ok(existing);
        }
        let structure = Arc::new(Self::build(ctx, source)?);
        ctx.id_factory()
            .add(&structure.class_name, &structure.id_attribute);

        let status = cache.attach(&structure);
        if status.is_failure() {
            structure.dispose();
            return Err(RegistryError::configuration(format!(
                "feature {key} could not be cached: {status}"
            )));
        }
        Ok(cache.get(&key).unwrap_or(structure))
    }

    /// Build an unattached structure
    pub fn build(ctx: &Context, source: FeatureSource) -> Result<Self> {
        let FeatureSource {
            ns_uri,
            folder,
            class,
            reference,
        } = source;
        let hints = ctx.hints();

        let id_attribute = hints
            .id_attributes
            .iter()
            .find(|name| class.attribute(name).is_some())
            .cloned()
            .or_else(|| class.intrinsic_id_attribute().map(|a| a.name.clone()))
            .ok_or_else(|| {
                RegistryError::configuration(format!("class {} has no ID attribute", class.name))
            })?;
        if class
            .attribute(&id_attribute)
            .is_some_and(|a| a.is_geometry())
        {
            return Err(RegistryError::configuration(format!(
                "geometry {id_attribute} of {} cannot be an ID",
                class.name
            )));
        }

        let srid_attribute = hints
            .srid_attributes
            .iter()
            .find(|name| class.attribute(name).is_some())
            .cloned();

        let default_geometry = hints
            .default_geometry_names
            .iter()
            .find(|name| class.attribute(name).is_some_and(|a| a.is_geometry()))
            .cloned()
            .or_else(|| class.geometry_attributes().next().map(|a| a.name.clone()));

        let srid = hints.default_srid.trim().to_string();
        let crs = ctx.resolver().decode(&srid).map_err(|err| {
            RegistryError::configuration(format!(
                "default SRID {srid} of {} does not resolve: {err}",
                class.name
            ))
        })?;

        let mut attributes = IndexMap::new();
        let mut geometries = IndexMap::new();
        for live in &class.attributes {
            if live.is_geometry() {
                let is_default = default_geometry.as_deref() == Some(live.name.as_str());
                geometries.insert(
                    live.name.clone(),
                    Arc::new(GeometryStructure::new(
                        live,
                        is_default,
                        srid.clone(),
                        Some(crs.clone()),
                    )),
                );
            } else {
                attributes.insert(
                    live.name.clone(),
                    Arc::new(AttributeStructure::new(
                        &class.name,
                        live,
                        live.name == id_attribute,
                    )),
                );
            }
        }

        Ok(Self {
            lifecycle: Lifecycle::new(StructureKind::Feature),
            ns_uri,
            folder,
            class_name: class.name.clone(),
            reference,
            id_attribute,
            srid_attribute,
            order: class.attributes.iter().map(|a| a.name.clone()).collect(),
            resolver: ctx.resolver().clone(),
            context: RwLock::new(ctx.id().clone()),
            uid: RwLock::new(None),
            metadata: RwLock::new(Metadata {
                srid,
                crs: Some(crs),
                default_geometry,
            }),
            attributes: RwLock::new(attributes),
            geometries: RwLock::new(geometries),
            record_hints: Mutex::new(RecordHints::default()),
        })
    }

    /// Key under which the structure is cached
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            &self.ns_uri,
            feature_path(&self.folder, self.reference.as_ref()),
            &self.class_name,
        )
    }

    /// Context currently owning the structure
    pub fn context_id(&self) -> ContextId {
        self.context.read().clone()
    }

    pub(crate) fn set_context(&self, id: ContextId) {
        *self.context.write() = id;
    }

    /// Shape checksum, `None` until validated
    pub fn uid(&self) -> Option<u32> {
        *self.uid.read()
    }

    /// Namespace URI
    pub fn namespace(&self) -> &str {
        &self.ns_uri
    }

    /// Folder the structure belongs to
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Live class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Relation for nested structures
    pub fn reference(&self) -> Option<&FeatureReference> {
        self.reference.as_ref()
    }

    /// Check if the structure describes root objects
    pub fn is_root(&self) -> bool {
        self.reference.is_none()
    }

    /// Name of the ID attribute
    pub fn id_attribute_name(&self) -> &str {
        &self.id_attribute
    }

    /// Name of the SRID attribute, if one was hinted
    pub fn srid_attribute_name(&self) -> Option<&str> {
        self.srid_attribute.as_deref()
    }

    /// Current SRID
    pub fn srid(&self) -> Result<String> {
        self.verify(false)?;
        Ok(self.metadata.read().srid.clone())
    }

    /// Current reference system
    pub fn crs(&self) -> Result<Option<Arc<CoordinateReferenceSystem>>> {
        self.verify(false)?;
        Ok(self.metadata.read().crs.clone())
    }

    /// Name of the default geometry
    pub fn default_geometry_name(&self) -> Result<Option<String>> {
        self.verify(false)?;
        Ok(self.metadata.read().default_geometry.clone())
    }

    /// Plain attribute by name
    pub fn attribute(&self, name: &str) -> Result<Option<Arc<AttributeStructure>>> {
        self.verify(false)?;
        Ok(self.attributes.read().get(name).cloned())
    }

    /// Geometry attribute by name
    pub fn geometry(&self, name: &str) -> Result<Option<Arc<GeometryStructure>>> {
        self.verify(false)?;
        Ok(self.geometries.read().get(name).cloned())
    }

    /// Plain attributes in declaration order
    pub fn attributes(&self) -> Result<Vec<Arc<AttributeStructure>>> {
        self.verify(false)?;
        Ok(self.attributes.read().values().cloned().collect())
    }

    /// Geometry attributes in declaration order
    pub fn geometries(&self) -> Result<Vec<Arc<GeometryStructure>>> {
        self.verify(false)?;
        Ok(self.geometries.read().values().cloned().collect())
    }

    fn owns_geometry(&self, name: &str) -> bool {
        self.geometries.read().contains_key(name)
    }

    /// Check if `name` is an owned geometry
    pub fn is_geometry(&self, name: &str) -> Result<bool> {
        self.verify(false)?;
        Ok(self.owns_geometry(name))
    }

    /// Check if `name` is the default geometry
    pub fn is_default_geometry(&self, name: &str) -> Result<bool> {
        self.verify(false)?;
        Ok(self.metadata.read().default_geometry.as_deref() == Some(name))
    }

    /// Check if `name` is an attribute or geometry of this structure
    pub fn has_member(&self, name: &str) -> Result<bool> {
        self.verify(false)?;
        Ok(self.attributes.read().contains_key(name) || self.owns_geometry(name))
    }

    /// Validate against the live model and compute the checksum.
    ///
    /// `parent` is the live class declaring the relation of nested
    /// structures and is ignored for roots.
    pub fn validate(
        &self,
        ids: &IdFactory,
        package: &LivePackage,
        parent: Option<&LiveClass>,
    ) -> Status {
        if let Err(err) = self.verify(false) {
            return Status::failure_with("feature is disposed", err).with_context(self.name());
        }
        self.lifecycle.invalidate();
        match self.check(ids, package, parent) {
            Ok(uid) => {
                *self.uid.write() = Some(uid);
                self.lifecycle.mark_valid();
                Status::success(format!("feature {} is valid", self.class_name))
            }
            Err(failure) => failure.with_context(self.name()),
        }
    }

    fn check(
        &self,
        ids: &IdFactory,
        package: &LivePackage,
        parent: Option<&LiveClass>,
    ) -> std::result::Result<u32, Status> {
        let mut triples = Vec::new();

        if let Some(reference) = &self.reference {
            let parent = parent.ok_or_else(|| {
                Status::failure(format!(
                    "nested feature {} needs its container class {}",
                    self.class_name, reference.container
                ))
            })?;
            let relation = parent.relation(&reference.relation).ok_or_else(|| {
                Status::failure(format!(
                    "relation {} not found on {}",
                    reference.relation, parent.name
                ))
            })?;
            triples.push((package.ns_uri.clone(), parent.ordinal, relation.ordinal));
        }

        let class = package.class(&self.class_name).ok_or_else(|| {
            Status::failure(format!(
                "class {} not found in {}",
                self.class_name, package.ns_uri
            ))
        })?;

        let id = class.attribute(&self.id_attribute);
        let attributes = self.attributes.read();
        let id_structure = attributes.get(&self.id_attribute).ok_or_else(|| {
            Status::failure(format!("ID attribute {} is not owned", self.id_attribute))
        })?;
        let status = id_structure.validate(true, id, ids);
        if status.is_failure() {
            return Err(status);
        }
        if let Some(live) = id {
            triples.push((package.ns_uri.clone(), class.ordinal, live.ordinal));
        }

        for (name, structure) in attributes.iter() {
            if *name == self.id_attribute {
                continue;
            }
            let live = class.attribute(name);
            let status = structure.validate(structure.is_id(), live, ids);
            if status.is_failure() {
                return Err(status);
            }
            if let Some(live) = live {
                triples.push((package.ns_uri.clone(), class.ordinal, live.ordinal));
            }
        }

        for (name, structure) in self.geometries.read().iter() {
            let live = class.attribute(name);
            let status = structure.validate(false, live);
            if status.is_failure() {
                return Err(status);
            }
            if let Some(live) = live {
                triples.push((package.ns_uri.clone(), class.ordinal, live.ordinal));
            }
        }

        Ok(shape_checksum(&mut triples))
    }

    /// Validate against the class of a live object
    pub fn validate_object(&self, ids: &IdFactory, object: &LiveObject) -> Status {
        let mut package = LivePackage::new(self.ns_uri.clone(), String::new());
        package
            .classes
            .insert(object.class().name.clone(), object.class().clone());
        let container = object.container();
        self.validate(ids, &package, container.as_ref().map(|c| c.class.as_ref()))
    }

    /// Change the SRID.
    ///
    /// No-op when the structure is unavailable, the value is blank or
    /// unchanged. If the new value does not resolve, the previous SRID is
    /// restored and a configuration error returned; owned geometries never
    /// see the unresolved value.
    pub fn set_srid(&self, srid: &str) -> Result<()> {
        let srid = srid.trim();
        if !self.is_available() || srid.is_empty() {
            return Ok(());
        }
        let old = {
            let mut metadata = self.metadata.write();
            if metadata.srid == srid {
                return Ok(());
            }
            std::mem::replace(&mut metadata.srid, srid.to_string())
        };

        let crs = match self.resolver.decode(srid) {
            Ok(crs) => crs,
            Err(err) => {
                let mut metadata = self.metadata.write();
                if metadata.srid == srid {
                    metadata.srid = old.clone();
                }
                warn!("SRID of {} kept at {old}: {err}", self.class_name);
                return Err(RegistryError::configuration(format!(
                    "cannot set SRID of {} to {srid}: {err}",
                    self.class_name
                )));
            }
        };

        self.metadata.write().crs = Some(crs.clone());
        for geometry in self.geometries.read().values() {
            geometry.set_reference(srid, Some(crs.clone()));
        }
        self.lifecycle.notify(&ChangeEvent {
            node: self.class_name.clone(),
            property: ChangeProperty::Srid,
            old_value: Some(old),
            new_value: Some(srid.to_string()),
        });
        Ok(())
    }

    /// Change the default geometry.
    ///
    /// Same rules as [`set_srid`](Self::set_srid), with membership in the
    /// owned geometries as the check.
    pub fn set_default_geometry_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if !self.is_available() || name.is_empty() {
            return Ok(());
        }
        let old = {
            let mut metadata = self.metadata.write();
            if metadata.default_geometry.as_deref() == Some(name) {
                return Ok(());
            }
            std::mem::replace(&mut metadata.default_geometry, Some(name.to_string()))
        };

        if !self.owns_geometry(name) {
            let mut metadata = self.metadata.write();
            if metadata.default_geometry.as_deref() == Some(name) {
                metadata.default_geometry = old;
            }
            return Err(RegistryError::configuration(format!(
                "{name} is not a geometry of {}",
                self.class_name
            )));
        }

        for (geometry_name, geometry) in self.geometries.read().iter() {
            geometry.set_default(geometry_name == name);
        }
        self.lifecycle.notify(&ChangeEvent {
            node: self.class_name.clone(),
            property: ChangeProperty::DefaultGeometryName,
            old_value: old,
            new_value: Some(name.to_string()),
        });
        Ok(())
    }

    /// Deep copy owned by another context.
    ///
    /// The copy keeps state and checksum but is neither cached nor
    /// registered with an ID factory.
    pub fn copy_into(&self, target: ContextId) -> Result<Arc<Self>> {
        self.verify(false)?;
        let state = match self.lifecycle.state() {
            NodeState::Valid => NodeState::Valid,
            _ => NodeState::Invalid,
        };
        let attributes = self
            .attributes
            .read()
            .iter()
            .map(|(name, a)| (name.clone(), Arc::new(a.copy())))
            .collect();
        let geometries = self
            .geometries
            .read()
            .iter()
            .map(|(name, g)| (name.clone(), Arc::new(g.copy())))
            .collect();
        Ok(Arc::new(Self {
            lifecycle: Lifecycle::with_state(StructureKind::Feature, state),
            ns_uri: self.ns_uri.clone(),
            folder: self.folder.clone(),
            class_name: self.class_name.clone(),
            reference: self.reference.clone(),
            id_attribute: self.id_attribute.clone(),
            srid_attribute: self.srid_attribute.clone(),
            order: self.order.clone(),
            resolver: self.resolver.clone(),
            context: RwLock::new(target),
            uid: RwLock::new(self.uid()),
            metadata: RwLock::new(self.metadata.read().clone()),
            attributes: RwLock::new(attributes),
            geometries: RwLock::new(geometries),
            record_hints: Mutex::new(*self.record_hints.lock()),
        }))
    }

    /// Typed-schema view
    pub fn feature_type(&self) -> Result<FeatureType> {
        self.verify(false)?;
        let attributes = self.attributes.read();
        let geometries = self.geometries.read();
        let descriptors = self
            .order
            .iter()
            .filter_map(|name| {
                if let Some(a) = attributes.get(name) {
                    Some(AttributeDescriptor {
                        name: name.clone(),
                        value_type: a.value_type(),
                        is_id: a.is_id(),
                        srid: None,
                    })
                } else {
                    geometries.get(name).map(|g| AttributeDescriptor {
                        name: name.clone(),
                        value_type: ValueType::Geometry,
                        is_id: false,
                        srid: Some(g.srid()),
                    })
                }
            })
            .collect();
        let metadata = self.metadata.read();
        Ok(FeatureType {
            name: self
                .reference
                .as_ref()
                .map_or_else(|| self.class_name.clone(), |r| r.relation.clone()),
            namespace: self.ns_uri.clone(),
            descriptors,
            default_geometry: metadata.default_geometry.clone(),
            crs: metadata.crs.clone(),
        })
    }

    /// Current record hints
    pub fn record_hints(&self) -> RecordHints {
        *self.record_hints.lock()
    }

    /// Replace the record hints. Waits for a record being materialized.
    pub fn set_record_hints(&self, hints: RecordHints) {
        *self.record_hints.lock() = hints;
    }

    /// Materialize one output record from a live object
    pub fn to_record(&self, object: &LiveObject) -> Result<FeatureRecord> {
        self.verify(true)?;
        if !object.is_instance_of(&self.class_name) {
            return Err(RegistryError::configuration(format!(
                "object {} is a {}, not a {}",
                object.key(),
                object.class().name,
                self.class_name
            )));
        }
        let hints = self.record_hints.lock();
        let id = object
            .get(&self.id_attribute)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string());
        let mut values = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if !hints.geometries && self.owns_geometry(name) {
                continue;
            }
            let value = object.get(name).unwrap_or_default();
            if hints.skip_nulls && value.is_null() {
                continue;
            }
            values.push((name.clone(), value));
        }
        Ok(FeatureRecord { id, values })
    }

    /// Structural equality: both valid with equal checksums
    pub fn eq_structure(&self, other: &FeatureStructure) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.uid().is_some()
            && self.uid() == other.uid()
    }
}

impl StructureNode for FeatureStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        &self.class_name
    }

    fn has_content(&self) -> bool {
        !self.geometries.read().is_empty()
    }

    fn invalidate(&self, deep: bool) {
        self.lifecycle.invalidate();
        if deep {
            for attribute in self.attributes.read().values() {
                attribute.invalidate(true);
            }
            for geometry in self.geometries.read().values() {
                geometry.invalidate(true);
            }
        }
    }

    fn dispose(&self) {
        if !self.lifecycle.dispose() {
            return;
        }
        for attribute in self.attributes.write().drain(..) {
            attribute.1.dispose();
        }
        for geometry in self.geometries.write().drain(..) {
            geometry.1.dispose();
        }
        *self.uid.write() = None;
    }
}
