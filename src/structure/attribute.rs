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

//! Attribute and geometry structures

use super::node::{Lifecycle, StructureKind, StructureNode};
use crate::config::IdentityMode;
use crate::crs::CoordinateReferenceSystem;
use crate::id_factory::IdFactory;
use crate::model::{LiveAttribute, ValueType};
use crate::status::Status;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Structural description of one non-geometry attribute
#[derive(Debug)]
pub struct AttributeStructure {
    lifecycle: Lifecycle,
    name: String,
    class_name: String,
    value_type: ValueType,
    is_id: bool,
    live: RwLock<Weak<LiveAttribute>>,
}

impl AttributeStructure {
    /// Describe a live attribute of `class_name`
    pub fn new(class_name: impl Into<String>, live: &Arc<LiveAttribute>, is_id: bool) -> Self {
        Self {
            lifecycle: Lifecycle::new(StructureKind::Attribute),
            name: live.name.clone(),
            class_name: class_name.into(),
            value_type: live.value_type,
            is_id,
            live: RwLock::new(Arc::downgrade(live)),
        }
    }

    /// Check if this attribute carries the feature ID
    pub fn is_id(&self) -> bool {
        self.is_id
    }

    /// Value type seen at construction
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Live attribute, `None` once the live model dropped it
    pub fn live_attribute(&self) -> Option<Arc<LiveAttribute>> {
        self.live.read().upgrade()
    }

    /// Validate against a live attribute.
    ///
    /// ID attributes additionally require the factory to mint IDs from them,
    /// unless the factory is a no-op identity.
    pub fn validate(
        &self,
        is_id: bool,
        live: Option<&Arc<LiveAttribute>>,
        ids: &IdFactory,
    ) -> Status {
        self.lifecycle.invalidate();
        let status = check_live(&self.name, live, false)
            .and_then(|live| {
                if is_id != self.is_id {
                    return Err(Status::failure(format!(
                        "attribute {} ID flag mismatch",
                        self.name
                    )));
                }
                if is_id
                    && ids.mode() != IdentityMode::Void
                    && !ids.creates_from(&self.class_name, &self.name)
                {
                    return Err(Status::failure(format!(
                        "IDs of {} are not created from {}",
                        self.class_name, self.name
                    )));
                }
                Ok(live)
            })
            .map(|live| {
                *self.live.write() = Arc::downgrade(live);
                self.lifecycle.mark_valid();
                Status::success(format!("attribute {} is valid", self.name))
            });
        status.unwrap_or_else(|failure| failure.with_context(self.name.clone()))
    }

    /// Deep copy for another context
    pub fn copy(&self) -> Self {
        Self {
            lifecycle: Lifecycle::with_state(StructureKind::Attribute, self.lifecycle.state()),
            name: self.name.clone(),
            class_name: self.class_name.clone(),
            value_type: self.value_type,
            is_id: self.is_id,
            live: RwLock::new(self.live.read().clone()),
        }
    }
}

impl StructureNode for AttributeStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, _deep: bool) {
        self.lifecycle.invalidate();
    }

    fn dispose(&self) {
        if self.lifecycle.dispose() {
            *self.live.write() = Weak::new();
        }
    }
}

fn check_live<'a>(
    name: &str,
    live: Option<&'a Arc<LiveAttribute>>,
    geometry: bool,
) -> Result<&'a Arc<LiveAttribute>, Status> {
    let live =
        live.ok_or_else(|| Status::failure(format!("live attribute {name} not found")))?;
    if live.name != name {
        return Err(Status::failure(format!(
            "attribute name mismatch: expected {name}, found {}",
            live.name
        )));
    }
    if live.is_geometry() != geometry {
        let expected = if geometry { "geometry" } else { "non-geometry" };
        return Err(Status::failure(format!(
            "attribute {name} is no longer {expected}-valued"
        )));
    }
    Ok(live)
}

#[derive(Debug, Clone)]
struct Reference {
    srid: String,
    crs: Option<Arc<CoordinateReferenceSystem>>,
}

/// Structural description of one geometry-valued attribute
#[derive(Debug)]
pub struct GeometryStructure {
    lifecycle: Lifecycle,
    name: String,
    default: AtomicBool,
    reference: RwLock<Reference>,
    live: RwLock<Weak<LiveAttribute>>,
}

impl GeometryStructure {
    /// Describe a live geometry attribute
    pub fn new(
        live: &Arc<LiveAttribute>,
        default: bool,
        srid: impl Into<String>,
        crs: Option<Arc<CoordinateReferenceSystem>>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(StructureKind::Geometry),
            name: live.name.clone(),
            default: AtomicBool::new(default),
            reference: RwLock::new(Reference {
                srid: srid.into(),
                crs,
            }),
            live: RwLock::new(Arc::downgrade(live)),
        }
    }

    /// Check if this is the default geometry of its feature
    pub fn is_default(&self) -> bool {
        self.default.load(Ordering::Acquire)
    }

    pub(crate) fn set_default(&self, default: bool) {
        self.default.store(default, Ordering::Release);
    }

    /// Spatial reference ID
    pub fn srid(&self) -> String {
        self.reference.read().srid.clone()
    }

    /// Resolved reference system
    pub fn crs(&self) -> Option<Arc<CoordinateReferenceSystem>> {
        self.reference.read().crs.clone()
    }

    pub(crate) fn set_reference(
        &self,
        srid: impl Into<String>,
        crs: Option<Arc<CoordinateReferenceSystem>>,
    ) {
        *self.reference.write() = Reference {
            srid: srid.into(),
            crs,
        };
    }

    /// Live attribute, `None` once the live model dropped it
    pub fn live_attribute(&self) -> Option<Arc<LiveAttribute>> {
        self.live.read().upgrade()
    }

    /// Validate against a live attribute. Geometries are never IDs.
    pub fn validate(&self, is_id: bool, live: Option<&Arc<LiveAttribute>>) -> Status {
        self.lifecycle.invalidate();
        if is_id {
            return Status::failure(format!("geometry {} cannot be an ID", self.name))
                .with_context(self.name.clone());
        }
        match check_live(&self.name, live, true) {
            Ok(live) => {
                *self.live.write() = Arc::downgrade(live);
                self.lifecycle.mark_valid();
                Status::success(format!("geometry {} is valid", self.name))
            }
            Err(failure) => failure.with_context(self.name.clone()),
        }
    }

    /// Deep copy for another context
    pub fn copy(&self) -> Self {
        Self {
            lifecycle: Lifecycle::with_state(StructureKind::Geometry, self.lifecycle.state()),
            name: self.name.clone(),
            default: AtomicBool::new(self.is_default()),
            reference: RwLock::new(self.reference.read().clone()),
            live: RwLock::new(self.live.read().clone()),
        }
    }
}

impl StructureNode for GeometryStructure {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, _deep: bool) {
        self.lifecycle.invalidate();
    }

    fn dispose(&self) {
        if self.lifecycle.dispose() {
            *self.live.write() = Weak::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{CrsResolver, StaticCrsResolver};
    use crate::model::LiveClass;

    fn road() -> LiveClass {
        LiveClass::builder("Road", 0)
            .id("id")
            .attribute("name", ValueType::Text)
            .geometry("geom")
            .build()
    }

    #[test]
    fn test_id_attribute_requires_factory_registration() {
        let class = road();
        let live = class.attribute("id").unwrap();
        let structure = AttributeStructure::new("Road", live, true);
        let ids = IdFactory::tracked();

        let status = structure.validate(true, Some(live), &ids);
        assert!(status.is_failure());
        assert_eq!(status.context, vec!["id".to_string()]);

        ids.add("Road", "id");
        assert!(structure.validate(true, Some(live), &ids).is_success());
        assert!(structure.is_valid());
    }

    #[test]
    fn test_void_identity_accepts_any_id() {
        let class = road();
        let live = class.attribute("id").unwrap();
        let structure = AttributeStructure::new("Road", live, true);
        assert!(structure.validate(true, Some(live), &IdFactory::void()).is_success());
    }

    #[test]
    fn test_validate_mismatches() {
        let class = road();
        let name = class.attribute("name").unwrap();
        let geom = class.attribute("geom").unwrap();
        let structure = AttributeStructure::new("Road", name, false);
        let ids = IdFactory::tracked();

        assert!(structure.validate(false, None, &ids).is_failure());
        assert!(structure.validate(false, Some(geom), &ids).is_failure());
        assert!(structure.validate(true, Some(name), &ids).is_failure());
        assert!(!structure.is_valid());
        assert!(structure.validate(false, Some(name), &ids).is_success());
    }

    #[test]
    fn test_geometry_validate() {
        let class = road();
        let geom = class.attribute("geom").unwrap();
        let crs = StaticCrsResolver::new().decode("EPSG:4326").ok();
        let structure = GeometryStructure::new(geom, true, "EPSG:4326", crs);

        assert!(structure.validate(true, Some(geom)).is_failure());
        assert!(structure.validate(false, class.attribute("name")).is_failure());
        assert!(structure.validate(false, Some(geom)).is_success());
        assert!(structure.is_default());
        assert_eq!(structure.srid(), "EPSG:4326");
    }

    #[test]
    fn test_weak_link_does_not_keep_live_attribute() {
        let structure = {
            let class = road();
            AttributeStructure::new("Road", class.attribute("name").unwrap(), false)
        };
        assert!(structure.live_attribute().is_none());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let class = road();
        let geom = GeometryStructure::new(class.attribute("geom").unwrap(), true, "EPSG:4326", None);
        geom.dispose();
        geom.dispose();
        assert!(geom.is_disposed());
        assert!(geom.live_attribute().is_none());
        assert!(geom.verify(false).is_err());
    }
}
