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

//! Live schema: domains, packages, folders, classes and their members

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Value type of a live attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Boolean value
    Boolean,
    /// 64-bit signed integer
    Integer,
    /// 64-bit float
    Float,
    /// UTF-8 text
    Text,
    /// Geometry value
    Geometry,
}

impl ValueType {
    /// Check if the type is geometry-valued
    pub fn is_geometry(&self) -> bool {
        matches!(self, ValueType::Geometry)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "Boolean"),
            ValueType::Integer => write!(f, "Integer"),
            ValueType::Float => write!(f, "Float"),
            ValueType::Text => write!(f, "Text"),
            ValueType::Geometry => write!(f, "Geometry"),
        }
    }
}

/// Attribute declared by a live class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveAttribute {
    /// Attribute name
    pub name: String,
    /// Member ordinal, stable for the lifetime of the declaring class
    pub ordinal: u32,
    /// Value type
    pub value_type: ValueType,
}

impl LiveAttribute {
    /// Create a new attribute
    pub fn new(name: impl Into<String>, ordinal: u32, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            ordinal,
            value_type,
        }
    }

    /// Check if the attribute holds geometry values
    pub fn is_geometry(&self) -> bool {
        self.value_type.is_geometry()
    }
}

/// Named relation from one live class to another
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveRelation {
    /// Relation name
    pub name: String,
    /// Member ordinal within the declaring class
    pub ordinal: u32,
    /// Target class name
    pub target: String,
    /// Whether the declaring class contains its targets
    pub containment: bool,
}

impl LiveRelation {
    /// Create a containment relation
    pub fn containment(name: impl Into<String>, ordinal: u32, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            target: target.into(),
            containment: true,
        }
    }

    /// Create a plain cross reference
    pub fn reference(name: impl Into<String>, ordinal: u32, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            target: target.into(),
            containment: false,
        }
    }
}

/// Record-like type defined in the live model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveClass {
    /// Class name, unique within its package
    pub name: String,
    /// Class ordinal within its package
    pub ordinal: u32,
    /// All attributes, inherited ones included, in declaration order
    pub attributes: Vec<Arc<LiveAttribute>>,
    /// Intrinsic ID attribute, if the class declares one
    pub id_attribute: Option<String>,
    /// Relations to other classes
    pub relations: Vec<Arc<LiveRelation>>,
}

impl LiveClass {
    /// Start building a class
    pub fn builder(name: impl Into<String>, ordinal: u32) -> LiveClassBuilder {
        LiveClassBuilder::new(name, ordinal)
    }

    /// Find an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Arc<LiveAttribute>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Find a relation by name
    pub fn relation(&self, name: &str) -> Option<&Arc<LiveRelation>> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// The intrinsic ID attribute
    pub fn intrinsic_id_attribute(&self) -> Option<&Arc<LiveAttribute>> {
        self.id_attribute.as_deref().and_then(|name| self.attribute(name))
    }

    /// Geometry-valued attributes in declaration order
    pub fn geometry_attributes(&self) -> impl Iterator<Item = &Arc<LiveAttribute>> {
        self.attributes.iter().filter(|a| a.is_geometry())
    }

    /// Containment relations in declaration order
    pub fn containments(&self) -> impl Iterator<Item = &Arc<LiveRelation>> {
        self.relations.iter().filter(|r| r.containment)
    }
}

/// Builder for [`LiveClass`]
#[derive(Debug)]
pub struct LiveClassBuilder {
    class: LiveClass,
    next_ordinal: u32,
}

impl LiveClassBuilder {
    /// Create a builder for a class with no members
    pub fn new(name: impl Into<String>, ordinal: u32) -> Self {
        Self {
            class: LiveClass {
                name: name.into(),
                ordinal,
                attributes: Vec::new(),
                id_attribute: None,
                relations: Vec::new(),
            },
            next_ordinal: 0,
        }
    }

    fn take_ordinal(&mut self) -> u32 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    /// Declare an attribute with the next member ordinal
    pub fn attribute(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        let ordinal = self.take_ordinal();
        self.class
            .attributes
            .push(Arc::new(LiveAttribute::new(name, ordinal, value_type)));
        self
    }

    /// Declare an attribute with an explicit member ordinal
    pub fn attribute_at(
        mut self,
        name: impl Into<String>,
        ordinal: u32,
        value_type: ValueType,
    ) -> Self {
        self.next_ordinal = self.next_ordinal.max(ordinal + 1);
        self.class
            .attributes
            .push(Arc::new(LiveAttribute::new(name, ordinal, value_type)));
        self
    }

    /// Declare a text attribute and mark it as the intrinsic ID
    pub fn id(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.class.id_attribute = Some(name.clone());
        self.attribute(name, ValueType::Text)
    }

    /// Mark an already declared attribute as the intrinsic ID
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.class.id_attribute = Some(name.into());
        self
    }

    /// Declare a geometry attribute
    pub fn geometry(self, name: impl Into<String>) -> Self {
        self.attribute(name, ValueType::Geometry)
    }

    /// Declare a containment relation
    pub fn contains(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let ordinal = self.take_ordinal();
        self.class
            .relations
            .push(Arc::new(LiveRelation::containment(name, ordinal, target)));
        self
    }

    /// Declare a cross reference
    pub fn references(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let ordinal = self.take_ordinal();
        self.class
            .relations
            .push(Arc::new(LiveRelation::reference(name, ordinal, target)));
        self
    }

    /// Finish
    pub fn build(self) -> LiveClass {
        self.class
    }
}

/// Explicit folder declaration within a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFolder {
    /// Folder name
    pub name: String,
    /// Names of the classes scanned by this folder
    pub classes: Vec<String>,
}

impl LiveFolder {
    /// Create a folder declaration
    pub fn new(name: impl Into<String>, classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Namespace grouping classes within a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePackage {
    /// Namespace URI, unique within the domain
    pub ns_uri: String,
    /// Package name, also the name of the implicit folder
    pub name: String,
    /// Classes by name, in declaration order
    pub classes: IndexMap<String, Arc<LiveClass>>,
    /// Explicit folders; empty means one implicit folder holding every class
    pub folders: Vec<LiveFolder>,
}

impl LivePackage {
    /// Create an empty package
    pub fn new(ns_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ns_uri: ns_uri.into(),
            name: name.into(),
            classes: IndexMap::new(),
            folders: Vec::new(),
        }
    }

    /// Add a class, replacing any class with the same name
    pub fn with_class(mut self, class: LiveClass) -> Self {
        self.classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    /// Declare a folder
    pub fn with_folder(mut self, folder: LiveFolder) -> Self {
        self.folders.push(folder);
        self
    }

    /// Find a class by name
    pub fn class(&self, name: &str) -> Option<&Arc<LiveClass>> {
        self.classes.get(name)
    }

    /// Names of the folders this package exposes
    pub fn folder_names(&self) -> Vec<String> {
        if self.folders.is_empty() {
            vec![self.name.clone()]
        } else {
            self.folders.iter().map(|f| f.name.clone()).collect()
        }
    }

    /// Classes scanned by a folder, `None` if the folder does not exist
    pub fn folder_classes(&self, folder: &str) -> Option<Vec<Arc<LiveClass>>> {
        if self.folders.is_empty() {
            return (folder == self.name).then(|| self.classes.values().cloned().collect());
        }
        let declared = self.folders.iter().find(|f| f.name == folder)?;
        Some(
            declared
                .classes
                .iter()
                .filter_map(|name| self.classes.get(name).cloned())
                .collect(),
        )
    }

    /// Class that declares a containment relation to `target` under `relation`
    pub fn container_of(&self, target: &str, relation: &str) -> Option<&Arc<LiveClass>> {
        self.classes.values().find(|c| {
            c.relation(relation)
                .is_some_and(|r| r.containment && r.target == target)
        })
    }
}

/// Named resource scope owning packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDomain {
    /// Domain ID
    pub id: String,
    /// Packages by namespace URI
    pub packages: IndexMap<String, Arc<LivePackage>>,
}

impl LiveDomain {
    /// Create an empty domain
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            packages: IndexMap::new(),
        }
    }

    /// Add a package, replacing any package with the same namespace
    pub fn with_package(mut self, package: LivePackage) -> Self {
        self.packages
            .insert(package.ns_uri.clone(), Arc::new(package));
        self
    }

    /// Find a package by namespace URI
    pub fn package(&self, ns_uri: &str) -> Option<&Arc<LivePackage>> {
        self.packages.get(ns_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn road() -> LiveClass {
        LiveClass::builder("Road", 0)
            .id("id")
            .attribute("name", ValueType::Text)
            .geometry("geom")
            .build()
    }

    #[test]
    fn test_builder_assigns_member_ordinals() {
        let class = road();
        let ordinals: Vec<u32> = class.attributes.iter().map(|a| a.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(class.intrinsic_id_attribute().unwrap().name, "id");
        assert_eq!(class.geometry_attributes().count(), 1);
    }

    #[test]
    fn test_implicit_folder() {
        let package = LivePackage::new("urn:roads", "roads").with_class(road());
        assert_eq!(package.folder_names(), vec!["roads"]);
        assert_eq!(package.folder_classes("roads").unwrap().len(), 1);
        assert!(package.folder_classes("other").is_none());
    }

    #[test]
    fn test_explicit_folders() {
        let package = LivePackage::new("urn:roads", "roads")
            .with_class(road())
            .with_folder(LiveFolder::new("main", ["Road", "Missing"]));
        assert_eq!(package.folder_names(), vec!["main"]);
        let classes = package.folder_classes("main").unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Road");
    }

    #[test]
    fn test_container_of() {
        let network = LiveClass::builder("Network", 1)
            .id("id")
            .contains("roads", "Road")
            .build();
        let package = LivePackage::new("urn:roads", "roads")
            .with_class(road())
            .with_class(network);
        assert_eq!(package.container_of("Road", "roads").unwrap().name, "Network");
        assert!(package.container_of("Road", "lanes").is_none());
    }
}
