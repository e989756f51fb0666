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

//! Read-only typed-schema view of a feature structure

use crate::crs::CoordinateReferenceSystem;
use crate::model::{Value, ValueType};
use std::sync::Arc;

/// Description of one attribute in a [`FeatureType`]
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    /// Attribute name
    pub name: String,
    /// Value type
    pub value_type: ValueType,
    /// Whether the attribute carries the feature ID
    pub is_id: bool,
    /// SRID of geometry attributes
    pub srid: Option<String>,
}

impl AttributeDescriptor {
    /// Check if the attribute is geometry-valued
    pub fn is_geometry(&self) -> bool {
        self.value_type.is_geometry()
    }
}

/// Schema of the records a feature structure describes
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureType {
    /// Type name: the class name for root features, the relation name for
    /// nested ones
    pub name: String,
    /// Namespace URI
    pub namespace: String,
    /// Attributes in declaration order
    pub descriptors: Vec<AttributeDescriptor>,
    /// Name of the default geometry
    pub default_geometry: Option<String>,
    /// Reference system of the default geometry
    pub crs: Option<Arc<CoordinateReferenceSystem>>,
}

impl FeatureType {
    /// Position of an attribute
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    /// Descriptor by name
    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Descriptor of the default geometry
    pub fn default_geometry_descriptor(&self) -> Option<&AttributeDescriptor> {
        self.default_geometry
            .as_deref()
            .and_then(|name| self.descriptor(name))
    }

    /// Descriptor of the ID attribute
    pub fn id_descriptor(&self) -> Option<&AttributeDescriptor> {
        self.descriptors.iter().find(|d| d.is_id)
    }

    /// Number of attributes
    pub fn attribute_count(&self) -> usize {
        self.descriptors.len()
    }
}

/// One materialized output record
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    /// Feature ID, if the object holds one
    pub id: Option<String>,
    /// Values in schema order
    pub values: Vec<(String, Value)>,
}

impl FeatureRecord {
    /// Value by attribute name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Controls applied while materializing records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHints {
    /// Leave null values out of the record
    pub skip_nulls: bool,
    /// Include geometry values
    pub geometries: bool,
}

impl Default for RecordHints {
    fn default() -> Self {
        Self {
            skip_nulls: false,
            geometries: true,
        }
    }
}
