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

//! Live object instances, their values and the resources holding them

use super::schema::LiveClass;
use super::tree::DepthFirstCursor;
use crate::error::{RegistryError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_OBJECT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(u64);

impl ObjectKey {
    fn next() -> Self {
        Self(NEXT_OBJECT_KEY.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw key value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned bounding box standing in for a geometry value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Minimum x
    pub min_x: f64,
    /// Minimum y
    pub min_y: f64,
    /// Maximum x
    pub max_x: f64,
    /// Maximum y
    pub max_y: f64,
}

impl Envelope {
    /// Create an envelope, normalizing swapped corners
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Degenerate envelope of a single point
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Check if two envelopes share at least one point
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// Attribute value held by a live object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value
    #[default]
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer
    Integer(i64),
    /// Float
    Float(f64),
    /// Text
    Text(String),
    /// Geometry, reduced to its envelope
    Geometry(Envelope),
}

impl Value {
    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the envelope, if this is a geometry value
    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            Value::Geometry(e) => Some(e),
            _ => None,
        }
    }

    /// Compare two values, `None` if they are not comparable.
    ///
    /// Integers and floats compare numerically with each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Geometry(e) => write!(
                f,
                "BOX({} {}, {} {})",
                e.min_x, e.min_y, e.max_x, e.max_y
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Envelope> for Value {
    fn from(value: Envelope) -> Self {
        Value::Geometry(value)
    }
}

/// Containing object's class and the relation holding a nested object
#[derive(Debug, Clone)]
pub struct ContainerRef {
    /// Class of the container
    pub class: Arc<LiveClass>,
    /// Containment relation name
    pub relation: String,
}

/// Instance of a live class
#[derive(Debug)]
pub struct LiveObject {
    key: ObjectKey,
    class: Arc<LiveClass>,
    values: RwLock<IndexMap<String, Value>>,
    children: RwLock<Vec<Arc<LiveObject>>>,
    container: RwLock<Option<ContainerRef>>,
    resource: RwLock<Option<String>>,
}

impl LiveObject {
    /// Create an object with every attribute set to null
    pub fn new(class: Arc<LiveClass>) -> Arc<Self> {
        let values = class
            .attributes
            .iter()
            .map(|a| (a.name.clone(), Value::Null))
            .collect();
        Arc::new(Self {
            key: ObjectKey::next(),
            class,
            values: RwLock::new(values),
            children: RwLock::new(Vec::new()),
            container: RwLock::new(None),
            resource: RwLock::new(None),
        })
    }

    /// Create an object and assign the given values
    pub fn with_values<I, K, V>(class: Arc<LiveClass>, values: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let object = Self::new(class);
        for (name, value) in values {
            object.set(name.as_ref(), value)?;
        }
        Ok(object)
    }

    /// Process-unique key
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    /// Class of this object
    pub fn class(&self) -> &Arc<LiveClass> {
        &self.class
    }

    /// Check if this object is an instance of the named class
    pub fn is_instance_of(&self, class_name: &str) -> bool {
        self.class.name == class_name
    }

    /// Read an attribute value, `None` if the class has no such attribute
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    /// Write an attribute value
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut values = self.values.write();
        match values.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(RegistryError::model(format!(
                "class {} has no attribute {name}",
                self.class.name
            ))),
        }
    }

    /// Nest `child` under this object through a containment relation
    pub fn add_child(&self, relation: &str, child: Arc<LiveObject>) -> Result<()> {
        let declared = self.class.relation(relation).ok_or_else(|| {
            RegistryError::model(format!(
                "class {} has no relation {relation}",
                self.class.name
            ))
        })?;
        if !declared.containment || declared.target != child.class.name {
            return Err(RegistryError::model(format!(
                "relation {}.{relation} cannot contain {}",
                self.class.name, child.class.name
            )));
        }
        *child.container.write() = Some(ContainerRef {
            class: self.class.clone(),
            relation: relation.to_string(),
        });
        if let Some(uri) = self.resource() {
            child.attach_resource(&uri);
        }
        self.children.write().push(child);
        Ok(())
    }

    /// Snapshot of the direct children
    pub fn children(&self) -> Vec<Arc<LiveObject>> {
        self.children.read().clone()
    }

    /// Container of this object, `None` for roots
    pub fn container(&self) -> Option<ContainerRef> {
        self.container.read().clone()
    }

    /// URI of the resource this object is attached to
    pub fn resource(&self) -> Option<String> {
        self.resource.read().clone()
    }

    /// Attach this object and its subtree to a resource
    pub fn attach_resource(&self, uri: &str) {
        *self.resource.write() = Some(uri.to_string());
        for child in self.children.read().iter() {
            child.attach_resource(uri);
        }
    }

    /// Detach this object and its subtree from its resource
    pub fn detach_resource(&self) {
        *self.resource.write() = None;
        for child in self.children.read().iter() {
            child.detach_resource();
        }
    }
}

/// Addressable container of root objects
#[derive(Debug)]
pub struct Resource {
    uri: String,
    roots: RwLock<Vec<Arc<LiveObject>>>,
}

impl Resource {
    /// Create an empty resource
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            roots: RwLock::new(Vec::new()),
        }
    }

    /// Resource URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Add a root object, attaching its subtree to this resource
    pub fn add_root(&self, object: Arc<LiveObject>) {
        object.attach_resource(&self.uri);
        self.roots.write().push(object);
    }

    /// Remove a root object by key, detaching its subtree
    pub fn remove_root(&self, key: ObjectKey) -> Option<Arc<LiveObject>> {
        let mut roots = self.roots.write();
        let index = roots.iter().position(|o| o.key() == key)?;
        let object = roots.remove(index);
        object.detach_resource();
        Some(object)
    }

    /// Snapshot of the root objects
    pub fn roots(&self) -> Vec<Arc<LiveObject>> {
        self.roots.read().clone()
    }

    /// Lazy depth-first cursor over every object in this resource
    pub fn cursor(&self) -> DepthFirstCursor {
        DepthFirstCursor::new(self.roots())
    }
}
