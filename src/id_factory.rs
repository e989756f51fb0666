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

//! Per-resource identifier allocation for live objects
//!
//! A factory learns which attribute carries the ID of each class through
//! [`IdFactory::add`]. IDs are unique within one resource; the same value may
//! be used in two different resources.

use crate::config::IdentityMode;
use crate::error::{RegistryError, Result};
use crate::model::{LiveObject, ObjectKey};
use dashmap::DashMap;
use log::debug;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
struct ResourceIds {
    counter: u64,
    by_object: FxHashMap<ObjectKey, String>,
    by_id: FxHashMap<String, ObjectKey>,
}

impl ResourceIds {
    fn claim(&mut self, key: ObjectKey, id: String) {
        if let Some(previous) = self.by_object.insert(key, id.clone()) {
            self.by_id.remove(&previous);
        }
        self.by_id.insert(id, key);
    }

    fn is_taken_by_other(&self, id: &str, key: ObjectKey) -> bool {
        self.by_id.get(id).is_some_and(|owner| *owner != key)
    }
}

/// Mints and tracks unique identifiers for live objects
#[derive(Debug)]
pub struct IdFactory {
    mode: IdentityMode,
    /// Class name to ID attribute name
    attributes: DashMap<String, String>,
    /// Resource URI to allocated IDs
    resources: DashMap<String, ResourceIds>,
}

impl IdFactory {
    /// Create a factory for the given identity mode
    pub fn new(mode: IdentityMode) -> Self {
        Self {
            mode,
            attributes: DashMap::new(),
            resources: DashMap::new(),
        }
    }

    /// Factory that tracks IDs
    pub fn tracked() -> Self {
        Self::new(IdentityMode::Tracked)
    }

    /// Factory that never mints IDs
    pub fn void() -> Self {
        Self::new(IdentityMode::Void)
    }

    /// Identity mode
    pub fn mode(&self) -> IdentityMode {
        self.mode
    }

    /// Register the attribute carrying the ID of a class. Returns `false` if
    /// nothing was registered.
    pub fn add(&self, class: &str, attribute: &str) -> bool {
        if self.mode == IdentityMode::Void {
            return false;
        }
        if let Some(previous) = self
            .attributes
            .insert(class.to_string(), attribute.to_string())
        {
            if previous != attribute {
                debug!("ID attribute of {class} changed from {previous} to {attribute}");
            }
        }
        true
    }

    /// Check if IDs are minted for a class
    pub fn creates(&self, class: &str) -> bool {
        self.attributes.contains_key(class)
    }

    /// Check if IDs of a class are minted from the given attribute
    pub fn creates_from(&self, class: &str, attribute: &str) -> bool {
        self.attributes
            .get(class)
            .is_some_and(|registered| registered.value() == attribute)
    }

    /// ID attribute registered for a class
    pub fn id_attribute(&self, class: &str) -> Option<String> {
        self.attributes.get(class).map(|a| a.value().clone())
    }

    /// Check if an object holds an ID in its resource
    pub fn contains(&self, object: &LiveObject) -> bool {
        object.resource().is_some_and(|uri| {
            self.resources
                .get(&uri)
                .is_some_and(|ids| ids.by_object.contains_key(&object.key()))
        })
    }

    /// Check if any ID was allocated in a resource
    pub fn contains_resource(&self, uri: &str) -> bool {
        self.resources
            .get(uri)
            .is_some_and(|ids| !ids.by_object.is_empty())
    }

    fn check(&self, object: &LiveObject) -> Result<(String, String)> {
        let uri = object.resource().ok_or_else(|| {
            RegistryError::state(format!(
                "object {} is not attached to a resource",
                object.key()
            ))
        })?;
        let attribute = self.id_attribute(&object.class().name).ok_or_else(|| {
            RegistryError::configuration(format!(
                "no IDs are created for class {}",
                object.class().name
            ))
        })?;
        Ok((uri, attribute))
    }

    /// ID currently held by an object, `None` if it has none yet
    pub fn get_id(&self, object: &LiveObject) -> Result<Option<String>> {
        let (uri, _) = self.check(object)?;
        Ok(self
            .resources
            .get(&uri)
            .and_then(|ids| ids.by_object.get(&object.key()).cloned()))
    }

    /// Allocate an ID for an object, or return the one it already holds
    pub fn create_id(&self, object: &LiveObject) -> Result<String> {
        let (uri, attribute) = self.check(object)?;
        let mut ids = self.resources.entry(uri).or_default();
        if let Some(id) = ids.by_object.get(&object.key()) {
            return Ok(id.clone());
        }
        let id = loop {
            ids.counter += 1;
            let candidate = format!("{}.{}", object.class().name, ids.counter);
            if !ids.by_id.contains_key(&candidate) {
                break candidate;
            }
        };
        object.set(&attribute, id.as_str())?;
        ids.claim(object.key(), id.clone());
        Ok(id)
    }

    /// Claim an explicit ID for an object.
    ///
    /// If another object in the same resource already holds `id`, a numeric
    /// suffix is appended until the value is free. Returns the ID actually
    /// assigned.
    pub fn use_id(&self, object: &LiveObject, id: &str) -> Result<String> {
        let (uri, attribute) = self.check(object)?;
        let mut ids = self.resources.entry(uri).or_default();
        let key = object.key();
        let mut assigned = id.to_string();
        let mut suffix = 0u64;
        while ids.is_taken_by_other(&assigned, key) {
            suffix += 1;
            assigned = format!("{id}.{suffix}");
        }
        if assigned != id {
            debug!("ID {id} already taken, using {assigned}");
        }
        object.set(&attribute, assigned.as_str())?;
        ids.claim(key, assigned.clone());
        Ok(assigned)
    }

    /// Forget the ID held by an object
    pub fn release(&self, object: &LiveObject) -> Option<String> {
        let uri = object.resource()?;
        let mut ids = self.resources.get_mut(&uri)?;
        let id = ids.by_object.remove(&object.key())?;
        ids.by_id.remove(&id);
        Some(id)
    }

    /// Forget every registration and allocation
    pub fn dispose(&self) {
        self.attributes.clear();
        self.resources.clear();
    }
}

impl Default for IdFactory {
    fn default() -> Self {
        Self::tracked()
    }
}
