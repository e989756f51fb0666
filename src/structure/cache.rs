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

//! Flyweight cache of feature structures
//!
//! Each context owns one cache. A key maps to a single canonical structure;
//! attaching a second structure under a live key keeps the first. Structures
//! live in the cache's [`StructureArena`] and the key map stores handles, so
//! tearing the cache down invalidates every handle scopes still hold.

use super::arena::{Handle, StructureArena};
use super::feature::FeatureStructure;
use super::node::StructureNode;
use crate::context::ContextId;
use crate::error::{RegistryError, Result};
use crate::status::Status;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Composite cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Namespace URI
    pub ns_uri: String,
    /// Folder path, with the relation appended for nested features
    pub path: String,
    /// Live class name
    pub class_name: String,
}

impl CacheKey {
    /// Create a key
    pub fn new(
        ns_uri: impl Into<String>,
        path: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            ns_uri: ns_uri.into(),
            path: path.into(),
            class_name: class_name.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.ns_uri, self.path, self.class_name)
    }
}

/// Operation a voter is asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Structure is about to be cached
    Attach,
    /// Structure is about to be removed
    Detach,
}

/// Permission gate consulted before the cache changes
pub type Voter = Arc<dyn Fn(CacheAction, &FeatureStructure) -> bool + Send + Sync>;

/// Per-context cache of canonical feature structures
pub struct StructureCache {
    owner: ContextId,
    arena: StructureArena<FeatureStructure>,
    entries: DashMap<CacheKey, Handle<FeatureStructure>>,
    voters: RwLock<Vec<Voter>>,
}

impl fmt::Debug for StructureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureCache")
            .field("owner", &self.owner)
            .field("entries", &self.entries.len())
            .field("voters", &self.voters.read().len())
            .finish()
    }
}

impl StructureCache {
    /// Create an empty cache owned by a context
    pub fn new(owner: ContextId) -> Self {
        Self {
            owner,
            arena: StructureArena::new(),
            entries: DashMap::new(),
            voters: RwLock::new(Vec::new()),
        }
    }

    /// Owning context
    pub fn owner(&self) -> &ContextId {
        &self.owner
    }

    /// Register an additional voter
    pub fn add_voter(&self, voter: Voter) {
        self.voters.write().push(voter);
    }

    fn vote(&self, action: CacheAction, structure: &FeatureStructure) -> Option<Status> {
        if action == CacheAction::Attach && structure.context_id() != self.owner {
            return Some(Status::failure(format!(
                "feature {} belongs to context {}, not {}",
                structure.class_name(),
                structure.context_id(),
                self.owner
            )));
        }
        // Voters run without the lock held
        let voters: Vec<Voter> = self.voters.read().clone();
        if voters.iter().all(|voter| voter(action, structure)) {
            None
        } else {
            Some(Status::failure(format!(
                "{action:?} of feature {} vetoed",
                structure.class_name()
            )))
        }
    }

    /// Cache a structure. Never panics; refusals are reported as failures.
    ///
    /// If a live structure is already cached under the same key, that one
    /// stays canonical and the status says so.
    pub fn attach(&self, structure: &Arc<FeatureStructure>) -> Status {
        if structure.is_disposed() {
            return Status::failure_with(
                "cannot cache a disposed feature",
                RegistryError::state(format!("feature {} is disposed", structure.class_name())),
            );
        }
        if let Some(refused) = self.vote(CacheAction::Attach, structure) {
            warn!("cache attach refused: {}", refused.message);
            return refused;
        }

        let key = structure.cache_key();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = *occupied.get();
                match self.arena.get(current) {
                    Ok(existing) if Arc::ptr_eq(&existing, structure) => {
                        Status::success(format!("feature {key} already cached"))
                    }
                    Ok(existing) if !existing.is_disposed() => {
                        debug!("feature {key} already has a canonical instance");
                        Status::success(format!("feature {key} reuses the cached instance"))
                    }
                    _ => match self.arena.insert(structure.clone()) {
                        Ok(handle) => {
                            self.arena.remove(current);
                            occupied.insert(handle);
                            debug!("replaced stale cache entry {key}");
                            Status::success(format!("feature {key} cached"))
                        }
                        Err(err) => Status::failure_with("cache is torn down", err),
                    },
                }
            }
            Entry::Vacant(vacant) => match self.arena.insert(structure.clone()) {
                Ok(handle) => {
                    vacant.insert(handle);
                    debug!("cached feature {key}");
                    Status::success(format!("feature {key} cached"))
                }
                Err(err) => Status::failure_with("cache is torn down", err),
            },
        }
    }

    /// Remove a structure.
    ///
    /// Fails without changing the cache if a different structure holds the
    /// key, e.g. after the entry was re-cached concurrently.
    pub fn detach(&self, structure: &FeatureStructure) -> Status {
        if let Some(refused) = self.vote(CacheAction::Detach, structure) {
            warn!("cache detach refused: {}", refused.message);
            return refused;
        }
        let key = structure.cache_key();
        let removed = self.entries.remove_if(&key, |_, handle| {
            self.arena
                .get(*handle)
                .is_ok_and(|cached| std::ptr::eq(cached.as_ref(), structure))
        });
        match removed {
            Some((_, handle)) => {
                self.arena.remove(handle);
                debug!("detached feature {key}");
                Status::success(format!("feature {key} detached"))
            }
            None if self.entries.contains_key(&key) => {
                warn!("detach of {key} raced with another instance; entry kept");
                Status::failure(format!("feature {key} is cached as a different instance"))
            }
            None => Status::failure(format!("feature {key} is not cached")),
        }
    }

    /// Canonical structure for a key. Disposed entries read as absent.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<FeatureStructure>> {
        let handle = *self.entries.get(key)?;
        self.arena
            .get(handle)
            .ok()
            .filter(|structure| !structure.is_disposed())
    }

    /// Handle of the entry for a key
    pub fn handle(&self, key: &CacheKey) -> Option<Handle<FeatureStructure>> {
        self.entries.get(key).map(|h| *h)
    }

    /// Resolve a handle
    pub fn resolve(&self, handle: Handle<FeatureStructure>) -> Result<Arc<FeatureStructure>> {
        self.arena.get(handle)
    }

    /// Valid structure with the given checksum
    pub fn find_by_uid(&self, uid: u32) -> Option<Arc<FeatureStructure>> {
        self.arena
            .values()
            .into_iter()
            .find(|s| s.is_valid() && s.uid() == Some(uid))
    }

    /// Check if a structure is the canonical instance of its key
    pub fn contains(&self, structure: &FeatureStructure) -> bool {
        self.get(&structure.cache_key())
            .is_some_and(|cached| std::ptr::eq(cached.as_ref(), structure))
    }

    /// Every cached structure
    pub fn structures(&self) -> Vec<Arc<FeatureStructure>> {
        self.arena.values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, dispose every structure and invalidate all handles
    pub fn teardown(&self) -> usize {
        self.entries.clear();
        self.voters.write().clear();
        let released = self.arena.teardown();
        for structure in &released {
            structure.dispose();
        }
        debug!("cache of context {} torn down", self.owner);
        released.len()
    }
}
