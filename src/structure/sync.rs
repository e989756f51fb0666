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

//! Snapshot, merge, retain and commit of cached child maps
//!
//! Every scope keeps its children in an [`ArcSwap`] holding an immutable map.
//! Synchronization reads the live keys and the current map without locks,
//! builds a new map reusing children whose key survived, and commits it with
//! a compare-and-swap. A lost race simply repeats the merge against the newer
//! map.

use crate::error::Result;
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use std::sync::Arc;

/// Outcome of one synchronization
#[derive(Debug, Clone)]
pub struct SyncReport<V> {
    /// Keys built during the merge
    pub added: Vec<String>,
    /// Entries dropped because their key vanished or could not be reused
    pub removed: Vec<(String, V)>,
    /// Number of entries carried over
    pub retained: usize,
}

impl<V> SyncReport<V> {
    /// Check if the committed map differs from the previous one
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Bring `field` in line with `live_keys`.
///
/// `reuse` decides whether an existing child can be kept; `build` creates a
/// child for a key that is new or not reusable. Nothing is committed if
/// `build` fails.
pub fn synchronize<V, R, B>(
    field: &ArcSwap<IndexMap<String, V>>,
    live_keys: &[String],
    mut reuse: R,
    mut build: B,
) -> Result<SyncReport<V>>
where
    V: Clone,
    R: FnMut(&str, &V) -> bool,
    B: FnMut(&str) -> Result<V>,
{
    loop {
        let current = field.load_full();
        let mut next = IndexMap::with_capacity(live_keys.len());
        let mut added = Vec::new();
        let mut retained = 0;

        for key in live_keys {
            match current.get(key) {
                Some(existing) if reuse(key, existing) => {
                    next.insert(key.clone(), existing.clone());
                    retained += 1;
                }
                _ => {
                    next.insert(key.clone(), build(key)?);
                    added.push(key.clone());
                }
            }
        }

        let removed: Vec<(String, V)> = current
            .iter()
            .filter(|(key, _)| !next.contains_key(*key) || added.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let previous = field.compare_and_swap(&current, Arc::new(next));
        if Arc::ptr_eq(&previous, &current) {
            return Ok(SyncReport {
                added,
                removed,
                retained,
            });
        }
    }
}
