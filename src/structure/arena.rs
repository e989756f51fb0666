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

//! Generational arena owning the structures of one context
//!
//! Scopes refer to feature structures by [`Handle`]. A handle goes stale when
//! its slot is freed or the arena is torn down, and every lookup checks for
//! that instead of relying on weak references.

use crate::error::{RegistryError, Result};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Stable reference to a value in a [`StructureArena`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation the handle was issued for
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct ArenaInner<T> {
    slots: Vec<Slot<T>>,
    free: SmallVec<[u32; 8]>,
    torn_down: bool,
}

/// Arena of shared values addressed by generational handles
pub struct StructureArena<T> {
    inner: RwLock<ArenaInner<T>>,
}

impl<T> fmt::Debug for StructureArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("StructureArena")
            .field("slots", &inner.slots.len())
            .field("free", &inner.free.len())
            .field("torn_down", &inner.torn_down)
            .finish()
    }
}

impl<T> Default for StructureArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StructureArena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ArenaInner {
                slots: Vec::new(),
                free: SmallVec::new(),
                torn_down: false,
            }),
        }
    }

    /// Store a value and return its handle
    pub fn insert(&self, value: Arc<T>) -> Result<Handle<T>> {
        let mut inner = self.inner.write();
        if inner.torn_down {
            return Err(RegistryError::state("arena has been torn down"));
        }
        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (inner.slots.len() - 1) as u32
            }
        };
        let slot = &mut inner.slots[index as usize];
        slot.value = Some(value);
        Ok(Handle {
            index,
            generation: slot.generation,
            _marker: PhantomData,
        })
    }

    /// Resolve a handle
    pub fn get(&self, handle: Handle<T>) -> Result<Arc<T>> {
        let inner = self.inner.read();
        inner
            .slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.clone())
            .ok_or_else(|| RegistryError::state(format!("stale handle {handle:?}")))
    }

    /// Check if a handle still resolves
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_ok()
    }

    /// Free a slot. The handle, and every copy of it, goes stale.
    pub fn remove(&self, handle: Handle<T>) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(handle.index);
        Some(value)
    }

    /// Every live value
    pub fn values(&self) -> Vec<Arc<T>> {
        self.inner
            .read()
            .slots
            .iter()
            .filter_map(|slot| slot.value.clone())
            .collect()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .slots
            .iter()
            .filter(|slot| slot.value.is_some())
            .count()
    }

    /// Check if the arena holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the arena was torn down
    pub fn is_torn_down(&self) -> bool {
        self.inner.read().torn_down
    }

    /// Release every value and invalidate every handle. Later inserts fail.
    pub fn teardown(&self) -> Vec<Arc<T>> {
        let mut inner = self.inner.write();
        inner.torn_down = true;
        inner.free.clear();
        inner
            .slots
            .iter_mut()
            .filter_map(|slot| {
                slot.generation = slot.generation.wrapping_add(1);
                slot.value.take()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_get_remove() {
        let arena = StructureArena::new();
        let a = arena.insert(Arc::new("a")).unwrap();
        let b = arena.insert(Arc::new("b")).unwrap();
        assert_eq!(*arena.get(a).unwrap(), "a");
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(a).map(|v| *v), Some("a"));
        assert!(arena.get(a).unwrap_err().is_state());
        assert!(arena.remove(a).is_none());

        // Slot reuse must not revive the old handle
        let c = arena.insert(Arc::new("c")).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(!arena.contains(a));
        assert_eq!(*arena.get(b).unwrap(), "b");
    }

    #[test]
    fn test_teardown_invalidates_handles() {
        let arena = StructureArena::new();
        let a = arena.insert(Arc::new(1)).unwrap();
        let released = arena.teardown();
        assert_eq!(released.len(), 1);
        assert!(arena.get(a).is_err());
        assert!(arena.is_empty());
        assert!(arena.insert(Arc::new(2)).unwrap_err().is_state());
    }
}
