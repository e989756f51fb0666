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

use crate::error::{RegistryError, Result};
use crate::model::{LiveObject, TreeCursor};
use log::trace;
use std::fmt;
use std::sync::Arc;

/// Test applied to each visited object
pub type NodeTest = Box<dyn FnMut(&LiveObject) -> bool + Send>;

/// Lazy iterator yielding matching objects of a tree walk.
///
/// At most one match is buffered ahead. Subtrees of objects accepted by the
/// prune test are skipped; the pruned object itself may still match.
pub struct PruningTreeIterator<C: TreeCursor> {
    cursor: Option<C>,
    matches: NodeTest,
    prune: NodeTest,
    next: Option<Arc<LiveObject>>,
    visited: usize,
}

impl<C: TreeCursor> PruningTreeIterator<C> {
    /// Create an iterator over a cursor
    pub fn new(cursor: C, matches: NodeTest, prune: NodeTest) -> Self {
        Self {
            cursor: Some(cursor),
            matches,
            prune,
            next: None,
            visited: 0,
        }
    }

    /// Next match without consuming it
    pub fn peek(&mut self) -> Option<&Arc<LiveObject>> {
        if self.next.is_none() {
            self.next = self.advance();
        }
        self.next.as_ref()
    }

    fn advance(&mut self) -> Option<Arc<LiveObject>> {
        let cursor = self.cursor.as_mut()?;
        while let Some(object) = cursor.advance() {
            self.visited += 1;
            if (self.prune)(&object) {
                trace!("pruning subtree of {}", object.class().name);
                cursor.prune();
            }
            if (self.matches)(&object) {
                return Some(object);
            }
        }
        None
    }

    /// Check for another match. Repeated calls do not advance.
    pub fn has_next(&mut self) -> bool {
        self.peek().is_some()
    }

    /// Consume the next match
    pub fn next_match(&mut self) -> Result<Arc<LiveObject>> {
        self.peek();
        self.next.take().ok_or(RegistryError::NoSuchElement)
    }

    /// Removal is not supported
    pub fn remove(&mut self) -> Result<()> {
        Err(RegistryError::unsupported("remove"))
    }

    /// Release the cursor. Safe to call more than once.
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            trace!("closed tree iterator after {} objects", self.visited);
        }
        self.next = None;
    }

    /// Check if the iterator was closed
    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Number of objects visited so far
    pub fn visited(&self) -> usize {
        self.visited
    }
}

impl<C: TreeCursor> Iterator for PruningTreeIterator<C> {
    type Item = Arc<LiveObject>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_match().ok()
    }
}

impl<C: TreeCursor> fmt::Debug for PruningTreeIterator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PruningTreeIterator")
            .field("closed", &self.is_closed())
            .field("buffered", &self.next.is_some())
            .field("visited", &self.visited)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DepthFirstCursor, LiveClass, ValueType};
    use pretty_assertions::assert_eq;

    fn tree() -> Vec<Arc<LiveObject>> {
        let node = Arc::new(
            LiveClass::builder("Node", 0)
                .attribute("label", ValueType::Text)
                .contains("children", "Node")
                .build(),
        );
        let make = |label: &str| LiveObject::with_values(node.clone(), [("label", label)]).unwrap();
        let a = make("a");
        let b = make("b");
        let c = make("c");
        let d = make("d");
        b.add_child("children", c).unwrap();
        a.add_child("children", b).unwrap();
        a.add_child("children", d).unwrap();
        vec![a]
    }

    fn label(object: &LiveObject) -> String {
        object.get("label").map(|v| v.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_yields_all_in_pre_order() {
        let iter = PruningTreeIterator::new(
            DepthFirstCursor::new(tree()),
            Box::new(|_: &LiveObject| true),
            Box::new(|_: &LiveObject| false),
        );
        let labels: Vec<_> = iter.map(|o| label(&o)).collect();
        assert_eq!(labels, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_prune_skips_descendants() {
        let mut iter = PruningTreeIterator::new(
            DepthFirstCursor::new(tree()),
            Box::new(|_: &LiveObject| true),
            Box::new(|o: &LiveObject| label(o) == "b"),
        );
        let mut labels = Vec::new();
        while iter.has_next() {
            labels.push(label(&iter.next_match().unwrap()));
        }
        assert_eq!(labels, vec!["a", "b", "d"]);
        assert_eq!(iter.visited(), 3);
    }

    #[test]
    fn test_has_next_is_idempotent() {
        let mut iter = PruningTreeIterator::new(
            DepthFirstCursor::new(tree()),
            Box::new(|o: &LiveObject| label(o) == "c"),
            Box::new(|_: &LiveObject| false),
        );
        assert!(iter.has_next());
        assert!(iter.has_next());
        assert_eq!(label(iter.peek().unwrap()), "c");
        assert_eq!(label(&iter.next_match().unwrap()), "c");
        assert!(!iter.has_next());
        assert!(matches!(iter.next_match(), Err(RegistryError::NoSuchElement)));
    }

    #[test]
    fn test_remove_and_close() {
        let mut iter = PruningTreeIterator::new(
            DepthFirstCursor::new(tree()),
            Box::new(|_: &LiveObject| true),
            Box::new(|_: &LiveObject| false),
        );
        assert!(matches!(iter.remove(), Err(RegistryError::Unsupported { .. })));
        iter.close();
        iter.close();
        assert!(iter.is_closed());
        assert!(!iter.has_next());
    }
}
