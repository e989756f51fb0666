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

//! Lazy tree cursors over live objects

use super::object::LiveObject;
use std::sync::Arc;

/// Forward-only depth-first cursor over a tree of live objects
pub trait TreeCursor: Send {
    /// Move to the next object in pre-order
    fn advance(&mut self) -> Option<Arc<LiveObject>>;

    /// Skip the subtree of the object last returned by [`advance`](Self::advance)
    fn prune(&mut self);
}

/// Stack-based pre-order cursor.
///
/// Children of a node are read only when the cursor moves past that node, so
/// a pruned subtree is never touched.
#[derive(Debug)]
pub struct DepthFirstCursor {
    stack: Vec<std::vec::IntoIter<Arc<LiveObject>>>,
    last: Option<Arc<LiveObject>>,
    prune_last: bool,
}

impl DepthFirstCursor {
    /// Create a cursor over the given roots
    pub fn new(roots: Vec<Arc<LiveObject>>) -> Self {
        Self {
            stack: vec![roots.into_iter()],
            last: None,
            prune_last: false,
        }
    }
}

impl TreeCursor for DepthFirstCursor {
    fn advance(&mut self) -> Option<Arc<LiveObject>> {
        if let Some(last) = self.last.take() {
            if !self.prune_last {
                let children = last.children();
                if !children.is_empty() {
                    self.stack.push(children.into_iter());
                }
            }
        }
        self.prune_last = false;

        while let Some(level) = self.stack.last_mut() {
            if let Some(next) = level.next() {
                self.last = Some(next.clone());
                return Some(next);
            }
            self.stack.pop();
        }
        None
    }

    fn prune(&mut self) {
        self.prune_last = true;
    }
}
