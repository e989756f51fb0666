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

use super::encoder::FilterEncoder;
use super::filter::Filter;
use super::iterator::{NodeTest, PruningTreeIterator};
use super::predicate::Predicate;
use crate::error::Result;
use crate::model::{LiveObject, TreeCursor};
use crate::structure::{FeatureStructure, StructureNode};
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Compiles filters over a feature structure into executable queries
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryCompiler;

impl QueryCompiler {
    /// Create a compiler
    pub fn new() -> Self {
        Self
    }

    /// Compile `filter` into a query over the objects produced by `cursor`.
    ///
    /// Only instances of the structure's class can match. Fails with an
    /// encoding error if the filter has no native counterpart.
    pub fn compile<C: TreeCursor>(
        &self,
        structure: &Arc<FeatureStructure>,
        cursor: C,
        filter: &Filter,
    ) -> Result<Query<C>> {
        structure.verify(false)?;
        let encoded = FilterEncoder::new(structure).encode(filter)?;
        let predicate = Predicate::and([
            Predicate::InstanceOf(structure.class_name().to_string()),
            encoded,
        ]);
        debug!("compiled {filter} over {}", structure.class_name());
        Ok(Query {
            structure: structure.clone(),
            cursor,
            predicate: Arc::new(predicate),
            prune: None,
        })
    }
}

/// Compiled query: a cursor, a predicate and an optional prune test
pub struct Query<C: TreeCursor> {
    structure: Arc<FeatureStructure>,
    cursor: C,
    predicate: Arc<Predicate>,
    prune: Option<NodeTest>,
}

impl<C: TreeCursor> Query<C> {
    /// Skip the subtree of every object accepted by `prune`
    pub fn with_prune(mut self, prune: impl FnMut(&LiveObject) -> bool + Send + 'static) -> Self {
        self.prune = Some(Box::new(prune));
        self
    }

    /// Structure the query was compiled against
    pub fn structure(&self) -> &Arc<FeatureStructure> {
        &self.structure
    }

    /// Compiled predicate
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Start iterating
    pub fn iterator(self) -> PruningTreeIterator<C> {
        let predicate = self.predicate;
        let prune = self.prune.unwrap_or_else(|| Box::new(|_: &LiveObject| false));
        PruningTreeIterator::new(
            self.cursor,
            Box::new(move |object: &LiveObject| predicate.matches(object)),
            prune,
        )
    }
}

impl<C: TreeCursor> IntoIterator for Query<C> {
    type Item = Arc<LiveObject>;
    type IntoIter = PruningTreeIterator<C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iterator()
    }
}

impl<C: TreeCursor> fmt::Debug for Query<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("class", &self.structure.class_name())
            .field("predicate", &self.predicate)
            .field("pruned", &self.prune.is_some())
            .finish()
    }
}
