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

//! Structure nodes describing the live model
//!
//! Context, domain, package and folder scopes form a tree of cached
//! descriptions. Folders hold feature structures, which in turn own their
//! attribute and geometry structures.

mod arena;
mod attribute;
mod cache;
mod feature;
mod feature_type;
mod node;
mod scope;
mod sync;

pub use arena::{Handle, StructureArena};
pub use attribute::{AttributeStructure, GeometryStructure};
pub use cache::{CacheAction, CacheKey, StructureCache, Voter};
pub use feature::{FeatureReference, FeatureSource, FeatureStructure, shape_checksum};
pub use feature_type::{AttributeDescriptor, FeatureRecord, FeatureType, RecordHints};
pub use node::{
    ChangeEvent, ChangeProperty, Lifecycle, Listener, ListenerId, NodeState, StructureKind,
    StructureNode,
};
pub use scope::{AdaptMode, ContextStructure, DomainStructure, FolderStructure, PackageStructure};
pub use sync::{SyncReport, synchronize};
