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

//! Live object model consumed by the registry
//!
//! The registry never owns the live model. Structures describe it, and hold
//! only weak references into it, so the provider is free to replace classes
//! and packages at any time.

pub mod object;
pub mod provider;
pub mod schema;
pub mod tree;

pub use object::{ContainerRef, Envelope, LiveObject, ObjectKey, Resource, Value};
pub use provider::{MemoryModel, ModelProvider};
pub use schema::{
    LiveAttribute, LiveClass, LiveClassBuilder, LiveDomain, LiveFolder, LivePackage, LiveRelation,
    ValueType,
};
pub use tree::{DepthFirstCursor, TreeCursor};
