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

//! Structural metadata registry for record-like types of a live object model
//!
//! The registry discovers the classes of an external object model, describes
//! them as feature structures, validates and caches those descriptions per
//! context, and compiles portable filters into predicates evaluated over
//! lazily traversed object trees.
//!
//! ```rust
//! use feature_registry::{ContextRegistry, RegistryConfig};
//! use feature_registry::model::{LiveClass, LiveDomain, LivePackage, MemoryModel, ValueType};
//! use std::sync::Arc;
//!
//! let model = MemoryModel::new();
//! model.insert_domain(LiveDomain::new("main").with_package(
//!     LivePackage::new("urn:roads", "roads").with_class(
//!         LiveClass::builder("Road", 0)
//!             .id("id")
//!             .attribute("name", ValueType::Text)
//!             .geometry("geom")
//!             .build(),
//!     ),
//! ));
//!
//! let registry = ContextRegistry::new(RegistryConfig::default());
//! let context = registry.create_context("main", Arc::new(model)).unwrap();
//! let structure = registry.structure(context.id()).unwrap();
//! let road = structure.feature("urn:roads", "roads", "Road").unwrap().unwrap();
//! assert_eq!(road.geometries().unwrap().len(), 1);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod crs;
pub mod error;
pub mod id_factory;
pub mod model;
pub mod query;
pub mod status;
pub mod structure;

pub use config::{IdentityMode, RegistryConfig, StructureHints};
pub use context::{Context, ContextId, ContextRegistry};
pub use error::{RegistryError, Result};
pub use id_factory::IdFactory;
pub use query::{Filter, FilterEncoder, PruningTreeIterator, Query, QueryCompiler};
pub use status::{Status, StatusKind};
pub use structure::{ContextStructure, FeatureStructure, StructureNode};
