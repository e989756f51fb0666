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

//! Filters, their native encoding and lazy tree queries

mod compiler;
mod encoder;
pub mod filter;
mod iterator;
mod predicate;

pub use compiler::{Query, QueryCompiler};
pub use encoder::FilterEncoder;
pub use filter::{
    ArithmeticOp, ComparisonOp, Expression, Filter, FilterVisitor, LikeOptions, SpatialOp,
    TemporalOp, walk_filter,
};
pub use iterator::{NodeTest, PruningTreeIterator};
pub use predicate::{Predicate, like_regex};
