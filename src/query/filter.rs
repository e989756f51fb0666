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

//! Portable filter expressions
//!
//! Filters are plain data and round-trip through JSON:
//!
//! ```json
//! {"op": "and", "filters": [
//!     {"op": "compare", "operator": "equal",
//!      "left": {"kind": "property", "name": "name"},
//!      "right": {"kind": "literal", "value": "Main St"}},
//!     {"op": "bbox", "envelope": {"min_x": 0, "min_y": 0, "max_x": 10, "max_y": 10}}
//! ]}
//! ```

use crate::error::Result;
use crate::model::{Envelope, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Binary comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl ComparisonOp {
    /// Operator to use when the operands are swapped
    pub fn reversed(self) -> Self {
        match self {
            ComparisonOp::Less => ComparisonOp::Greater,
            ComparisonOp::LessOrEqual => ComparisonOp::GreaterOrEqual,
            ComparisonOp::Greater => ComparisonOp::Less,
            ComparisonOp::GreaterOrEqual => ComparisonOp::LessOrEqual,
            op => op,
        }
    }

    /// Check an ordering against this operator
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::Less => ordering == Ordering::Less,
            ComparisonOp::LessOrEqual => ordering != Ordering::Greater,
            ComparisonOp::Greater => ordering == Ordering::Greater,
            ComparisonOp::GreaterOrEqual => ordering != Ordering::Less,
        }
    }

    /// Conventional filter node name
    pub fn node_name(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "PropertyIsEqualTo",
            ComparisonOp::NotEqual => "PropertyIsNotEqualTo",
            ComparisonOp::Less => "PropertyIsLessThan",
            ComparisonOp::LessOrEqual => "PropertyIsLessThanOrEqualTo",
            ComparisonOp::Greater => "PropertyIsGreaterThan",
            ComparisonOp::GreaterOrEqual => "PropertyIsGreaterThanOrEqualTo",
        }
    }
}

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

/// Spatial operator other than BBOX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialOp {
    /// Geometries share no point
    Disjoint,
    /// Geometries touch at their boundaries
    Touches,
    /// First geometry lies within the second
    Within,
    /// First geometry contains the second
    Contains,
    /// Interiors overlap
    Overlaps,
    /// Geometries cross
    Crosses,
    /// Geometries are equal
    Equals,
    /// Within a distance
    DWithin,
    /// Beyond a distance
    Beyond,
}

/// Temporal operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalOp {
    /// Strictly after
    After,
    /// Strictly before
    Before,
    /// Inside a period
    During,
    /// Equal instants
    TEquals,
}

/// Operand of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// Attribute of the filtered object
    Property {
        /// Attribute name
        name: String,
    },
    /// Constant value
    Literal {
        /// The value
        value: Value,
    },
    /// Function call
    Function {
        /// Function name
        name: String,
        /// Arguments
        #[serde(default)]
        args: Vec<Expression>,
    },
    /// Arithmetic on two operands
    Arithmetic {
        /// Operator
        operator: ArithmeticOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
}

impl Expression {
    /// Property reference
    pub fn property(name: impl Into<String>) -> Self {
        Expression::Property { name: name.into() }
    }

    /// Literal value
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal {
            value: value.into(),
        }
    }

    /// Expression kind, for messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expression::Property { .. } => "property",
            Expression::Literal { .. } => "literal",
            Expression::Function { .. } => "function",
            Expression::Arithmetic { .. } => "arithmetic",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_wildcard() -> char {
    '*'
}

fn default_single_char() -> char {
    '?'
}

fn default_escape() -> char {
    '\\'
}

/// Portable filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Matches everything
    Include,
    /// Matches nothing
    Exclude,
    /// All children match
    And {
        /// Children
        filters: Vec<Filter>,
    },
    /// Any child matches
    Or {
        /// Children
        filters: Vec<Filter>,
    },
    /// Child does not match
    Not {
        /// Child
        filter: Box<Filter>,
    },
    /// Binary comparison
    Compare {
        /// Operator
        operator: ComparisonOp,
        /// Left operand
        left: Expression,
        /// Right operand
        right: Expression,
        /// Case-sensitive text comparison
        #[serde(default = "default_true")]
        match_case: bool,
    },
    /// Inclusive range test
    Between {
        /// Tested operand
        expression: Expression,
        /// Lower bound
        lower: Expression,
        /// Upper bound
        upper: Expression,
    },
    /// Text pattern match
    Like {
        /// Tested operand
        expression: Expression,
        /// Pattern
        pattern: String,
        /// Matches any run of characters
        #[serde(default = "default_wildcard")]
        wildcard: char,
        /// Matches exactly one character
        #[serde(default = "default_single_char")]
        single_char: char,
        /// Makes the next pattern character literal
        #[serde(default = "default_escape")]
        escape: char,
        /// Case-sensitive match
        #[serde(default = "default_true")]
        match_case: bool,
    },
    /// Operand is null
    IsNull {
        /// Tested operand
        expression: Expression,
    },
    /// Object ID is one of the given values
    Id {
        /// Accepted IDs
        ids: Vec<String>,
    },
    /// Geometry envelope intersects a box
    #[serde(rename = "bbox")]
    BBox {
        /// Geometry attribute; the default geometry when omitted
        #[serde(default)]
        property: Option<String>,
        /// Query box
        envelope: Envelope,
    },
    /// Other spatial relation
    Spatial {
        /// Operator
        operator: SpatialOp,
        /// Geometry attribute
        property: String,
        /// Reference geometry
        geometry: Envelope,
    },
    /// Temporal relation
    Temporal {
        /// Operator
        operator: TemporalOp,
        /// Temporal attribute
        property: String,
        /// ISO-8601 instant or period
        instant: String,
    },
}

impl Filter {
    /// Parse a filter from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// All of the filters
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And {
            filters: filters.into_iter().collect(),
        }
    }

    /// Any of the filters
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or {
            filters: filters.into_iter().collect(),
        }
    }

    /// Negation
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// `property <op> value`
    pub fn compare(op: ComparisonOp, property: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Compare {
            operator: op,
            left: Expression::property(property),
            right: Expression::literal(value),
            match_case: true,
        }
    }

    /// `property = value`
    pub fn equal(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(ComparisonOp::Equal, property, value)
    }

    /// `lower <= property <= upper`
    pub fn between(
        property: impl Into<String>,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> Self {
        Filter::Between {
            expression: Expression::property(property),
            lower: Expression::literal(lower),
            upper: Expression::literal(upper),
        }
    }

    /// Pattern match with `*` and `?` wildcards
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            expression: Expression::property(property),
            pattern: pattern.into(),
            wildcard: default_wildcard(),
            single_char: default_single_char(),
            escape: default_escape(),
            match_case: true,
        }
    }

    /// Null test
    pub fn is_null(property: impl Into<String>) -> Self {
        Filter::IsNull {
            expression: Expression::property(property),
        }
    }

    /// ID membership
    pub fn id(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Filter::Id {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Envelope intersection on the default geometry
    pub fn bbox(envelope: Envelope) -> Self {
        Filter::BBox {
            property: None,
            envelope,
        }
    }

    /// Conventional node name, used in encoding errors
    pub fn node_name(&self) -> &'static str {
        match self {
            Filter::Include => "Include",
            Filter::Exclude => "Exclude",
            Filter::And { .. } => "And",
            Filter::Or { .. } => "Or",
            Filter::Not { .. } => "Not",
            Filter::Compare { operator, .. } => operator.node_name(),
            Filter::Between { .. } => "PropertyIsBetween",
            Filter::Like { .. } => "PropertyIsLike",
            Filter::IsNull { .. } => "PropertyIsNull",
            Filter::Id { .. } => "Id",
            Filter::BBox { .. } => "BBOX",
            Filter::Spatial { operator, .. } => match operator {
                SpatialOp::Disjoint => "Disjoint",
                SpatialOp::Touches => "Touches",
                SpatialOp::Within => "Within",
                SpatialOp::Contains => "Contains",
                SpatialOp::Overlaps => "Overlaps",
                SpatialOp::Crosses => "Crosses",
                SpatialOp::Equals => "Equals",
                SpatialOp::DWithin => "DWithin",
                SpatialOp::Beyond => "Beyond",
            },
            Filter::Temporal { operator, .. } => match operator {
                TemporalOp::After => "After",
                TemporalOp::Before => "Before",
                TemporalOp::During => "During",
                TemporalOp::TEquals => "TEquals",
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_name())
    }
}

/// Options of a [`Filter::Like`] node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOptions {
    /// Multi-character wildcard
    pub wildcard: char,
    /// Single-character wildcard
    pub single_char: char,
    /// Escape character
    pub escape: char,
    /// Case-sensitive match
    pub match_case: bool,
}

/// Visitor over filter trees
pub trait FilterVisitor: Sized {
    /// Result of visiting a node
    type Result;

    /// Visit any node
    fn visit_filter(&mut self, filter: &Filter) -> Self::Result {
        walk_filter(self, filter)
    }

    /// Visit [`Filter::Include`]
    fn visit_include(&mut self) -> Self::Result;

    /// Visit [`Filter::Exclude`]
    fn visit_exclude(&mut self) -> Self::Result;

    /// Visit [`Filter::And`]
    fn visit_and(&mut self, filters: &[Filter]) -> Self::Result;

    /// Visit [`Filter::Or`]
    fn visit_or(&mut self, filters: &[Filter]) -> Self::Result;

    /// Visit [`Filter::Not`]
    fn visit_not(&mut self, filter: &Filter) -> Self::Result;

    /// Visit [`Filter::Compare`]
    fn visit_compare(
        &mut self,
        node: &Filter,
        op: ComparisonOp,
        left: &Expression,
        right: &Expression,
        match_case: bool,
    ) -> Self::Result;

    /// Visit [`Filter::Between`]
    fn visit_between(
        &mut self,
        node: &Filter,
        expression: &Expression,
        lower: &Expression,
        upper: &Expression,
    ) -> Self::Result;

    /// Visit [`Filter::Like`]
    fn visit_like(
        &mut self,
        node: &Filter,
        expression: &Expression,
        pattern: &str,
        options: LikeOptions,
    ) -> Self::Result;

    /// Visit [`Filter::IsNull`]
    fn visit_is_null(&mut self, node: &Filter, expression: &Expression) -> Self::Result;

    /// Visit [`Filter::Id`]
    fn visit_id(&mut self, node: &Filter, ids: &[String]) -> Self::Result;

    /// Visit [`Filter::BBox`]
    fn visit_bbox(
        &mut self,
        node: &Filter,
        property: Option<&str>,
        envelope: &Envelope,
    ) -> Self::Result;

    /// Visit [`Filter::Spatial`]
    fn visit_spatial(&mut self, node: &Filter, op: SpatialOp, property: &str) -> Self::Result;

    /// Visit [`Filter::Temporal`]
    fn visit_temporal(&mut self, node: &Filter, op: TemporalOp, property: &str) -> Self::Result;
}

/// Dispatch a filter node to the matching visitor method
pub fn walk_filter<V: FilterVisitor>(visitor: &mut V, filter: &Filter) -> V::Result {
    match filter {
        Filter::Include => visitor.visit_include(),
        Filter::Exclude => visitor.visit_exclude(),
        Filter::And { filters } => visitor.visit_and(filters),
        Filter::Or { filters } => visitor.visit_or(filters),
        Filter::Not { filter: inner } => visitor.visit_not(inner),
        Filter::Compare {
            operator,
            left,
            right,
            match_case,
        } => visitor.visit_compare(filter, *operator, left, right, *match_case),
        Filter::Between {
            expression,
            lower,
            upper,
        } => visitor.visit_between(filter, expression, lower, upper),
        Filter::Like {
            expression,
            pattern,
            wildcard,
            single_char,
            escape,
            match_case,
        } => visitor.visit_like(
            filter,
            expression,
            pattern,
            LikeOptions {
                wildcard: *wildcard,
                single_char: *single_char,
                escape: *escape,
                match_case: *match_case,
            },
        ),
        Filter::IsNull { expression } => visitor.visit_is_null(filter, expression),
        Filter::Id { ids } => visitor.visit_id(filter, ids),
        Filter::BBox { property, envelope } => {
            visitor.visit_bbox(filter, property.as_deref(), envelope)
        }
        Filter::Spatial {
            operator, property, ..
        } => visitor.visit_spatial(filter, *operator, property),
        Filter::Temporal {
            operator, property, ..
        } => visitor.visit_temporal(filter, *operator, property),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_json() {
        let filter = Filter::from_json(
            r#"{"op": "and", "filters": [
                {"op": "compare", "operator": "equal",
                 "left": {"kind": "property", "name": "name"},
                 "right": {"kind": "literal", "value": "Main St"}},
                {"op": "bbox", "envelope": {"min_x": 0, "min_y": 0, "max_x": 10, "max_y": 10}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            filter,
            Filter::and([
                Filter::equal("name", "Main St"),
                Filter::bbox(Envelope::new(0.0, 0.0, 10.0, 10.0)),
            ])
        );
    }

    #[test]
    fn test_like_defaults() {
        let filter =
            Filter::from_json(r#"{"op": "like", "expression": {"kind": "property", "name": "name"}, "pattern": "Main*"}"#)
                .unwrap();
        assert_eq!(filter, Filter::like("name", "Main*"));
    }

    #[test]
    fn test_unit_variants() {
        assert_eq!(Filter::from_json(r#"{"op": "include"}"#).unwrap(), Filter::Include);
        assert_eq!(Filter::Exclude.to_json().unwrap(), r#"{"op":"exclude"}"#);
        assert!(Filter::from_json(r#"{"op": "teleport"}"#).unwrap_err().is_configuration());
    }

    #[rstest]
    #[case(ComparisonOp::Less, ComparisonOp::Greater)]
    #[case(ComparisonOp::GreaterOrEqual, ComparisonOp::LessOrEqual)]
    #[case(ComparisonOp::Equal, ComparisonOp::Equal)]
    fn test_reversed(#[case] op: ComparisonOp, #[case] expected: ComparisonOp) {
        assert_eq!(op.reversed(), expected);
    }

    #[test]
    fn test_node_names() {
        assert_eq!(Filter::equal("a", 1i64).node_name(), "PropertyIsEqualTo");
        assert_eq!(Filter::bbox(Envelope::point(0.0, 0.0)).node_name(), "BBOX");
        assert_eq!(Filter::negate(Filter::Include).to_string(), "Not");
    }

    struct Counter(usize);

    impl FilterVisitor for Counter {
        type Result = ();

        fn visit_include(&mut self) {
            self.0 += 1;
        }
        fn visit_exclude(&mut self) {
            self.0 += 1;
        }
        fn visit_and(&mut self, filters: &[Filter]) {
            self.0 += 1;
            filters.iter().for_each(|f| self.visit_filter(f));
        }
        fn visit_or(&mut self, filters: &[Filter]) {
            self.visit_and(filters);
        }
        fn visit_not(&mut self, filter: &Filter) {
            self.0 += 1;
            self.visit_filter(filter);
        }
        fn visit_compare(&mut self, _: &Filter, _: ComparisonOp, _: &Expression, _: &Expression, _: bool) {
            self.0 += 1;
        }
        fn visit_between(&mut self, _: &Filter, _: &Expression, _: &Expression, _: &Expression) {
            self.0 += 1;
        }
        fn visit_like(&mut self, _: &Filter, _: &Expression, _: &str, _: LikeOptions) {
            self.0 += 1;
        }
        fn visit_is_null(&mut self, _: &Filter, _: &Expression) {
            self.0 += 1;
        }
        fn visit_id(&mut self, _: &Filter, _: &[String]) {
            self.0 += 1;
        }
        fn visit_bbox(&mut self, _: &Filter, _: Option<&str>, _: &Envelope) {
            self.0 += 1;
        }
        fn visit_spatial(&mut self, _: &Filter, _: SpatialOp, _: &str) {
            self.0 += 1;
        }
        fn visit_temporal(&mut self, _: &Filter, _: TemporalOp, _: &str) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_walk_visits_every_node() {
        let filter = Filter::or([
            Filter::negate(Filter::is_null("name")),
            Filter::and([Filter::Include, Filter::id(["R1"])]),
        ]);
        let mut counter = Counter(0);
        counter.visit_filter(&filter);
        assert_eq!(counter.0, 6);
    }
}
