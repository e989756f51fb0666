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

//! Filter to predicate encoding
//!
//! The encoder lowers a [`Filter`] into a [`Predicate`] bound to one feature
//! structure. Property names are checked against the structure's members,
//! and nodes without a native counterpart fail with an encoding error naming
//! the node.

use super::filter::{
    ComparisonOp, Expression, Filter, FilterVisitor, LikeOptions, SpatialOp, TemporalOp,
};
use super::predicate::{Predicate, like_regex};
use crate::error::{RegistryError, Result};
use crate::model::{Envelope, Value};
use crate::structure::FeatureStructure;
use log::warn;

/// Encoder of filters into native predicates
#[derive(Debug, Clone, Copy)]
pub struct FilterEncoder<'a> {
    structure: &'a FeatureStructure,
}

impl<'a> FilterEncoder<'a> {
    /// Create an encoder for a structure
    pub fn new(structure: &'a FeatureStructure) -> Self {
        Self { structure }
    }

    /// Encode a filter
    pub fn encode(&self, filter: &Filter) -> Result<Predicate> {
        Lowering::new(self.structure)
            .visit_filter(filter)
            .inspect_err(|err| {
                warn!(
                    "cannot encode filter for {}: {err}",
                    self.structure.class_name()
                )
            })
    }

    /// Check whether a filter can be encoded
    pub fn supports(&self, filter: &Filter) -> bool {
        Lowering::new(self.structure).visit_filter(filter).is_ok()
    }
}

struct Lowering<'a> {
    structure: &'a FeatureStructure,
}

impl<'a> Lowering<'a> {
    fn new(structure: &'a FeatureStructure) -> Self {
        Self { structure }
    }

    fn property(&self, node: &Filter, expression: &Expression) -> Result<String> {
        let Expression::Property { name } = expression else {
            return Err(unsupported_operand(node, expression));
        };
        if !self.structure.has_member(name)? {
            return Err(RegistryError::encoding(
                node.node_name(),
                format!(
                    "unknown property '{name}' of {}",
                    self.structure.class_name()
                ),
            ));
        }
        Ok(name.clone())
    }

    fn scalar_property(&self, node: &Filter, expression: &Expression) -> Result<String> {
        let name = self.property(node, expression)?;
        if self.structure.is_geometry(&name)? {
            return Err(RegistryError::encoding(
                node.node_name(),
                format!("geometry '{name}' can only be tested with BBOX"),
            ));
        }
        Ok(name)
    }

    fn literal<'e>(&self, node: &Filter, expression: &'e Expression) -> Result<&'e Value> {
        match expression {
            Expression::Literal { value } => Ok(value),
            other => Err(unsupported_operand(node, other)),
        }
    }
}

fn unsupported_operand(node: &Filter, expression: &Expression) -> RegistryError {
    RegistryError::encoding(
        node.node_name(),
        format!("{} operands are not supported", expression.kind_name()),
    )
}

impl FilterVisitor for Lowering<'_> {
    type Result = Result<Predicate>;

    fn visit_include(&mut self) -> Self::Result {
        Ok(Predicate::True)
    }

    fn visit_exclude(&mut self) -> Self::Result {
        Ok(Predicate::False)
    }

    fn visit_and(&mut self, filters: &[Filter]) -> Self::Result {
        if filters.is_empty() {
            return Err(RegistryError::encoding("And", "no operands"));
        }
        let parts = filters
            .iter()
            .map(|f| self.visit_filter(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Predicate::and(parts))
    }

    fn visit_or(&mut self, filters: &[Filter]) -> Self::Result {
        if filters.is_empty() {
            return Err(RegistryError::encoding("Or", "no operands"));
        }
        let parts = filters
            .iter()
            .map(|f| self.visit_filter(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Predicate::or(parts))
    }

    fn visit_not(&mut self, filter: &Filter) -> Self::Result {
        Ok(Predicate::not(self.visit_filter(filter)?))
    }

    fn visit_compare(
        &mut self,
        node: &Filter,
        op: ComparisonOp,
        left: &Expression,
        right: &Expression,
        match_case: bool,
    ) -> Self::Result {
        let (attribute, op, value) = match (left, right) {
            (Expression::Property { .. }, Expression::Literal { value }) => {
                (self.scalar_property(node, left)?, op, value)
            }
            (Expression::Literal { value }, Expression::Property { .. }) => {
                (self.scalar_property(node, right)?, op.reversed(), value)
            }
            (Expression::Literal { value: a }, Expression::Literal { value: b }) => {
                let holds = a.compare(b).is_some_and(|ordering| op.test(ordering));
                return Ok(if holds { Predicate::True } else { Predicate::False });
            }
            (Expression::Property { .. }, Expression::Property { .. }) => {
                return Err(RegistryError::encoding(
                    node.node_name(),
                    "comparing two properties is not supported",
                ));
            }
            (Expression::Property { .. } | Expression::Literal { .. }, other) | (other, _) => {
                return Err(unsupported_operand(node, other));
            }
        };
        Ok(Predicate::Compare {
            attribute,
            op,
            value: value.clone(),
            match_case,
        })
    }

    fn visit_between(
        &mut self,
        node: &Filter,
        expression: &Expression,
        lower: &Expression,
        upper: &Expression,
    ) -> Self::Result {
        Ok(Predicate::Between {
            attribute: self.scalar_property(node, expression)?,
            lower: self.literal(node, lower)?.clone(),
            upper: self.literal(node, upper)?.clone(),
        })
    }

    fn visit_like(
        &mut self,
        node: &Filter,
        expression: &Expression,
        pattern: &str,
        options: LikeOptions,
    ) -> Self::Result {
        Ok(Predicate::Like {
            attribute: self.scalar_property(node, expression)?,
            regex: like_regex(pattern, options)?,
        })
    }

    fn visit_is_null(&mut self, node: &Filter, expression: &Expression) -> Self::Result {
        Ok(Predicate::IsNull {
            attribute: self.property(node, expression)?,
        })
    }

    fn visit_id(&mut self, _node: &Filter, ids: &[String]) -> Self::Result {
        if ids.is_empty() {
            return Ok(Predicate::False);
        }
        Ok(Predicate::IdIn {
            attribute: self.structure.id_attribute_name().to_string(),
            ids: ids.iter().cloned().collect(),
        })
    }

    fn visit_bbox(
        &mut self,
        node: &Filter,
        property: Option<&str>,
        envelope: &Envelope,
    ) -> Self::Result {
        let attribute = match property {
            Some(name) => name.to_string(),
            None => self.structure.default_geometry_name()?.ok_or_else(|| {
                RegistryError::encoding(
                    node.node_name(),
                    format!("{} has no default geometry", self.structure.class_name()),
                )
            })?,
        };
        if !self.structure.is_geometry(&attribute)? {
            return Err(RegistryError::encoding(
                node.node_name(),
                format!("'{attribute}' is not a geometry"),
            ));
        }
        Ok(Predicate::Intersects {
            attribute,
            envelope: *envelope,
        })
    }

    fn visit_spatial(&mut self, node: &Filter, op: SpatialOp, _property: &str) -> Self::Result {
        Err(RegistryError::encoding(
            node.node_name(),
            format!("spatial operator {op:?} is not supported"),
        ))
    }

    fn visit_temporal(&mut self, node: &Filter, op: TemporalOp, _property: &str) -> Self::Result {
        Err(RegistryError::encoding(
            node.node_name(),
            format!("temporal operator {op:?} is not supported"),
        ))
    }
}
