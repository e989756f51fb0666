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

//! Native predicates evaluated against live objects

use super::filter::{ComparisonOp, LikeOptions};
use crate::error::{RegistryError, Result};
use crate::model::{Envelope, LiveObject, Value};
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// Predicate over live objects
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Always true
    True,
    /// Always false
    False,
    /// All children hold
    And(Vec<Predicate>),
    /// Any child holds
    Or(Vec<Predicate>),
    /// Child does not hold
    Not(Box<Predicate>),
    /// Object is an instance of the named class
    InstanceOf(String),
    /// Attribute compared to a constant
    Compare {
        /// Attribute name
        attribute: String,
        /// Operator, attribute on the left
        op: ComparisonOp,
        /// Constant operand
        value: Value,
        /// Case-sensitive text comparison
        match_case: bool,
    },
    /// Attribute within an inclusive range
    Between {
        /// Attribute name
        attribute: String,
        /// Lower bound
        lower: Value,
        /// Upper bound
        upper: Value,
    },
    /// Attribute text matches a compiled pattern
    Like {
        /// Attribute name
        attribute: String,
        /// Anchored pattern
        regex: Regex,
    },
    /// Attribute is null or unset
    IsNull {
        /// Attribute name
        attribute: String,
    },
    /// ID attribute is one of the given values
    IdIn {
        /// ID attribute name
        attribute: String,
        /// Accepted IDs
        ids: FxHashSet<String>,
    },
    /// Geometry envelope intersects a box
    Intersects {
        /// Geometry attribute name
        attribute: String,
        /// Query box
        envelope: Envelope,
    },
}

impl Predicate {
    /// Conjunction with trivial operands folded away
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts = Vec::new();
        for predicate in predicates {
            match predicate {
                Predicate::True => {}
                Predicate::False => return Predicate::False,
                Predicate::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Predicate::True,
            1 => parts.pop().unwrap_or(Predicate::True),
            _ => Predicate::And(parts),
        }
    }

    /// Disjunction with trivial operands folded away
    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts = Vec::new();
        for predicate in predicates {
            match predicate {
                Predicate::False => {}
                Predicate::True => return Predicate::True,
                Predicate::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Predicate::False,
            1 => parts.pop().unwrap_or(Predicate::False),
            _ => Predicate::Or(parts),
        }
    }

    /// Negation with constants folded
    pub fn not(predicate: Predicate) -> Predicate {
        match predicate {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Evaluate against an object
    pub fn matches(&self, object: &LiveObject) -> bool {
        self.evaluate(object) == Some(true)
    }

    /// Three-valued evaluation. A null or missing operand makes value tests
    /// unknown (`None`), and negating unknown stays unknown.
    pub fn evaluate(&self, object: &LiveObject) -> Option<bool> {
        match self {
            Predicate::True => Some(true),
            Predicate::False => Some(false),
            Predicate::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(object) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Predicate::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(object) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Predicate::Not(inner) => inner.evaluate(object).map(|held| !held),
            Predicate::InstanceOf(class) => Some(object.is_instance_of(class)),
            Predicate::Compare {
                attribute,
                op,
                value,
                match_case,
            } => present(object, attribute).map(|actual| {
                compare_values(&actual, value, *match_case).is_some_and(|o| op.test(o))
            }),
            Predicate::Between {
                attribute,
                lower,
                upper,
            } => present(object, attribute).map(|actual| {
                let above = actual.compare(lower).is_some_and(|o| o != Ordering::Less);
                let below = actual.compare(upper).is_some_and(|o| o != Ordering::Greater);
                above && below
            }),
            Predicate::Like { attribute, regex } => {
                present(object, attribute).map(|actual| regex.is_match(&actual.to_string()))
            }
            Predicate::IsNull { attribute } => {
                Some(object.get(attribute).is_none_or(|v| v.is_null()))
            }
            Predicate::IdIn { attribute, ids } => Some(
                object
                    .get(attribute)
                    .and_then(|v| v.as_text().map(|s| ids.contains(s)))
                    .unwrap_or(false),
            ),
            Predicate::Intersects {
                attribute,
                envelope,
            } => present(object, attribute)
                .map(|v| v.as_envelope().is_some_and(|e| e.intersects(envelope))),
        }
    }
}

fn present(object: &LiveObject, attribute: &str) -> Option<Value> {
    object.get(attribute).filter(|v| !v.is_null())
}

fn compare_values(actual: &Value, expected: &Value, match_case: bool) -> Option<Ordering> {
    match (actual, expected, match_case) {
        (Value::Text(a), Value::Text(b), false) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        _ => actual.compare(expected),
    }
}

/// Translate a like pattern into an anchored regular expression
pub fn like_regex(pattern: &str, options: LikeOptions) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 2);
    source.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == options.escape {
            match chars.next() {
                Some(literal) => source.push_str(&regex::escape(literal.encode_utf8(&mut [0; 4]))),
                None => {
                    return Err(RegistryError::encoding(
                        "PropertyIsLike",
                        format!("pattern '{pattern}' ends with an escape character"),
                    ));
                }
            }
        } else if c == options.wildcard {
            source.push_str(".*");
        } else if c == options.single_char {
            source.push('.');
        } else {
            source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        }
    }
    source.push('$');
    RegexBuilder::new(&source)
        .case_insensitive(!options.match_case)
        .dot_matches_new_line(true)
        .build()
        .map_err(|err| RegistryError::encoding("PropertyIsLike", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LiveClass, ValueType};
    use rstest::rstest;
    use std::sync::Arc;

    fn road(name: &str, lanes: i64) -> Arc<LiveObject> {
        let class = Arc::new(
            LiveClass::builder("Road", 0)
                .id("id")
                .attribute("name", ValueType::Text)
                .attribute("lanes", ValueType::Integer)
                .geometry("geom")
                .build(),
        );
        LiveObject::with_values(
            class,
            [
                ("id", Value::from("R1")),
                ("name", Value::from(name)),
                ("lanes", Value::from(lanes)),
                ("geom", Value::from(Envelope::new(0.0, 0.0, 2.0, 2.0))),
            ],
        )
        .unwrap()
    }

    fn options(match_case: bool) -> LikeOptions {
        LikeOptions {
            wildcard: '*',
            single_char: '?',
            escape: '\\',
            match_case,
        }
    }

    #[rstest]
    #[case("Main*", true, "Main St", true)]
    #[case("Main?St", true, "Main St", true)]
    #[case("main*", true, "Main St", false)]
    #[case("main*", false, "Main St", true)]
    #[case("M.in*", true, "Main St", false)]
    #[case("100\\*", true, "100*", true)]
    #[case("100\\*", true, "1000", false)]
    fn test_like_regex(
        #[case] pattern: &str,
        #[case] match_case: bool,
        #[case] input: &str,
        #[case] expected: bool,
    ) {
        let regex = like_regex(pattern, options(match_case)).unwrap();
        assert_eq!(regex.is_match(input), expected);
    }

    #[test]
    fn test_like_trailing_escape() {
        let err = like_regex("abc\\", options(true)).unwrap_err();
        assert!(err.is_encoding());
    }

    #[test]
    fn test_like_sql_wildcards() {
        let regex = like_regex(
            "Main_%",
            LikeOptions {
                wildcard: '%',
                single_char: '_',
                escape: '!',
                match_case: true,
            },
        )
        .unwrap();
        assert!(regex.is_match("Main St"));
        assert!(!regex.is_match("Main"));
    }

    #[test]
    fn test_compare_and_between() {
        let object = road("Main St", 2);
        let gt = Predicate::Compare {
            attribute: "lanes".into(),
            op: ComparisonOp::Greater,
            value: Value::Float(1.5),
            match_case: true,
        };
        assert!(gt.matches(&object));

        let between = Predicate::Between {
            attribute: "lanes".into(),
            lower: Value::Integer(2),
            upper: Value::Integer(4),
        };
        assert!(between.matches(&object));

        let insensitive = Predicate::Compare {
            attribute: "name".into(),
            op: ComparisonOp::Equal,
            value: Value::from("MAIN ST"),
            match_case: false,
        };
        assert!(insensitive.matches(&object));
    }

    #[test]
    fn test_is_null_and_missing_attribute() {
        let object = road("Main St", 2);
        object.set("name", Value::Null).unwrap();
        assert!(Predicate::IsNull { attribute: "name".into() }.matches(&object));
        assert!(Predicate::IsNull { attribute: "nope".into() }.matches(&object));
        let eq = Predicate::Compare {
            attribute: "name".into(),
            op: ComparisonOp::NotEqual,
            value: Value::from("x"),
            match_case: true,
        };
        assert!(!eq.matches(&object));
    }

    #[test]
    fn test_negated_comparison_on_null_is_unknown() {
        let object = road("Main St", 2);
        object.set("lanes", Value::Null).unwrap();
        let wide = Predicate::Compare {
            attribute: "lanes".into(),
            op: ComparisonOp::Greater,
            value: Value::Integer(2),
            match_case: true,
        };
        assert_eq!(wide.evaluate(&object), None);
        assert!(!wide.matches(&object));
        assert!(!Predicate::not(wide.clone()).matches(&object));

        // Unknown only decides nothing
        let named = Predicate::IsNull { attribute: "name".into() };
        let has_name = Predicate::not(named);
        assert!(!Predicate::and([Predicate::not(wide.clone()), has_name.clone()]).matches(&object));
        assert!(Predicate::or([Predicate::not(wide.clone()), has_name]).matches(&object));

        object.set("lanes", Value::Integer(1)).unwrap();
        assert!(Predicate::not(wide).matches(&object));
    }

    #[test]
    fn test_folding() {
        assert!(matches!(Predicate::and([Predicate::True, Predicate::True]), Predicate::True));
        assert!(matches!(
            Predicate::and([Predicate::InstanceOf("Road".into()), Predicate::False]),
            Predicate::False
        ));
        assert!(matches!(
            Predicate::or([Predicate::False, Predicate::InstanceOf("Road".into())]),
            Predicate::InstanceOf(_)
        ));
        assert!(matches!(Predicate::not(Predicate::True), Predicate::False));
    }

    #[test]
    fn test_intersects_and_id() {
        let object = road("Main St", 2);
        let hit = Predicate::Intersects {
            attribute: "geom".into(),
            envelope: Envelope::new(1.0, 1.0, 5.0, 5.0),
        };
        let miss = Predicate::Intersects {
            attribute: "geom".into(),
            envelope: Envelope::new(3.0, 3.0, 5.0, 5.0),
        };
        assert!(hit.matches(&object));
        assert!(!miss.matches(&object));

        let ids = Predicate::IdIn {
            attribute: "id".into(),
            ids: ["R1".to_string()].into_iter().collect(),
        };
        assert!(ids.matches(&object));
    }
}
