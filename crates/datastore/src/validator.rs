//! Standing validators: a schema attached to a collection and checked on every write.
use std::collections::HashMap;

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use crate::errors::*;
use crate::schema::{BsonType, SchemaNode};

/// What happens to a write which violates the validator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationAction {
    /// Reject the write.
    #[default]
    Error,
    /// Log the violations and accept the write.
    Warn,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ViolationKind {
    #[error("required field is missing")]
    Missing,

    #[error("expected {expected}, found {found}")]
    WrongType { expected: BsonType, found: BsonType },

    #[error("does not match {0:?}")]
    Pattern(String),

    #[error("is not one of the allowed values")]
    NotInEnum,

    #[error("is below the minimum of {0}")]
    BelowMinimum(f64),

    #[error("is above the maximum of {0}")]
    AboveMaximum(f64),
}

/// One failed constraint.  `path` is dotted, with array indices as segments, and empty for the document itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "document {}", self.kind)
        } else {
            write!(f, "{} {}", self.path, self.kind)
        }
    }
}

/// The persisted form of a validator, shaped like a `collMod` validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorDefinition {
    #[serde(rename = "$jsonSchema")]
    pub schema: SchemaNode,
    #[serde(rename = "validationAction", default)]
    pub action: ValidationAction,
}

type PathStack = SmallVec<[String; 8]>;

/// A schema with its patterns compiled.
#[derive(Clone, Debug)]
pub struct Validator {
    definition: ValidatorDefinition,
    patterns: HashMap<String, Regex>,
}

impl Validator {
    pub fn new(schema: SchemaNode, action: ValidationAction) -> Result<Validator> {
        Validator::from_definition(ValidatorDefinition { schema, action })
    }

    pub fn from_definition(definition: ValidatorDefinition) -> Result<Validator> {
        let mut patterns = HashMap::new();
        let mut failure = None;

        definition.schema.for_each_pattern(&mut |p| {
            if failure.is_some() || patterns.contains_key(p) {
                return;
            }

            match Regex::new(p) {
                Ok(r) => {
                    patterns.insert(p.to_string(), r);
                }
                Err(source) => {
                    failure = Some(Error::InvalidPattern {
                        pattern: p.to_string(),
                        source,
                    });
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(Validator {
            definition,
            patterns,
        })
    }

    pub fn get_schema(&self) -> &SchemaNode {
        &self.definition.schema
    }

    pub fn get_action(&self) -> ValidationAction {
        self.definition.action
    }

    pub fn get_definition(&self) -> &ValidatorDefinition {
        &self.definition
    }

    /// Check a document, returning every violation found.  An empty vec means the document is valid.
    pub fn validate(&self, document: &Value) -> Vec<Violation> {
        let mut out = vec![];
        let mut path = PathStack::new();
        self.validate_node(&self.definition.schema, document, &mut path, &mut out);
        out
    }

    fn violation(path: &PathStack, kind: ViolationKind) -> Violation {
        Violation {
            path: path.iter().join("."),
            kind,
        }
    }

    fn validate_node(
        &self,
        node: &SchemaNode,
        value: &Value,
        path: &mut PathStack,
        out: &mut Vec<Violation>,
    ) {
        // A value of the wrong type can't be meaningfully checked against anything else.
        if let Some(expected) = node.bson_type {
            if !expected.matches(value) {
                out.push(Self::violation(
                    path,
                    ViolationKind::WrongType {
                        expected,
                        found: BsonType::of(value),
                    },
                ));
                return;
            }
        }

        if let Some(allowed) = node.enumeration.as_ref() {
            if !allowed.contains(value) {
                out.push(Self::violation(path, ViolationKind::NotInEnum));
            }
        }

        if let (Some(pattern), Some(text)) = (node.pattern.as_ref(), value.as_str()) {
            let matched = self
                .patterns
                .get(pattern)
                .map(|r| r.is_match(text))
                .unwrap_or(true);
            if !matched {
                out.push(Self::violation(path, ViolationKind::Pattern(pattern.clone())));
            }
        }

        if value.is_number() {
            if let Some(n) = value.as_f64() {
                if let Some(min) = node.minimum.filter(|m| n < *m) {
                    out.push(Self::violation(path, ViolationKind::BelowMinimum(min)));
                }
                if let Some(max) = node.maximum.filter(|m| n > *m) {
                    out.push(Self::violation(path, ViolationKind::AboveMaximum(max)));
                }
            }
        }

        if BsonType::Object.matches(value) {
            if let Some(map) = value.as_object() {
                for field in node.required.iter() {
                    if !map.contains_key(field) {
                        path.push(field.clone());
                        out.push(Self::violation(path, ViolationKind::Missing));
                        path.pop();
                    }
                }

                for (name, child) in node.properties.iter() {
                    if let Some(v) = map.get(name) {
                        path.push(name.clone());
                        self.validate_node(child, v, path, out);
                        path.pop();
                    }
                }
            }
        }

        if let (Some(items), Some(elements)) = (node.items.as_deref(), value.as_array()) {
            for (i, element) in elements.iter().enumerate() {
                path.push(i.to_string());
                self.validate_node(items, element, path, out);
                path.pop();
            }
        }
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Validator) -> bool {
        self.definition == other.definition
    }
}
