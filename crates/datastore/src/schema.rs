//! Declarative document schemas.
//!
//! A [SchemaNode] is the `$jsonSchema` dialect used by document databases: each node may constrain the value's type,
//! the required keys and per-key schemas of an object, the item schema of an array, a string pattern, an enumeration,
//! and a numeric range.  Nodes are plain data and serialize to the same JSON shape, which is how validators are
//! persisted.  Evaluation lives in [crate::Validator].
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::object_id::ObjectId;

/// Types a schema node may require.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BsonType {
    ObjectId,
    String,
    /// Integer representable in 32 bits.
    Int,
    /// Integer representable in 64 bits.
    Long,
    Double,
    /// Any number.
    Number,
    Bool,
    Null,
    Array,
    Object,
}

impl BsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BsonType::ObjectId => "objectId",
            BsonType::String => "string",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Double => "double",
            BsonType::Number => "number",
            BsonType::Bool => "bool",
            BsonType::Null => "null",
            BsonType::Array => "array",
            BsonType::Object => "object",
        }
    }

    /// The most specific type of a JSON value.
    ///
    /// Extended-JSON ids classify as [BsonType::ObjectId], never as objects.
    pub fn of(value: &Value) -> BsonType {
        match value {
            Value::Null => BsonType::Null,
            Value::Bool(_) => BsonType::Bool,
            Value::String(_) => BsonType::String,
            Value::Array(_) => BsonType::Array,
            Value::Number(n) => match n.as_i64() {
                Some(i) if i32::try_from(i).is_ok() => BsonType::Int,
                Some(_) => BsonType::Long,
                None => BsonType::Double,
            },
            Value::Object(_) => {
                if ObjectId::from_extended_json(value).is_some() {
                    BsonType::ObjectId
                } else {
                    BsonType::Object
                }
            }
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        let actual = BsonType::of(value);
        match self {
            BsonType::Long => matches!(actual, BsonType::Int | BsonType::Long),
            BsonType::Number => matches!(actual, BsonType::Int | BsonType::Long | BsonType::Double),
            other => *other == actual,
        }
    }
}

impl std::fmt::Display for BsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a schema.  Unset constraints don't apply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bson_type: Option<BsonType>,

    /// Keys which must be present when the value is an object.  Presence is all that is checked: `null` counts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaNode>,

    /// Schema for every element when the value is an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,

    /// Regex which string values must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaNode {
    pub fn typed(bson_type: BsonType) -> SchemaNode {
        SchemaNode {
            bson_type: Some(bson_type),
            ..Default::default()
        }
    }

    pub fn object() -> SchemaNode {
        SchemaNode::typed(BsonType::Object)
    }

    pub fn array_of(items: SchemaNode) -> SchemaNode {
        SchemaNode {
            items: Some(Box::new(items)),
            ..SchemaNode::typed(BsonType::Array)
        }
    }

    pub fn require<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> SchemaNode {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn property(mut self, name: impl Into<String>, node: SchemaNode) -> SchemaNode {
        self.properties.insert(name.into(), node);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> SchemaNode {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn one_of<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> SchemaNode {
        self.enumeration = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> SchemaNode {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> SchemaNode {
        self.description = Some(description.into());
        self
    }

    /// Walk a dotted path through `properties`, stepping into `items` when a node is an array.
    ///
    /// Returns every node along the way, not including `self`.
    pub fn nodes_along<'a>(&'a self, path: &str) -> Vec<&'a SchemaNode> {
        let mut ret = vec![];
        let mut current = self;

        for segment in path.split('.') {
            if let Some(items) = current.items.as_deref() {
                current = items;
            }

            match current.properties.get(segment) {
                Some(n) => {
                    ret.push(n);
                    current = n;
                }
                None => break,
            }
        }

        ret
    }

    /// Visit every pattern in this node and its children.
    pub(crate) fn for_each_pattern<'a>(&'a self, callback: &mut impl FnMut(&'a str)) {
        if let Some(p) = self.pattern.as_deref() {
            callback(p);
        }

        for child in self.properties.values() {
            child.for_each_pattern(callback);
        }

        if let Some(items) = self.items.as_deref() {
            items.for_each_pattern(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_type_classification() {
        assert_eq!(BsonType::of(&json!(5)), BsonType::Int);
        assert_eq!(BsonType::of(&json!(5_000_000_000i64)), BsonType::Long);
        assert_eq!(BsonType::of(&json!(5.0)), BsonType::Double);
        assert_eq!(BsonType::of(&json!("5")), BsonType::String);
        assert_eq!(BsonType::of(&json!(null)), BsonType::Null);
        assert_eq!(BsonType::of(&json!([1])), BsonType::Array);
        assert_eq!(BsonType::of(&json!({"a": 1})), BsonType::Object);
        assert_eq!(
            BsonType::of(&json!({"$oid": "55f14312c7447c3da7051b26"})),
            BsonType::ObjectId
        );

        assert!(BsonType::Long.matches(&json!(1)));
        assert!(BsonType::Number.matches(&json!(1.5)));
        assert!(!BsonType::Int.matches(&json!(1.5)));
        assert!(!BsonType::Object.matches(&json!({"$oid": "55f14312c7447c3da7051b26"})));
    }

    #[test]
    fn test_serializes_like_json_schema() {
        let node = SchemaNode::object()
            .require(["rating"])
            .property("rating", SchemaNode::typed(BsonType::Int).range(0.0, 6.0))
            .property(
                "tags",
                SchemaNode::array_of(SchemaNode::typed(BsonType::String).one_of(["a", "b"])),
            );

        let expected = json!({
            "bsonType": "object",
            "required": ["rating"],
            "properties": {
                "rating": {"bsonType": "int", "minimum": 0.0, "maximum": 6.0},
                "tags": {"bsonType": "array", "items": {"bsonType": "string", "enum": ["a", "b"]}},
            },
        });
        assert_eq!(serde_json::to_value(&node).unwrap(), expected);

        let back: SchemaNode = serde_json::from_value(expected).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_nodes_along_steps_into_items() {
        let node = SchemaNode::object().property(
            "inspections",
            SchemaNode::array_of(
                SchemaNode::object().property("result", SchemaNode::typed(BsonType::String)),
            ),
        );

        let along = node.nodes_along("inspections.result");
        assert_eq!(along.len(), 2);
        assert_eq!(along[0].bson_type, Some(BsonType::Array));
        assert_eq!(along[1].bson_type, Some(BsonType::String));
        assert_eq!(node.nodes_along("missing.path").len(), 0);
    }
}
