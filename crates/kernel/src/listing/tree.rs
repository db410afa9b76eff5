//! Entity trees and level projections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{ColumnPath, FlatRow};

/// One node of a fetched entity tree.
///
/// Every level has the same shape: the node's own attributes plus its
/// single child collection, in declared order. Leaf nodes have no children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub children: Vec<EntityNode>,
}

impl EntityNode {
    /// Build a node from a JSON object. Non-object values give an empty node.
    pub fn from_json(attributes: Value) -> Self {
        let attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            attributes,
            children: Vec::new(),
        }
    }

    /// Replace the child collection.
    pub fn with_children(mut self, children: Vec<EntityNode>) -> Self {
        self.children = children;
        self
    }

    /// Attribute value, `None` when absent.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Attribute as text, `None` for null or absent values.
    pub fn text(&self, attribute: &str) -> Option<String> {
        self.get(attribute).and_then(value_to_text)
    }
}

/// Text form of a scalar JSON value. `None` for null so that null never
/// matches a text predicate.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Copy of one node attribute into a row field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProjection {
    pub attribute: String,
    pub row_field: String,
}

/// One level of a listing's nesting: its name and the attributes it
/// contributes to every row derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldProjection>,
}

impl LevelSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Project `attribute` into the row under the same name.
    pub fn field(self, attribute: &str) -> Self {
        self.field_as(attribute, attribute)
    }

    /// Project `attribute` into the row as `row_field`.
    pub fn field_as(mut self, attribute: &str, row_field: &str) -> Self {
        self.fields.push(FieldProjection {
            attribute: attribute.to_string(),
            row_field: row_field.to_string(),
        });
        self
    }

    /// Write this level's fields for `node` into `row`. Missing attributes
    /// become null; a field already set by an ancestor is overwritten.
    /// Dotted attributes (`account.name`) read embedded to-one relations.
    pub fn project(&self, node: &EntityNode, row: &mut FlatRow) {
        for projection in &self.fields {
            let value = ColumnPath::parse(&projection.attribute)
                .lookup(&node.attributes)
                .cloned()
                .unwrap_or(Value::Null);
            row.insert(projection.row_field.clone(), value);
        }
    }
}
