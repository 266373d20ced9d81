// src/services/body.rs
//! Body schema trees and the two transforms built on them.
//!
//! A [`BodyNode`] tree describes the shape of a JSON value. At most one
//! primitive in a tree is the carrier: the slot that receives the user's
//! message when a request is materialized, and the slot read back when a
//! bot reply is extracted from a response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: BodyNode,
}

impl Property {
    pub fn new(key: impl Into<String>, value: BodyNode) -> Self {
        Self { key: key.into(), value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyNode {
    Primitive {
        id: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        is_carrier: bool,
    },
    Array {
        id: String,
        #[serde(default)]
        items: Vec<BodyNode>,
    },
    Object {
        id: String,
        #[serde(default)]
        properties: Vec<Property>,
    },
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for BodyNode {
    fn default() -> Self {
        Self::empty_object()
    }
}

impl BodyNode {
    /// Literal primitive.
    pub fn primitive(value: impl Into<String>) -> Self {
        BodyNode::Primitive { id: new_id(), value: value.into(), is_carrier: false }
    }

    /// Primitive flagged as the message carrier.
    pub fn carrier() -> Self {
        BodyNode::Primitive { id: new_id(), value: String::new(), is_carrier: true }
    }

    pub fn array(items: Vec<BodyNode>) -> Self {
        BodyNode::Array { id: new_id(), items }
    }

    pub fn object(properties: Vec<Property>) -> Self {
        BodyNode::Object { id: new_id(), properties }
    }

    /// The schema every new session starts with.
    pub fn empty_object() -> Self {
        Self::object(Vec::new())
    }

    pub fn id(&self) -> &str {
        match self {
            BodyNode::Primitive { id, .. } | BodyNode::Array { id, .. } | BodyNode::Object { id, .. } => id,
        }
    }

    pub fn is_carrier(&self) -> bool {
        matches!(self, BodyNode::Primitive { is_carrier: true, .. })
    }

    /// Rewrites the whole tree so that only the primitive with `target_id`
    /// is the carrier. An id that is not in the tree clears every carrier.
    pub fn set_carrier(&self, target_id: &str) -> BodyNode {
        self.map_primitives(&mut |id, _| id == target_id)
    }

    /// Keeps the first carrier in depth-first order and clears any others.
    pub fn normalize_carrier(&self) -> BodyNode {
        match self.carrier_id() {
            Some(id) => {
                let id = id.to_string();
                self.set_carrier(&id)
            }
            None => self.clone(),
        }
    }

    fn map_primitives(&self, flag: &mut impl FnMut(&str, bool) -> bool) -> BodyNode {
        match self {
            BodyNode::Primitive { id, value, is_carrier } => BodyNode::Primitive {
                id: id.clone(),
                value: value.clone(),
                is_carrier: flag(id, *is_carrier),
            },
            BodyNode::Array { id, items } => BodyNode::Array {
                id: id.clone(),
                items: items.iter().map(|item| item.map_primitives(flag)).collect(),
            },
            BodyNode::Object { id, properties } => BodyNode::Object {
                id: id.clone(),
                properties: properties
                    .iter()
                    .map(|p| Property { key: p.key.clone(), value: p.value.map_primitives(flag) })
                    .collect(),
            },
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = &BodyNode> + '_> {
        match self {
            BodyNode::Primitive { .. } => Box::new(std::iter::empty()),
            BodyNode::Array { items, .. } => Box::new(items.iter()),
            BodyNode::Object { properties, .. } => Box::new(properties.iter().map(|p| &p.value)),
        }
    }

    pub fn find(&self, target_id: &str) -> Option<&BodyNode> {
        if self.id() == target_id {
            return Some(self);
        }
        self.children().find_map(|child| child.find(target_id))
    }

    /// Id of the first carrier primitive, depth first.
    pub fn carrier_id(&self) -> Option<&str> {
        if self.is_carrier() {
            return Some(self.id());
        }
        self.children().find_map(|child| child.carrier_id())
    }

    pub fn carrier_count(&self) -> usize {
        usize::from(self.is_carrier()) + self.children().map(BodyNode::carrier_count).sum::<usize>()
    }

    pub fn node_count(&self) -> usize {
        1 + self.children().map(BodyNode::node_count).sum::<usize>()
    }

    /// Builds the concrete JSON payload for `message`.
    ///
    /// Literal primitives pass through as strings, untouched. Duplicate
    /// object keys resolve to the last property with that key.
    pub fn materialize(&self, message: &str) -> Value {
        match self {
            BodyNode::Primitive { is_carrier: true, .. } => Value::String(message.to_string()),
            BodyNode::Primitive { value, .. } => Value::String(value.clone()),
            BodyNode::Array { items, .. } => {
                Value::Array(items.iter().map(|item| item.materialize(message)).collect())
            }
            BodyNode::Object { properties, .. } => {
                let mut obj = Map::new();
                for p in properties {
                    // Remove first so a duplicate key lands at its last position.
                    obj.shift_remove(&p.key);
                    obj.insert(p.key.clone(), p.value.materialize(message));
                }
                Value::Object(obj)
            }
        }
    }

    /// Reads the bot reply out of `data` by walking it alongside this schema.
    ///
    /// Falls back to `data` itself (strings verbatim, anything else as
    /// compact JSON) when no non-empty value sits at the carrier position.
    pub fn extract(&self, data: &Value) -> String {
        let mut found = None;
        self.find_in(data, &mut found);

        match found {
            Some(reply) if !reply.is_empty() => reply,
            _ => stringify(data),
        }
    }

    fn find_in(&self, data: &Value, found: &mut Option<String>) {
        if data.is_null() {
            return;
        }
        match (self, data) {
            (BodyNode::Primitive { is_carrier: true, .. }, _) => *found = Some(stringify(data)),
            (BodyNode::Array { items, .. }, Value::Array(values)) => {
                for (item, value) in items.iter().zip(values) {
                    item.find_in(value, found);
                }
            }
            (BodyNode::Object { properties, .. }, Value::Object(obj)) => {
                for p in properties {
                    if let Some(value) = obj.get(&p.key) {
                        p.value.find_in(value, found);
                    }
                }
            }
            _ => {}
        }
    }
}

fn stringify(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
