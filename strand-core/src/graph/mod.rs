//! Logical graph objects - Node, Relationship, Graph
//!
//! These are the application-facing values produced at the storage engine
//! boundary. They never alias the physical records and are immutable:
//! `apply` returns a new value and leaves the original untouched, so a
//! holder of an `Arc<Node>` never observes another writer's change.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of a node: its ordinal in the node store
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Get the raw ID value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a relationship: its ordinal in the relationship store
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RelationshipId(pub u32);

impl RelationshipId {
    /// Get the raw ID value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for RelationshipId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean value
    Bool(bool),
    /// Integer value (stored inline, 36-bit range)
    Int(i64),
    /// String value (stored out of line)
    String(String),
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Named property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property name
    pub key: String,
    /// Property value
    pub value: PropertyValue,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Set or replace properties in an ordered list, keeping first-seen order
fn merge_properties(base: &[Property], set: &[Property], remove: &[String]) -> Vec<Property> {
    let mut out: Vec<Property> = base
        .iter()
        .filter(|p| !remove.contains(&p.key))
        .cloned()
        .collect();
    for prop in set {
        match out.iter_mut().find(|p| p.key == prop.key) {
            Some(existing) => existing.value = prop.value.clone(),
            None => out.push(prop.clone()),
        }
    }
    out
}

/// Graph node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Engine-assigned id; `None` until stored
    pub id: Option<NodeId>,
    /// Name given in the CREATE statement
    pub name: Option<String>,
    /// Up to three labels
    pub labels: Vec<String>,
    /// Properties in insertion order
    pub properties: Vec<Property>,
    /// Relationships touching this node, newest first
    pub relationships: Vec<RelationshipId>,
}

impl Node {
    /// Unstored node with a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties = merge_properties(&self.properties, &[Property::new(key, value)], &[]);
        self
    }

    /// Copy of this node carrying the engine-assigned id
    pub fn with_id(&self, id: NodeId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    /// Look up a property value
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }

    /// New node with `patch` applied; `self` is unchanged
    pub fn apply(&self, patch: &NodePatch) -> Node {
        let mut labels: Vec<String> = self
            .labels
            .iter()
            .filter(|l| !patch.remove_labels.contains(l))
            .cloned()
            .collect();
        for label in &patch.add_labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        Node {
            id: self.id,
            name: patch.name.clone().or_else(|| self.name.clone()),
            labels,
            properties: merge_properties(
                &self.properties,
                &patch.set_properties,
                &patch.remove_properties,
            ),
            relationships: self.relationships.clone(),
        }
    }
}

/// Changes to apply to a [`Node`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePatch {
    /// Replacement name
    pub name: Option<String>,
    /// Labels to add (ignored if present)
    pub add_labels: Vec<String>,
    /// Labels to remove
    pub remove_labels: Vec<String>,
    /// Properties to set or replace
    pub set_properties: Vec<Property>,
    /// Property keys to remove
    pub remove_properties: Vec<String>,
}

/// Graph relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Engine-assigned id; `None` until stored
    pub id: Option<RelationshipId>,
    /// Start node
    pub start: NodeId,
    /// End node
    pub end: NodeId,
    /// Relationship type
    pub rel_type: String,
    /// Optional label
    pub label: Option<String>,
    /// Properties in insertion order
    pub properties: Vec<Property>,
}

impl Relationship {
    /// Unstored relationship
    pub fn new(start: NodeId, end: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            id: None,
            start,
            end,
            rel_type: rel_type.into(),
            label: None,
            properties: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties = merge_properties(&self.properties, &[Property::new(key, value)], &[]);
        self
    }

    /// Copy carrying the engine-assigned id
    pub fn with_id(&self, id: RelationshipId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    /// New relationship with `patch` applied; `self` is unchanged
    pub fn apply(&self, patch: &RelationshipPatch) -> Relationship {
        Relationship {
            id: self.id,
            start: self.start,
            end: self.end,
            rel_type: patch
                .rel_type
                .clone()
                .unwrap_or_else(|| self.rel_type.clone()),
            label: match &patch.label {
                Some(label) => label.clone(),
                None => self.label.clone(),
            },
            properties: merge_properties(
                &self.properties,
                &patch.set_properties,
                &patch.remove_properties,
            ),
        }
    }
}

/// Changes to apply to a [`Relationship`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipPatch {
    /// Replacement type
    pub rel_type: Option<String>,
    /// `Some(None)` clears the label
    pub label: Option<Option<String>>,
    /// Properties to set or replace
    pub set_properties: Vec<Property>,
    /// Property keys to remove
    pub remove_properties: Vec<String>,
}

/// Keyed collection of stored nodes and relationships
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Arc<Node>>,
    relationships: BTreeMap<RelationshipId, Arc<Relationship>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// New graph that also holds `node`. Unstored nodes (no id) are ignored.
    pub fn with_node(&self, node: Node) -> Graph {
        let mut next = self.clone();
        if let Some(id) = node.id {
            next.nodes.insert(id, Arc::new(node));
        }
        next
    }

    /// New graph that also holds `rel`. Unstored relationships are ignored.
    pub fn with_relationship(&self, rel: Relationship) -> Graph {
        let mut next = self.clone();
        if let Some(id) = rel.id {
            next.relationships.insert(id, Arc::new(rel));
        }
        next
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.get(&id).cloned()
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<Arc<Relationship>> {
        self.relationships.get(&id).cloned()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Arc<Relationship>> {
        self.relationships.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}
