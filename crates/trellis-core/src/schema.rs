//! Entity schema: per-class labels, properties, and relationship fields.
//!
//! A [`MetaData`] registry is built once, either in code through the
//! [`ClassInfo`] builder methods or from a JSON schema file, and is then
//! consulted through the [`EntitySchema`] trait by the mapper.
//!
//! Inheritance is resolved at build time: every class carries the full set
//! of labels, properties, and relationship fields of its ancestors.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result, SchemaError};
use crate::types::{Cardinality, Direction};

// ── Declarations ─────────────────────────────────────────────────

/// Whether a class maps to a node or to an edge carrying properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Node,
    RelationshipEntity {
        rel_type: String,
        start_type: String,
        end_type: String,
    },
}

/// A relationship-typed field declared on a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipField {
    pub name: String,
    pub rel_type: String,
    #[serde(default)]
    pub direction: Direction,
    /// Class of the values held by the field. For fields holding
    /// relationship entities this is the relationship entity class.
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl RelationshipField {
    /// An outgoing collection field.
    pub fn new(
        name: impl Into<String>,
        rel_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            rel_type: rel_type.into(),
            direction: Direction::Outgoing,
            target: target.into(),
            cardinality: Cardinality::Collection,
        }
    }

    pub fn incoming(mut self) -> Self {
        self.direction = Direction::Incoming;
        self
    }

    pub fn undirected(mut self) -> Self {
        self.direction = Direction::Undirected;
        self
    }

    pub fn scalar(mut self) -> Self {
        self.cardinality = Cardinality::Scalar;
        self
    }

    pub fn is_scalar(&self) -> bool {
        self.cardinality == Cardinality::Scalar
    }
}

/// Metadata for one mapped class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Static labels. Defaults to the class name for node classes; after
    /// schema resolution this includes the labels of every ancestor.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipField>,
}

impl ClassInfo {
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            is_abstract: false,
            labels: Vec::new(),
            kind: EntityKind::Node,
            properties: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn relationship_entity(
        name: impl Into<String>,
        rel_type: impl Into<String>,
        start_type: impl Into<String>,
        end_type: impl Into<String>,
    ) -> Self {
        Self {
            kind: EntityKind::RelationshipEntity {
                rel_type: rel_type.into(),
                start_type: start_type.into(),
                end_type: end_type.into(),
            },
            ..Self::node(name)
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    pub fn relationship(mut self, field: RelationshipField) -> Self {
        self.relationships.push(field);
        self
    }

    pub fn is_relationship_entity(&self) -> bool {
        matches!(self.kind, EntityKind::RelationshipEntity { .. })
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }

    pub fn relationship_field(&self, name: &str) -> Option<&RelationshipField> {
        self.relationships.iter().find(|f| f.name == name)
    }

    /// Relationship type of a relationship entity class.
    pub fn rel_type(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::RelationshipEntity { rel_type, .. } => Some(rel_type),
            EntityKind::Node => None,
        }
    }
}

// ── Schema trait ─────────────────────────────────────────────────

/// Per-type metadata consumed by the differ and the hydrator.
pub trait EntitySchema {
    fn class_info(&self, name: &str) -> Option<&ClassInfo>;

    /// The most specific concrete node class whose labels are all present.
    fn class_for_labels(&self, labels: &[String]) -> Option<&ClassInfo>;

    /// Relationship entity classes mapped to `rel_type`.
    fn relationship_entity_classes(&self, rel_type: &str) -> Vec<&ClassInfo>;

    /// Whether a value of class `runtime` can be stored where `declared` is expected.
    fn is_assignable(&self, declared: &str, runtime: &str) -> bool;

    fn require(&self, name: &str) -> Result<&ClassInfo> {
        self.class_info(name)
            .ok_or_else(|| MappingError::UnknownClass(name.to_string()))
    }

    fn is_relationship_entity(&self, name: &str) -> bool {
        self.class_info(name)
            .is_some_and(ClassInfo::is_relationship_entity)
    }

    /// Node labels of a class, or the relationship type of a relationship entity.
    fn labels_or_type(&self, name: &str) -> Vec<String> {
        match self.class_info(name) {
            Some(ClassInfo {
                kind: EntityKind::RelationshipEntity { rel_type, .. },
                ..
            }) => vec![rel_type.clone()],
            Some(info) => info.labels.clone(),
            None => Vec::new(),
        }
    }

    /// Class of the node at the far end of `field`. For fields holding
    /// relationship entities this is the endpoint opposite the field owner.
    fn endpoint_type(&self, field: &RelationshipField) -> Option<String> {
        match &self.class_info(&field.target)?.kind {
            EntityKind::RelationshipEntity {
                start_type,
                end_type,
                ..
            } => Some(if field.direction == Direction::Incoming {
                start_type.clone()
            } else {
                end_type.clone()
            }),
            EntityKind::Node => Some(field.target.clone()),
        }
    }

    /// Find the field of `class` that accepts a `value_class` object related
    /// through `[:rel_type]` in `direction`. Fields declaring exactly that
    /// direction win over undirected ones.
    fn relationship_writer(
        &self,
        class: &str,
        rel_type: &str,
        direction: Direction,
        value_class: &str,
    ) -> Result<Option<&RelationshipField>> {
        let info = self.require(class)?;
        let candidates: Vec<&RelationshipField> = info
            .relationships
            .iter()
            .filter(|f| f.rel_type == rel_type && f.direction.accepts(direction))
            .filter(|f| self.is_assignable(&f.target, value_class))
            .collect();

        let exact: Vec<&RelationshipField> = candidates
            .iter()
            .copied()
            .filter(|f| f.direction == direction)
            .collect();
        let pool = if exact.is_empty() { candidates } else { exact };

        match pool.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            many => Err(MappingError::AmbiguousWriter {
                class: class.to_string(),
                rel_type: rel_type.to_string(),
                direction,
                value_class: value_class.to_string(),
                fields: many.iter().map(|f| f.name.clone()).collect(),
            }),
        }
    }
}

// ── MetaData registry ────────────────────────────────────────────

/// Resolved schema for a set of classes.
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    classes: BTreeMap<String, ClassInfo>,
    ancestors: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct SchemaFile {
    classes: Vec<ClassInfo>,
}

impl MetaData {
    /// Build and validate a schema from class declarations.
    pub fn new(classes: Vec<ClassInfo>) -> std::result::Result<Self, SchemaError> {
        let mut declared = BTreeMap::new();
        for class in classes {
            if declared.contains_key(&class.name) {
                return Err(SchemaError::DuplicateClass(class.name));
            }
            declared.insert(class.name.clone(), class);
        }

        let mut ancestors = BTreeMap::new();
        for name in declared.keys() {
            ancestors.insert(name.clone(), ancestor_chain(&declared, name)?);
        }

        let mut classes = BTreeMap::new();
        for (name, class) in &declared {
            let chain = &ancestors[name];
            classes.insert(name.clone(), resolve(class, chain, &declared));
        }

        let meta = Self { classes, ancestors };
        meta.validate()?;

        tracing::debug!(classes = meta.classes.len(), "Entity schema resolved");
        Ok(meta)
    }

    /// Parse a schema of the form `{"classes": [...]}`.
    pub fn from_json(json: &str) -> std::result::Result<Self, SchemaError> {
        let file: SchemaFile = serde_json::from_str(json)?;
        Self::new(file.classes)
    }

    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, SchemaError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    /// Superclasses of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> &[String] {
        self.ancestors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn validate(&self) -> std::result::Result<(), SchemaError> {
        for class in self.classes.values() {
            for field in &class.relationships {
                if !self.classes.contains_key(&field.target) {
                    return Err(SchemaError::UnknownTarget {
                        class: class.name.clone(),
                        field: field.name.clone(),
                        target: field.target.clone(),
                    });
                }
            }
            if let EntityKind::RelationshipEntity {
                start_type,
                end_type,
                ..
            } = &class.kind
            {
                for (side, target) in [("start", start_type), ("end", end_type)] {
                    if !self.classes.contains_key(target) {
                        return Err(SchemaError::UnknownEndpoint {
                            class: class.name.clone(),
                            side,
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn ancestor_chain(
    declared: &BTreeMap<String, ClassInfo>,
    name: &str,
) -> std::result::Result<Vec<String>, SchemaError> {
    let mut chain = Vec::new();
    let mut seen = BTreeSet::from([name.to_string()]);
    let mut current = &declared[name];

    while let Some(parent) = &current.superclass {
        let Some(next) = declared.get(parent) else {
            return Err(SchemaError::UnknownSuperclass {
                class: current.name.clone(),
                superclass: parent.clone(),
            });
        };
        if !seen.insert(parent.clone()) {
            return Err(SchemaError::InheritanceCycle(name.to_string()));
        }
        chain.push(parent.clone());
        current = next;
    }
    Ok(chain)
}

fn own_labels(class: &ClassInfo) -> Vec<String> {
    if class.labels.is_empty() {
        vec![class.name.clone()]
    } else {
        class.labels.clone()
    }
}

fn resolve(class: &ClassInfo, chain: &[String], declared: &BTreeMap<String, ClassInfo>) -> ClassInfo {
    // Root ancestor first, so that subclasses override inherited fields.
    let lineage: Vec<&ClassInfo> = chain
        .iter()
        .rev()
        .map(|n| &declared[n])
        .chain(std::iter::once(class))
        .collect();

    let mut labels: Vec<String> = Vec::new();
    let mut properties: Vec<String> = Vec::new();
    let mut relationships: Vec<RelationshipField> = Vec::new();
    let mut kind = EntityKind::Node;

    for c in &lineage {
        for label in own_labels(c) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        for p in &c.properties {
            if !properties.contains(p) {
                properties.push(p.clone());
            }
        }
        for field in &c.relationships {
            relationships.retain(|f| f.name != field.name);
            relationships.push(field.clone());
        }
        if c.is_relationship_entity() {
            kind = c.kind.clone();
        }
    }

    if matches!(kind, EntityKind::RelationshipEntity { .. }) {
        labels.clear();
    }

    ClassInfo {
        name: class.name.clone(),
        superclass: class.superclass.clone(),
        is_abstract: class.is_abstract,
        labels,
        kind,
        properties,
        relationships,
    }
}

impl EntitySchema for MetaData {
    fn class_info(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    fn class_for_labels(&self, labels: &[String]) -> Option<&ClassInfo> {
        self.classes
            .values()
            .filter(|c| !c.is_abstract && !c.is_relationship_entity())
            .filter(|c| c.labels.iter().all(|l| labels.contains(l)))
            .max_by(|a, b| {
                a.labels
                    .len()
                    .cmp(&b.labels.len())
                    .then_with(|| b.name.cmp(&a.name))
            })
    }

    fn relationship_entity_classes(&self, rel_type: &str) -> Vec<&ClassInfo> {
        self.classes
            .values()
            .filter(|c| !c.is_abstract && c.rel_type() == Some(rel_type))
            .collect()
    }

    fn is_assignable(&self, declared: &str, runtime: &str) -> bool {
        declared == runtime || self.ancestors(runtime).iter().any(|a| a == declared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movies() -> MetaData {
        MetaData::new(vec![
            ClassInfo::node("Entity").abstract_class().property("uuid"),
            ClassInfo::node("Person")
                .extends("Entity")
                .property("name")
                .relationship(RelationshipField::new("roles", "ACTED_IN", "Role")),
            ClassInfo::node("Actor").extends("Person"),
            ClassInfo::node("Movie")
                .property("title")
                .relationship(RelationshipField::new("cast", "ACTED_IN", "Role").incoming()),
            ClassInfo::relationship_entity("Role", "ACTED_IN", "Person", "Movie")
                .property("character"),
        ])
        .unwrap()
    }

    #[test]
    fn inheritance_is_flattened() {
        let meta = movies();
        let actor = meta.class_info("Actor").unwrap();
        assert_eq!(actor.labels, vec!["Entity", "Person", "Actor"]);
        assert_eq!(actor.properties, vec!["uuid", "name"]);
        assert!(actor.relationship_field("roles").is_some());
        assert!(meta.is_assignable("Person", "Actor"));
        assert!(!meta.is_assignable("Actor", "Person"));
    }

    #[test]
    fn most_specific_class_wins_label_resolution() {
        let meta = movies();
        let labels: Vec<String> = ["Entity", "Person", "Actor", "Famous"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(meta.class_for_labels(&labels).unwrap().name, "Actor");

        let unknown = vec!["Planet".to_string()];
        assert!(meta.class_for_labels(&unknown).is_none());
    }

    #[test]
    fn relationship_entities_report_their_type() {
        let meta = movies();
        assert!(meta.is_relationship_entity("Role"));
        assert_eq!(meta.labels_or_type("Role"), vec!["ACTED_IN"]);
        assert_eq!(meta.relationship_entity_classes("ACTED_IN").len(), 1);

        let cast = meta.class_info("Movie").unwrap().relationship_field("cast").unwrap();
        assert_eq!(meta.endpoint_type(cast).as_deref(), Some("Person"));
        let roles = meta.class_info("Person").unwrap().relationship_field("roles").unwrap();
        assert_eq!(meta.endpoint_type(roles).as_deref(), Some("Movie"));
    }

    #[test]
    fn writer_lookup_respects_direction_and_assignability() {
        let meta = movies();
        let out = meta
            .relationship_writer("Actor", "ACTED_IN", Direction::Outgoing, "Role")
            .unwrap();
        assert_eq!(out.unwrap().name, "roles");

        let none = meta
            .relationship_writer("Actor", "ACTED_IN", Direction::Incoming, "Role")
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn ambiguous_writers_are_rejected() {
        let meta = MetaData::new(vec![ClassInfo::node("Person")
            .relationship(RelationshipField::new("friends", "KNOWS", "Person"))
            .relationship(RelationshipField::new("contacts", "KNOWS", "Person"))])
        .unwrap();

        let err = meta
            .relationship_writer("Person", "KNOWS", Direction::Outgoing, "Person")
            .unwrap_err();
        assert!(matches!(err, MappingError::AmbiguousWriter { .. }));
    }

    #[test]
    fn schema_errors_are_reported() {
        let err = MetaData::new(vec![ClassInfo::node("A").extends("Missing")]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownSuperclass { .. }));

        let err = MetaData::new(vec![ClassInfo::node("A"), ClassInfo::node("A")]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateClass(_)));

        let err = MetaData::new(vec![
            ClassInfo::node("A").extends("B"),
            ClassInfo::node("B").extends("A"),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::InheritanceCycle(_)));
    }

    #[test]
    fn schema_loads_from_json() {
        let json = r#"{
            "classes": [
                {"name": "Person", "properties": ["name"],
                 "relationships": [{"name": "knows", "rel_type": "KNOWS", "target": "Person"}]},
                {"name": "Knows",
                 "kind": {"relationship_entity": {"rel_type": "KNOWS_WELL", "start_type": "Person", "end_type": "Person"}},
                 "properties": ["since"]}
            ]
        }"#;
        let meta = MetaData::from_json(json).unwrap();
        let person = meta.class_info("Person").unwrap();
        assert_eq!(person.labels, vec!["Person"]);
        assert_eq!(person.relationships[0].direction, Direction::Outgoing);
        assert_eq!(person.relationships[0].cardinality, Cardinality::Collection);
        assert!(meta.is_relationship_entity("Knows"));
    }
}
