//! JSON documents describing an object graph.
//!
//! Objects refer to each other by a document-local `key`. Relationship
//! fields list the keys of their targets; relationship entities name their
//! endpoints in `start` and `end`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};

use trellis_core::{EntitySchema, Entity, MappingError, ObjectGraph, ObjectRef, PropertyMap};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Object key used twice: {0}")]
    DuplicateKey(String),

    #[error("Reference to unknown object key: {0}")]
    UnknownKey(String),

    #[error("{class} has no relationship field {field}")]
    UnknownField { class: String, field: String },

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Document parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub objects: Vec<ObjectDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDocument {
    pub key: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Labels beyond those of the class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// An object graph built from a document, with the arena slot of each key.
#[derive(Debug, Default)]
pub struct LoadedDocument {
    pub graph: ObjectGraph,
    pub keys: BTreeMap<String, ObjectRef>,
}

impl LoadedDocument {
    pub fn resolve(&self, key: &str) -> Result<ObjectRef, DocumentError> {
        self.keys
            .get(key)
            .copied()
            .ok_or_else(|| DocumentError::UnknownKey(key.to_string()))
    }
}

impl GraphDocument {
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build the object graph. Every class must be known to `schema` and
    /// every relationship key must name a field of its class.
    pub fn build(&self, schema: &dyn EntitySchema) -> Result<LoadedDocument, DocumentError> {
        let mut loaded = LoadedDocument::default();
        for doc in &self.objects {
            schema.require(&doc.class)?;
            let mut entity = Entity::new(&doc.class);
            entity.id = doc.id;
            entity.properties = doc.properties.clone();
            entity.labels = doc.labels.iter().cloned().collect();
            let obj = loaded.graph.insert(entity);
            if loaded.keys.insert(doc.key.clone(), obj).is_some() {
                return Err(DocumentError::DuplicateKey(doc.key.clone()));
            }
        }

        for doc in &self.objects {
            let obj = loaded.resolve(&doc.key)?;
            let class = schema.require(&doc.class)?;
            let start = doc.start.as_deref().map(|k| loaded.resolve(k)).transpose()?;
            let end = doc.end.as_deref().map(|k| loaded.resolve(k)).transpose()?;

            let mut fields = Vec::with_capacity(doc.relationships.len());
            for (name, keys) in &doc.relationships {
                let field = class.relationship_field(name).ok_or_else(|| {
                    DocumentError::UnknownField {
                        class: doc.class.clone(),
                        field: name.clone(),
                    }
                })?;
                let targets = keys
                    .iter()
                    .map(|k| loaded.resolve(k))
                    .collect::<Result<Vec<_>, _>>()?;
                fields.push((name.clone(), field.is_scalar(), targets));
            }

            let entity = loaded.graph.entity_mut(obj)?;
            entity.start = start;
            entity.end = end;
            for (name, scalar, targets) in fields {
                if scalar {
                    entity.set_one(name, targets.first().copied());
                } else {
                    entity.set_many(name, targets);
                }
            }
        }
        Ok(loaded)
    }

    /// Describe `roots` and everything reachable from them. Keys are derived
    /// from store ids where present.
    pub fn export(graph: &ObjectGraph, roots: &[ObjectRef]) -> Self {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<ObjectRef> = roots.iter().copied().collect();
        while let Some(obj) = queue.pop_front() {
            let Some(entity) = graph.get(obj) else {
                continue;
            };
            if !seen.insert(obj) {
                continue;
            }
            order.push(obj);
            queue.extend(entity.start);
            queue.extend(entity.end);
            for value in entity.relationships.values() {
                queue.extend(value.refs());
            }
        }

        let key = |obj: ObjectRef| -> String {
            match graph.get(obj) {
                Some(e) if e.id.is_some() && e.is_relationship_entity() => {
                    format!("r{}", e.id.unwrap_or_default())
                }
                Some(e) if e.id.is_some() => format!("n{}", e.id.unwrap_or_default()),
                _ => format!("o{}", obj.0),
            }
        };

        let objects = order
            .into_iter()
            .filter_map(|obj| {
                let entity = graph.get(obj)?;
                Some(ObjectDocument {
                    key: key(obj),
                    class: entity.class.clone(),
                    id: entity.id,
                    labels: entity.labels.iter().cloned().collect(),
                    properties: entity.properties.clone(),
                    relationships: entity
                        .relationships
                        .iter()
                        .filter(|(_, v)| !v.is_empty())
                        .map(|(name, v)| (name.clone(), v.refs().into_iter().map(key).collect()))
                        .collect(),
                    start: entity.start.map(key),
                    end: entity.end.map(key),
                })
            })
            .collect();
        Self { objects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{ClassInfo, MetaData, RelationshipField, Value};

    fn schema() -> MetaData {
        MetaData::new(vec![
            ClassInfo::node("Person")
                .property("name")
                .relationship(RelationshipField::new("friends", "FRIEND", "Person"))
                .relationship(RelationshipField::new("mentor", "MENTORS", "Person").scalar()),
        ])
        .unwrap()
    }

    const DOC: &str = r#"{
        "objects": [
            {"key": "a", "class": "Person", "properties": {"name": "A"},
             "relationships": {"friends": ["b"], "mentor": ["b"]}},
            {"key": "b", "class": "Person", "id": 7, "labels": ["Admin"],
             "properties": {"name": "B"}}
        ]
    }"#;

    #[test]
    fn builds_scalar_and_collection_fields() {
        let loaded = GraphDocument::from_json(DOC).unwrap().build(&schema()).unwrap();
        let a = loaded.resolve("a").unwrap();
        let b = loaded.resolve("b").unwrap();

        let entity = loaded.graph.get(a).unwrap();
        assert_eq!(entity.related_refs("friends"), vec![b]);
        assert_eq!(entity.related_refs("mentor"), vec![b]);
        assert_eq!(entity.property("name"), Some(&Value::from("A")));

        let entity = loaded.graph.get(b).unwrap();
        assert_eq!(entity.id, Some(7));
        assert!(entity.labels.contains("Admin"));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let doc = GraphDocument::from_json(
            r#"{"objects": [{"key": "a", "class": "Person", "relationships": {"friends": ["zz"]}}]}"#,
        )
        .unwrap();
        let err = doc.build(&schema()).unwrap_err();
        assert!(matches!(err, DocumentError::UnknownKey(k) if k == "zz"));

        let doc = GraphDocument::from_json(
            r#"{"objects": [{"key": "a", "class": "Person", "relationships": {"enemies": []}}]}"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(&schema()).unwrap_err(),
            DocumentError::UnknownField { .. }
        ));

        let doc = GraphDocument::from_json(r#"{"objects": [{"key": "a", "class": "Robot"}]}"#).unwrap();
        assert!(matches!(
            doc.build(&schema()).unwrap_err(),
            DocumentError::Mapping(MappingError::UnknownClass(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let doc = GraphDocument::from_json(
            r#"{"objects": [{"key": "a", "class": "Person"}, {"key": "a", "class": "Person"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(&schema()).unwrap_err(),
            DocumentError::DuplicateKey(_)
        ));
    }

    #[test]
    fn export_keys_follow_store_ids() {
        let loaded = GraphDocument::from_json(DOC).unwrap().build(&schema()).unwrap();
        let a = loaded.resolve("a").unwrap();

        let exported = GraphDocument::export(&loaded.graph, &[a]);
        let keys: Vec<&str> = exported.objects.iter().map(|o| o.key.as_str()).collect();
        let unsaved = format!("o{}", a.0);
        assert_eq!(keys, vec![unsaved.as_str(), "n7"]);
        assert_eq!(exported.objects[0].relationships["friends"], vec!["n7".to_string()]);
    }
}
