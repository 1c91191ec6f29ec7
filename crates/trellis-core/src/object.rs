//! The in-memory object graph.
//!
//! Domain objects live in an arena ([`ObjectGraph`]) and refer to each other
//! through [`ObjectRef`] handles. A handle is the stable logical identity of an
//! object for the lifetime of the session: it is what visited sets key on, and
//! it provides the provisional reference used in write plans for objects that
//! do not have a store id yet.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};
use crate::schema::ClassInfo;
use crate::types::{PropertyMap, Value};

// ── Handles ──────────────────────────────────────────────────────

/// Index of an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(pub usize);

impl ObjectRef {
    /// The negative reference standing in for this object's store id until
    /// a write plan containing it has been executed.
    pub fn provisional_id(self) -> i64 {
        -(self.0 as i64) - 1
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// Current value of a relationship field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipValue {
    Scalar(Option<ObjectRef>),
    Collection(Vec<ObjectRef>),
}

impl RelationshipValue {
    pub fn refs(&self) -> Vec<ObjectRef> {
        match self {
            Self::Scalar(one) => one.iter().copied().collect(),
            Self::Collection(many) => many.clone(),
        }
    }

    pub fn contains(&self, obj: ObjectRef) -> bool {
        match self {
            Self::Scalar(one) => *one == Some(obj),
            Self::Collection(many) => many.contains(&obj),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(one) => one.is_none(),
            Self::Collection(many) => many.is_empty(),
        }
    }
}

/// A domain object: a node entity, or a relationship entity when `start`
/// and `end` are in use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub class: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub properties: PropertyMap,
    /// Labels carried in addition to the ones declared by the class.
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipValue>,
    #[serde(default)]
    pub start: Option<ObjectRef>,
    #[serde(default)]
    pub end: Option<ObjectRef>,
}

impl Entity {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id: None,
            properties: PropertyMap::new(),
            labels: BTreeSet::new(),
            relationships: BTreeMap::new(),
            start: None,
            end: None,
        }
    }

    /// A relationship entity connecting `start` to `end`.
    pub fn relationship(class: impl Into<String>, start: ObjectRef, end: ObjectRef) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::new(class)
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn related(&self, field: &str) -> Option<&RelationshipValue> {
        self.relationships.get(field)
    }

    /// Objects currently referenced by `field`, in field order.
    pub fn related_refs(&self, field: &str) -> Vec<ObjectRef> {
        self.relationships
            .get(field)
            .map(RelationshipValue::refs)
            .unwrap_or_default()
    }

    pub fn set_one(&mut self, field: impl Into<String>, target: Option<ObjectRef>) {
        self.relationships
            .insert(field.into(), RelationshipValue::Scalar(target));
    }

    pub fn set_many(&mut self, field: impl Into<String>, targets: Vec<ObjectRef>) {
        self.relationships
            .insert(field.into(), RelationshipValue::Collection(targets));
    }

    /// Append to a collection field, creating it if absent. Adding an object
    /// that is already present is a no-op.
    pub fn add_related(&mut self, field: impl Into<String>, target: ObjectRef) {
        let value = self
            .relationships
            .entry(field.into())
            .or_insert_with(|| RelationshipValue::Collection(Vec::new()));
        match value {
            RelationshipValue::Collection(many) => {
                if !many.contains(&target) {
                    many.push(target);
                }
            }
            RelationshipValue::Scalar(one) => *one = Some(target),
        }
    }

    /// Remove `target` from a field. Returns whether anything changed.
    pub fn remove_related(&mut self, field: &str, target: ObjectRef) -> bool {
        match self.relationships.get_mut(field) {
            Some(RelationshipValue::Collection(many)) => {
                let before = many.len();
                many.retain(|r| *r != target);
                before != many.len()
            }
            Some(RelationshipValue::Scalar(one)) if *one == Some(target) => {
                *one = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_relationship_entity(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

// ── Arena ────────────────────────────────────────────────────────

/// Arena of domain objects owned by one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectGraph {
    entities: Vec<Entity>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) -> ObjectRef {
        self.entities.push(entity);
        ObjectRef(self.entities.len() - 1)
    }

    pub fn get(&self, obj: ObjectRef) -> Option<&Entity> {
        self.entities.get(obj.0)
    }

    pub fn get_mut(&mut self, obj: ObjectRef) -> Option<&mut Entity> {
        self.entities.get_mut(obj.0)
    }

    pub fn entity(&self, obj: ObjectRef) -> Result<&Entity> {
        self.get(obj).ok_or(MappingError::UnknownObject(obj))
    }

    pub fn entity_mut(&mut self, obj: ObjectRef) -> Result<&mut Entity> {
        self.get_mut(obj).ok_or(MappingError::UnknownObject(obj))
    }

    pub fn id_of(&self, obj: ObjectRef) -> Option<i64> {
        self.get(obj).and_then(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (ObjectRef(i), e))
    }
}

// ── Instantiation ────────────────────────────────────────────────

/// Creates fresh domain objects for records that have no cached instance.
pub trait EntityInstantiator {
    fn new_instance(&self, class: &ClassInfo, properties: &PropertyMap) -> Entity;
}

/// Instantiates an empty object of the requested class. Properties are
/// written afterwards by the hydrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInstantiator;

impl EntityInstantiator for DefaultInstantiator {
    fn new_instance(&self, class: &ClassInfo, _properties: &PropertyMap) -> Entity {
        Entity::new(class.name.clone())
    }
}
