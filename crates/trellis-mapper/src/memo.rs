//! BLAKE3 fingerprints of last-synced entity state.
//!
//! A fingerprint covers an object's scalar properties and dynamic labels,
//! serialized to canonical JSON (property maps and label sets are ordered)
//! and hashed with BLAKE3. Comparing fingerprints is how the mapping
//! context decides whether an object's properties changed since it was
//! last loaded or saved.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use trellis_core::{Entity, ObjectRef, PropertyMap};

/// Hashable view of an entity (excludes identity and relationships).
#[derive(Serialize)]
struct HashableEntity<'a> {
    class: &'a str,
    properties: &'a PropertyMap,
    labels: &'a BTreeSet<String>,
}

/// Compute the hex-encoded BLAKE3 fingerprint of an entity's properties and labels.
pub fn fingerprint(entity: &Entity) -> String {
    let hashable = HashableEntity {
        class: &entity.class,
        properties: &entity.properties,
        labels: &entity.labels,
    };

    let json = serde_json::to_vec(&hashable).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}

#[derive(Debug, Clone)]
struct Snapshot {
    hash: String,
    labels: BTreeSet<String>,
}

/// Last-synced fingerprints, keyed by object.
#[derive(Debug, Clone, Default)]
pub struct EntityMemo {
    snapshots: HashMap<ObjectRef, Snapshot>,
}

impl EntityMemo {
    pub fn remember(&mut self, obj: ObjectRef, entity: &Entity) {
        self.snapshots.insert(
            obj,
            Snapshot {
                hash: fingerprint(entity),
                labels: entity.labels.clone(),
            },
        );
    }

    /// Whether `entity` still matches the snapshot taken for `obj`. Objects
    /// that were never remembered are not current.
    pub fn is_current(&self, obj: ObjectRef, entity: &Entity) -> bool {
        self.snapshots
            .get(&obj)
            .is_some_and(|s| s.hash == fingerprint(entity))
    }

    /// Dynamic labels the object carried when it was last synced.
    pub fn labels(&self, obj: ObjectRef) -> Option<&BTreeSet<String>> {
        self.snapshots.get(&obj).map(|s| &s.labels)
    }

    pub fn forget(&mut self, obj: ObjectRef) {
        self.snapshots.remove(&obj);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}
