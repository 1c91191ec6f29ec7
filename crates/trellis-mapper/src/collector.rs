//! Deferred collection writes for the load path.

use std::collections::BTreeMap;

use trellis_core::{Direction, ObjectRef};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollectorKey {
    pub owner: ObjectRef,
    pub rel_type: String,
    pub direction: Direction,
    pub element_type: String,
}

/// Related objects gathered per owner and relationship, so that each
/// collection field is written once per load.
#[derive(Debug, Default)]
pub struct EntityCollector {
    groups: BTreeMap<CollectorKey, (String, Vec<ObjectRef>)>,
}

impl EntityCollector {
    pub fn collect(
        &mut self,
        key: CollectorKey,
        field: &str,
        value: ObjectRef,
    ) {
        let (_, values) = self
            .groups
            .entry(key)
            .or_insert_with(|| (field.to_string(), Vec::new()));
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// `(owner, field, values)` for every group, in key order.
    pub fn into_groups(self) -> impl Iterator<Item = (ObjectRef, String, Vec<ObjectRef>)> {
        self.groups
            .into_iter()
            .map(|(key, (field, values))| (key.owner, field, values))
    }
}
