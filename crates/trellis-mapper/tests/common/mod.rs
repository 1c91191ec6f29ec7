//! Shared schema and helpers for the mapper integration tests.

#![allow(dead_code)]

use trellis_core::{
    ClassInfo, Entity, GraphModel, MetaData, NodeRecord, ObjectGraph, ObjectRef, PropertyMap,
    RelationshipField, RelationshipRecord, Value,
};
use trellis_mapper::{
    GraphHydrator, MappingContext, ObjectGraphDiffer, SavePlan, WriteAcknowledgement,
    WriteOperation,
};

/// People, companies, movies and the relationships between them.
pub fn schema() -> MetaData {
    MetaData::new(vec![
        ClassInfo::node("Person")
            .property("name")
            .relationship(RelationshipField::new("friends", "FRIEND", "Person"))
            .relationship(RelationshipField::new("employer", "WORKS_AT", "Company").scalar())
            .relationship(RelationshipField::new("mentor", "MENTORS", "Person").scalar())
            .relationship(RelationshipField::new("roles", "ACTED_IN", "Role")),
        ClassInfo::node("Company")
            .property("name")
            .relationship(RelationshipField::new("employees", "WORKS_AT", "Person").incoming()),
        ClassInfo::node("Movie")
            .property("title")
            .relationship(RelationshipField::new("cast", "ACTED_IN", "Role").incoming()),
        ClassInfo::relationship_entity("Role", "ACTED_IN", "Person", "Movie").property("character"),
        ClassInfo::node("Item")
            .property("name")
            .relationship(RelationshipField::new("related", "RELATED_TO", "Link").scalar()),
        ClassInfo::relationship_entity("Link", "RELATED_TO", "Item", "Item").property("p"),
    ])
    .expect("test schema is valid")
}

pub fn person(name: &str) -> Entity {
    Entity::new("Person").with_property("name", name)
}

pub fn diff(
    meta: &MetaData,
    context: &mut MappingContext,
    graph: &ObjectGraph,
    root: ObjectRef,
    horizon: i32,
) -> SavePlan {
    ObjectGraphDiffer::new(meta, context)
        .diff(graph, root, horizon)
        .expect("diff succeeds")
}

/// Pretend the store ran the plan: hand out ids from `next_id` upwards for
/// every created node and edge.
pub fn acknowledge(plan: &SavePlan, next_id: &mut i64) -> WriteAcknowledgement {
    let mut ack = WriteAcknowledgement::default();
    for op in &plan.plan.operations {
        match op {
            WriteOperation::CreateNode { reference, .. } => {
                ack.nodes.insert(*reference, *next_id);
                *next_id += 1;
            }
            WriteOperation::CreateRel { reference, .. } => {
                ack.relationships.insert(*reference, *next_id);
                *next_id += 1;
            }
            _ => {}
        }
    }
    ack
}

/// Diff, acknowledge, and commit in one go.
pub fn save(
    meta: &MetaData,
    context: &mut MappingContext,
    graph: &mut ObjectGraph,
    root: ObjectRef,
    horizon: i32,
    next_id: &mut i64,
) -> Vec<WriteOperation> {
    let plan = diff(meta, context, graph, root, horizon);
    let operations = plan.plan.operations.clone();
    let ack = acknowledge(&plan, next_id);
    plan.commit(&ack, graph, context).expect("commit succeeds");
    operations
}

pub fn node(id: i64, label: &str, props: &[(&str, Value)]) -> NodeRecord {
    NodeRecord {
        id,
        labels: vec![label.to_string()],
        properties: props_of(props),
    }
}

pub fn rel(id: i64, rel_type: &str, start: i64, end: i64, props: &[(&str, Value)]) -> RelationshipRecord {
    RelationshipRecord {
        id,
        rel_type: rel_type.to_string(),
        start,
        end,
        properties: props_of(props),
    }
}

fn props_of(props: &[(&str, Value)]) -> PropertyMap {
    props
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn hydrate(
    meta: &MetaData,
    context: &mut MappingContext,
    graph: &mut ObjectGraph,
    model: &GraphModel,
    requested: &str,
) -> Vec<ObjectRef> {
    GraphHydrator::new(meta, context)
        .hydrate(graph, model, requested)
        .expect("hydration succeeds")
        .objects
}

pub fn count(ops: &[WriteOperation], pred: fn(&WriteOperation) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

pub fn is_create_node(op: &WriteOperation) -> bool {
    matches!(op, WriteOperation::CreateNode { .. })
}

pub fn is_create_rel(op: &WriteOperation) -> bool {
    matches!(op, WriteOperation::CreateRel { .. })
}

pub fn is_delete_rel(op: &WriteOperation) -> bool {
    matches!(op, WriteOperation::DeleteRel { .. })
}

pub fn is_relationship_op(op: &WriteOperation) -> bool {
    matches!(
        op,
        WriteOperation::CreateRel { .. }
            | WriteOperation::MatchRel { .. }
            | WriteOperation::DeleteRel { .. }
    )
}
