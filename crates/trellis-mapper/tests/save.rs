//! Save-path tests: diffing object graphs into write plans.

mod common;

use common::*;
use trellis_core::{
    ClassInfo, Entity, GraphModel, MappedRelationship, MetaData, ObjectGraph, RelationshipField,
    Value,
};
use trellis_mapper::{MappingContext, WriteOperation};

/// Loads `(1:Person A)-[:FRIEND]->(2:Person B)`, `(1)-[:WORKS_AT]->(3:Company)`
/// and `(1)-[12:ACTED_IN {character}]->(4:Movie)`.
fn loaded_world(meta: &MetaData, context: &mut MappingContext, graph: &mut ObjectGraph) {
    let model = GraphModel {
        nodes: vec![
            node(1, "Person", &[("name", "A".into())]),
            node(2, "Person", &[("name", "B".into())]),
            node(3, "Company", &[("name", "Acme".into())]),
            node(4, "Movie", &[("title", "Heat".into())]),
        ],
        relationships: vec![
            rel(10, "FRIEND", 1, 2, &[]),
            rel(11, "WORKS_AT", 1, 3, &[]),
            rel(12, "ACTED_IN", 1, 4, &[("character", "Neil".into())]),
        ],
    };
    hydrate(meta, context, graph, &model, "Person");
}

#[test]
fn new_node_without_relationships() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let a = graph.insert(person("A"));

    let plan = diff(&meta, &mut context, &graph, a, 1);
    let ops = &plan.plan.operations;
    assert_eq!(count(ops, is_create_node), 1);
    assert_eq!(count(ops, is_relationship_op), 0);
}

#[test]
fn new_relationship_entity_between_new_nodes() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let a = graph.insert(Entity::new("Item").with_property("name", "a"));
    let b = graph.insert(Entity::new("Item").with_property("name", "b"));
    let link = graph.insert(Entity::relationship("Link", a, b).with_property("p", 5));
    graph.get_mut(a).unwrap().set_one("related", Some(link));

    let plan = diff(&meta, &mut context, &graph, a, 1);
    let ops = &plan.plan.operations;
    assert_eq!(count(ops, is_create_node), 2);
    assert_eq!(count(ops, is_create_rel), 1);
    match ops.iter().find(|op| is_create_rel(op)) {
        Some(WriteOperation::CreateRel {
            rel_type,
            properties,
            singleton,
            ..
        }) => {
            assert_eq!(rel_type, "RELATED_TO");
            assert_eq!(properties.get("p"), Some(&Value::Integer(5)));
            assert!(!singleton);
        }
        other => panic!("expected a relationship create, got {other:?}"),
    }
    assert_eq!(graph.get(link).unwrap().id, None);

    let mut next_id = 100;
    let ack = acknowledge(&plan, &mut next_id);
    plan.commit(&ack, &mut graph, &mut context).unwrap();

    let link_id = graph.get(link).unwrap().id.expect("relationship entity got an id");
    assert_eq!(context.relationship_entity(link_id), Some(link));
    let a_id = graph.get(a).unwrap().id.unwrap();
    let b_id = graph.get(b).unwrap().id.unwrap();
    assert!(context.contains_relationship(&MappedRelationship::new(
        a_id,
        "RELATED_TO",
        b_id,
        Some(link_id),
        "",
        ""
    )));
    assert!(diff(&meta, &mut context, &graph, a, 1).is_empty());
}

#[test]
fn removed_collection_member_is_deleted() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    loaded_world(&meta, &mut context, &mut graph);
    let a = context.node_entity(1).unwrap();
    let b = context.node_entity(2).unwrap();

    assert!(graph.get_mut(a).unwrap().remove_related("friends", b));
    let plan = diff(&meta, &mut context, &graph, a, 1);

    assert_eq!(
        plan.plan.operations,
        vec![WriteOperation::DeleteRel {
            start: 1,
            rel_type: "FRIEND".into(),
            end: 2,
            id: None,
        }]
    );
    assert!(!context.contains_relationship(&MappedRelationship::new(1, "FRIEND", 2, None, "", "")));
    // B was not visited and lost its only relationship.
    assert_eq!(context.node_entity(2), None);
}

#[test]
fn evicted_node_linked_again_keeps_its_identity() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let mut next_id = 100;
    loaded_world(&meta, &mut context, &mut graph);
    let a = context.node_entity(1).unwrap();
    let b = context.node_entity(2).unwrap();

    graph.get_mut(a).unwrap().remove_related("friends", b);
    save(&meta, &mut context, &mut graph, a, 1, &mut next_id);
    assert_eq!(context.node_entity(2), None);

    graph.get_mut(a).unwrap().add_related("friends", b);
    let ops = save(&meta, &mut context, &mut graph, a, 1, &mut next_id);
    assert_eq!(count(&ops, is_create_node), 0);
    assert_eq!(count(&ops, is_create_rel), 1);
    assert_eq!(context.node_entity(2), Some(b));
    assert!(context.contains_relationship(&MappedRelationship::new(1, "FRIEND", 2, None, "", "")));

    let objects = graph.len();
    loaded_world(&meta, &mut context, &mut graph);
    assert_eq!(context.node_entity(2), Some(b));
    assert_eq!(graph.len(), objects);
    assert_eq!(graph.get(a).unwrap().related_refs("friends"), vec![b]);
    assert!(save(&meta, &mut context, &mut graph, a, 1, &mut next_id).is_empty());
}

#[test]
fn unchanged_loaded_graph_saves_nothing() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    loaded_world(&meta, &mut context, &mut graph);
    let before: Vec<MappedRelationship> = context.relationships().cloned().collect();

    for id in 1..=4 {
        let obj = context.node_entity(id).unwrap();
        assert!(!context.is_dirty(&meta, &graph, obj), "node {id} is dirty");
        let plan = diff(&meta, &mut context, &graph, obj, -1);
        assert!(plan.is_empty(), "saving node {id} produced {:?}", plan.plan);
    }

    let after: Vec<MappedRelationship> = context.relationships().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn saved_graph_resaves_empty() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let a = graph.insert(person("A"));
    let b = graph.insert(person("B"));
    let acme = graph.insert(Entity::new("Company").with_property("name", "Acme"));
    graph.get_mut(a).unwrap().add_related("friends", b);
    graph.get_mut(a).unwrap().set_one("employer", Some(acme));

    let mut next_id = 1;
    let ops = save(&meta, &mut context, &mut graph, a, -1, &mut next_id);
    assert_eq!(count(&ops, is_create_node), 3);
    assert_eq!(count(&ops, is_create_rel), 2);
    assert_eq!(context.relationships().count(), 2);

    assert!(diff(&meta, &mut context, &graph, a, -1).is_empty());

    graph.get_mut(b).unwrap().set_property("name", "Bea");
    let plan = diff(&meta, &mut context, &graph, a, -1);
    assert_eq!(plan.plan.summary().nodes_updated, 1);
    assert_eq!(plan.plan.len(), 1);
}

#[test]
fn self_reference_creates_one_edge() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let a = graph.insert(person("A"));
    graph.get_mut(a).unwrap().add_related("friends", a);

    let plan = diff(&meta, &mut context, &graph, a, -1);
    let ops = &plan.plan.operations;
    assert_eq!(count(ops, is_create_node), 1);
    assert_eq!(count(ops, is_create_rel), 1);
}

#[test]
fn cycle_creates_one_edge_per_field_value() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let a = graph.insert(person("A"));
    let b = graph.insert(person("B"));
    graph.get_mut(a).unwrap().add_related("friends", b);
    graph.get_mut(b).unwrap().set_one("mentor", Some(a));

    let plan = diff(&meta, &mut context, &graph, a, -1);
    let ops = &plan.plan.operations;
    assert_eq!(count(ops, is_create_node), 2);
    assert_eq!(count(ops, is_create_rel), 2);

    let types: Vec<&str> = ops
        .iter()
        .filter_map(|op| match op {
            WriteOperation::CreateRel { rel_type, .. } => Some(rel_type.as_str()),
            _ => None,
        })
        .collect();
    assert!(types.contains(&"FRIEND"));
    assert!(types.contains(&"MENTORS"));
}

#[test]
fn mirrored_friends_create_one_edge() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let a = graph.insert(person("A"));
    let b = graph.insert(person("B"));
    graph.get_mut(a).unwrap().add_related("friends", b);
    graph.get_mut(b).unwrap().add_related("friends", a);

    let mut next_id = 1;
    let ops = save(&meta, &mut context, &mut graph, a, -1, &mut next_id);
    assert_eq!(count(&ops, is_create_rel), 1);

    assert!(!context.is_dirty(&meta, &graph, a));
    assert!(!context.is_dirty(&meta, &graph, b));
    assert!(diff(&meta, &mut context, &graph, a, -1).is_empty());
    assert!(diff(&meta, &mut context, &graph, b, -1).is_empty());
}

#[test]
fn mirrored_friends_between_existing_nodes_create_one_edge() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let model = GraphModel {
        nodes: vec![
            node(1, "Person", &[("name", "A".into())]),
            node(2, "Person", &[("name", "B".into())]),
        ],
        relationships: Vec::new(),
    };
    let loaded = hydrate(&meta, &mut context, &mut graph, &model, "Person");
    let (a, b) = (loaded[0], loaded[1]);
    graph.get_mut(a).unwrap().add_related("friends", b);
    graph.get_mut(b).unwrap().add_related("friends", a);

    let plan = diff(&meta, &mut context, &graph, a, -1);
    assert_eq!(count(&plan.plan.operations, is_create_rel), 1);
    assert_eq!(count(&plan.plan.operations, is_create_node), 0);
}

#[test]
fn horizon_zero_leaves_relationships_alone() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    loaded_world(&meta, &mut context, &mut graph);
    let a = context.node_entity(1).unwrap();
    let b = context.node_entity(2).unwrap();
    let c = graph.insert(person("C"));

    let entity = graph.get_mut(a).unwrap();
    entity.remove_related("friends", b);
    entity.add_related("friends", c);
    entity.set_property("name", "Alice");

    let plan = diff(&meta, &mut context, &graph, a, 0);
    let ops = &plan.plan.operations;
    assert_eq!(count(ops, is_relationship_op), 0);
    assert_eq!(plan.plan.summary().nodes_updated, 1);
    assert!(context.contains_relationship(&MappedRelationship::new(1, "FRIEND", 2, None, "", "")));
}

#[test]
fn removed_relationship_entity_is_deleted_by_id() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    loaded_world(&meta, &mut context, &mut graph);
    let a = context.node_entity(1).unwrap();
    let role = context.relationship_entity(12).unwrap();

    graph.get_mut(a).unwrap().remove_related("roles", role);
    let plan = diff(&meta, &mut context, &graph, a, 1);

    assert_eq!(
        plan.plan.operations,
        vec![WriteOperation::DeleteRel {
            start: 1,
            rel_type: "ACTED_IN".into(),
            end: 4,
            id: Some(12),
        }]
    );
    assert_eq!(context.relationship_entity(12), None);
    assert_eq!(context.node_entity(4), None);
}

#[test]
fn changed_relationship_entity_properties_update_the_edge() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    loaded_world(&meta, &mut context, &mut graph);
    let a = context.node_entity(1).unwrap();
    let role = context.relationship_entity(12).unwrap();

    graph.get_mut(role).unwrap().set_property("character", "Vincent");
    let plan = diff(&meta, &mut context, &graph, a, 1);

    match &plan.plan.operations[..] {
        [WriteOperation::MatchRel { id, properties, .. }] => {
            assert_eq!(*id, 12);
            assert_eq!(properties.get("character"), Some(&Value::from("Vincent")));
        }
        other => panic!("expected one edge update, got {other:?}"),
    }
}

#[test]
fn relationship_entity_with_new_end_is_recreated() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    loaded_world(&meta, &mut context, &mut graph);
    let extra = GraphModel {
        nodes: vec![node(5, "Movie", &[("title", "Ronin".into())])],
        relationships: Vec::new(),
    };
    hydrate(&meta, &mut context, &mut graph, &extra, "Movie");
    let ronin = context.node_entity(5).unwrap();
    let role = context.relationship_entity(12).unwrap();

    graph.get_mut(role).unwrap().end = Some(ronin);
    let plan = diff(&meta, &mut context, &graph, role, 1);
    let ops = plan.plan.operations.clone();
    assert_eq!(count(&ops, is_create_rel), 1);
    assert_eq!(
        ops.last(),
        Some(&WriteOperation::DeleteRel {
            start: 1,
            rel_type: "ACTED_IN".into(),
            end: 4,
            id: Some(12),
        })
    );
    assert_eq!(plan.id_resets, vec![(role, 12)]);

    let mut next_id = 500;
    let ack = acknowledge(&plan, &mut next_id);
    plan.commit(&ack, &mut graph, &mut context).unwrap();

    assert_eq!(graph.get(role).unwrap().id, Some(500));
    assert_eq!(context.relationship_entity(12), None);
    assert_eq!(context.relationship_entity(500), Some(role));
    assert!(context.contains_relationship(&MappedRelationship::new(1, "ACTED_IN", 5, Some(500), "", "")));
}

#[test]
fn removed_dynamic_label_is_dropped() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let model = GraphModel {
        nodes: vec![trellis_core::NodeRecord {
            id: 1,
            labels: vec!["Person".into(), "Admin".into()],
            properties: Default::default(),
        }],
        relationships: Vec::new(),
    };
    let a = hydrate(&meta, &mut context, &mut graph, &model, "Person")[0];
    assert!(graph.get(a).unwrap().labels.contains("Admin"));

    graph.get_mut(a).unwrap().labels.clear();
    let plan = diff(&meta, &mut context, &graph, a, 0);
    match &plan.plan.operations[..] {
        [WriteOperation::MatchNode {
            labels,
            removed_labels,
            ..
        }] => {
            assert_eq!(labels, &vec!["Person".to_string()]);
            assert_eq!(removed_labels, &vec!["Admin".to_string()]);
        }
        other => panic!("expected one node update, got {other:?}"),
    }
}

#[test]
fn undirected_relationship_is_stable() {
    let meta = MetaData::new(vec![ClassInfo::node("Person")
        .property("name")
        .relationship(RelationshipField::new("knows", "KNOWS", "Person").undirected())])
    .unwrap();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let model = GraphModel {
        nodes: vec![
            node(1, "Person", &[("name", "A".into())]),
            node(2, "Person", &[("name", "B".into())]),
        ],
        relationships: vec![rel(7, "KNOWS", 1, 2, &[])],
    };
    let loaded = hydrate(&meta, &mut context, &mut graph, &model, "Person");
    let (a, b) = (loaded[0], loaded[1]);
    assert_eq!(graph.get(b).unwrap().related_refs("knows"), vec![a]);

    assert!(!context.is_dirty(&meta, &graph, b));
    assert!(diff(&meta, &mut context, &graph, a, -1).is_empty());
    assert!(diff(&meta, &mut context, &graph, b, -1).is_empty());
}

#[test]
fn incoming_and_outgoing_sides_of_a_new_edge_collapse() {
    let meta = schema();
    let mut graph = ObjectGraph::new();
    let mut context = MappingContext::new();
    let p = graph.insert(person("P"));
    let acme = graph.insert(Entity::new("Company").with_property("name", "Acme"));
    graph.get_mut(p).unwrap().set_one("employer", Some(acme));
    graph.get_mut(acme).unwrap().add_related("employees", p);

    let plan = diff(&meta, &mut context, &graph, acme, -1);
    let creates: Vec<&WriteOperation> = plan
        .plan
        .operations
        .iter()
        .filter(|op| is_create_rel(op))
        .collect();
    assert_eq!(creates.len(), 1);
    match creates[0] {
        WriteOperation::CreateRel { start, end, .. } => {
            assert_eq!(*start, p.provisional_id());
            assert_eq!(*end, acme.provisional_id());
        }
        other => panic!("unexpected {other:?}"),
    }
}
