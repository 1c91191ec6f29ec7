//! Planning documents and schemas read from disk.

use std::io::Write;

use trellis_core::MetaData;
use trellis_mapper::WriteOperation;
use trellis_sync::{plan_document, GraphDocument};

const SCHEMA: &str = r#"{
    "classes": [
        {"name": "Person", "properties": ["name"],
         "relationships": [
            {"name": "employer", "rel_type": "WORKS_AT", "target": "Company", "cardinality": "scalar"}
         ]},
        {"name": "Company", "properties": ["name"]}
    ]
}"#;

const DOCUMENT: &str = r#"{
    "objects": [
        {"key": "p", "class": "Person", "properties": {"name": "Ada"},
         "relationships": {"employer": ["c"]}},
        {"key": "c", "class": "Company", "properties": {"name": "Acme"}}
    ]
}"#;

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn plan_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let schema = MetaData::load(write(&dir, "schema.json", SCHEMA)).unwrap();
    let document = GraphDocument::load(write(&dir, "graph.json", DOCUMENT)).unwrap();

    let output = plan_document(&schema, &document, &["p".to_string()], -1).unwrap();
    assert_eq!(output.summary.nodes_created, 2);
    assert_eq!(output.summary.relationships_created, 1);

    let create = output
        .plan
        .operations
        .iter()
        .find_map(|op| match op {
            WriteOperation::CreateRel {
                rel_type, singleton, ..
            } => Some((rel_type.clone(), *singleton)),
            _ => None,
        })
        .unwrap();
    assert_eq!(create, ("WORKS_AT".to_string(), true));

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["plan"]["operations"][0]["op"], "create_node");
}

#[test]
fn horizon_zero_plans_only_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let schema = MetaData::load(write(&dir, "schema.json", SCHEMA)).unwrap();
    let document = GraphDocument::load(write(&dir, "graph.json", DOCUMENT)).unwrap();

    let output = plan_document(&schema, &document, &["p".to_string()], 0).unwrap();
    assert_eq!(output.plan.len(), 1);
    assert_eq!(output.summary.nodes_created, 1);
}
