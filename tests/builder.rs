//! Tests for diagram JSON parsing: opcode splitting, markers, fields,
//! placeholder blocks and the empty-content classification.
mod common;
use common::*;
use kairo::prelude::*;
use serde_json::json;

#[test]
fn test_parse_splits_opcode_and_reads_markers() {
    let content = diagram_json(json!({
        "a": {
            "opcode": "hardware_beep",
            "topLevel": true,
            "shadow": false,
            "parent": null,
            "next": null,
            "fields": {},
            "inputs": {}
        }
    }));
    let diagram = Diagram::parse("tab1", &content).expect("Failed to parse diagram");

    assert_eq!(diagram.tab_id(), "tab1");
    assert_eq!(diagram.len(), 1);
    let block = diagram.block("a").expect("block 'a' missing");
    assert_eq!(block.extension_id(), "hardware");
    assert_eq!(block.opcode(), "beep");
    assert!(block.is_top_level());
    assert!(!block.is_shadow());
    assert!(block.next_id().is_none());
}

#[test]
fn test_opcode_without_namespace_gets_empty_extension() {
    let content = diagram_json(json!({
        "a": { "opcode": "beep", "topLevel": false }
    }));
    let diagram = Diagram::parse("tab1", &content).expect("Failed to parse diagram");
    let block = diagram.block("a").expect("block 'a' missing");
    assert_eq!(block.extension_id(), "");
    assert_eq!(block.opcode(), "beep");
}

#[test]
fn test_fields_carry_value_and_backing_id() {
    let content = diagram_json(json!({
        "a": {
            "opcode": "data_set_variable",
            "topLevel": true,
            "fields": {
                "VARIABLE": ["temperature", "var-17"],
                "MODE": ["append"]
            }
        }
    }));
    let diagram = Diagram::parse("tab1", &content).expect("Failed to parse diagram");
    let block = diagram.block("a").expect("block 'a' missing");

    let variable = block.field("VARIABLE").expect("VARIABLE field missing");
    assert_eq!(variable.value, Value::Text("temperature".to_string()));
    assert_eq!(variable.id.as_deref(), Some("var-17"));

    let mode = block.field("MODE").expect("MODE field missing");
    assert_eq!(mode.value, Value::Text("append".to_string()));
    assert!(mode.id.is_none());
}

#[test]
fn test_missing_next_target_becomes_placeholder() {
    let content = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true, "next": "ghost" }
    }));
    let diagram = Diagram::parse("tab1", &content).expect("Failed to parse diagram");

    assert_eq!(diagram.len(), 2);
    let ghost = diagram.block("ghost").expect("placeholder missing");
    assert!(!ghost.is_top_level());
    assert_eq!(ghost.opcode(), "");
}

#[test]
fn test_non_object_entries_are_skipped() {
    let content = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true },
        "stray": ["not", "a", "block"]
    }));
    let diagram = Diagram::parse("tab1", &content).expect("Failed to parse diagram");
    assert_eq!(diagram.len(), 1);
    assert!(diagram.block("stray").is_none());
}

#[test]
fn test_missing_top_level_marker_is_an_error() {
    let content = diagram_json(json!({
        "a": { "opcode": "test_step" }
    }));
    let err = Diagram::parse("tab1", &content).expect_err("parse should fail");
    match err {
        BuildError::MissingBlockKey { block_id, key } => {
            assert_eq!(block_id, "a");
            assert_eq!(key, "topLevel");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_blocks_object_is_an_error() {
    let err = Diagram::parse("tab1", r#"{"target": {}}"#).expect_err("parse should fail");
    assert!(matches!(err, BuildError::MissingTarget));
}

#[test]
fn test_garbage_is_a_parse_error() {
    let err = Diagram::parse("tab1", "{not json").expect_err("parse should fail");
    assert!(matches!(err, BuildError::JsonParse(_)));
}

#[test]
fn test_empty_content_classification() {
    assert!(Engine::is_empty_content(""));
    assert!(Engine::is_empty_content("   \n"));
    assert!(Engine::is_empty_content(r#"{"target": {}}"#));
    assert!(Engine::is_empty_content(
        r#"{"target": {"blocks": {}, "comments": {}}}"#
    ));

    // Malformed content and content without a target object are not empty;
    // the parser must reject them instead.
    assert!(!Engine::is_empty_content("{not json"));
    assert!(!Engine::is_empty_content(r#"{"foo": 1}"#));

    let with_comment = r#"{"target": {"blocks": {}, "comments": {"c1": {}}}}"#;
    assert!(!Engine::is_empty_content(with_comment));

    let with_block = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true }
    }));
    assert!(!Engine::is_empty_content(&with_block));
}
