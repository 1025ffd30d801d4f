//! Tests for chain scheduling: execution order, failure handling, hat
//! semantics, once-execution blocks and reload cancellation.
mod common;
use common::*;
use kairo::prelude::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_chain_runs_in_order_and_finishes() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true, "next": "b" },
        "b": { "opcode": "test_step", "topLevel": false, "parent": "a", "next": "c" },
        "c": { "opcode": "test_step", "topLevel": false, "parent": "b" }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    engine.join_tab("tab1").await;

    assert_eq!(trace.snapshot(), vec!["step:a", "step:b", "step:c"]);
}

#[tokio::test]
async fn test_handler_failure_stops_chain_and_is_reported() {
    let trace = Trace::new();
    let sink = RecordingSink::new();
    let engine = test_engine_with_sink(&trace, sink.clone());

    let content = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true, "next": "b" },
        "b": { "opcode": "test_fail", "topLevel": false, "parent": "a", "next": "c" },
        "c": { "opcode": "test_step", "topLevel": false, "parent": "b" }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    engine.join_tab("tab1").await;

    assert_eq!(trace.snapshot(), vec!["step:a"]);
    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("boom"), "unexpected report: {}", errors[0]);
}

#[tokio::test]
async fn test_unknown_opcode_is_reported_not_fatal() {
    let trace = Trace::new();
    let sink = RecordingSink::new();
    let engine = test_engine_with_sink(&trace, sink.clone());

    let content = diagram_json(json!({
        "a": { "opcode": "test_no_such_thing", "topLevel": true },
        "x": { "opcode": "test_step", "topLevel": true }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    engine.join_tab("tab1").await;

    // The healthy chain still ran.
    assert_eq!(trace.snapshot(), vec!["step:x"]);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test]
async fn test_shadow_top_level_is_not_scheduled() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true, "shadow": true }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    engine.join_tab("tab1").await;

    assert!(trace.snapshot().is_empty());
}

#[tokio::test]
async fn test_once_opcode_runs_inline_during_load() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "link": {
            "opcode": "data_boolean_link",
            "topLevel": true,
            "fields": { "VARIABLE": ["switch", "var-7"] },
            "inputs": { "ITEM": [2, "target"] }
        },
        "target": { "opcode": "test_linkable", "topLevel": false }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");

    // No join needed; once blocks finish before load returns.
    assert_eq!(trace.snapshot(), vec!["linked:var-7"]);
}

#[tokio::test]
async fn test_hat_waits_for_signal_and_reruns_its_chain() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "hat": {
            "opcode": "event_got_broadcast",
            "topLevel": true,
            "next": "s1",
            "fields": { "BROADCAST_OPTION": ["sunrise"] }
        },
        "s1": { "opcode": "test_step", "topLevel": false, "parent": "hat" }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(trace.snapshot().is_empty(), "hat must not auto-run its chain");

    engine.signal("tab1", "sunrise", Value::Null).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trace.snapshot(), vec!["step:s1"]);

    engine.signal("tab1", "sunrise", Value::Null).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trace.snapshot(), vec!["step:s1", "step:s1"]);
}

#[tokio::test]
async fn test_reload_cancels_blocked_chain() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "w": { "opcode": "test_wait", "topLevel": true }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(trace.snapshot(), vec!["parked"]);

    let replacement = diagram_json(json!({
        "a": { "opcode": "test_step", "topLevel": true }
    }));
    engine
        .load("tab1", &replacement)
        .await
        .expect("Failed to reload diagram");
    engine.join_tab("tab1").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let log = trace.snapshot();
    assert!(log.contains(&"stopped".to_string()), "old chain not woken: {log:?}");
    assert!(log.contains(&"step:a".to_string()), "new chain did not run: {log:?}");
}

#[tokio::test]
async fn test_empty_content_tears_the_tab_down() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "w": { "opcode": "test_wait", "topLevel": true }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_loaded("tab1").await);

    engine
        .load("tab1", "")
        .await
        .expect("Failed to unload diagram");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!engine.is_loaded("tab1").await);
    assert_eq!(trace.snapshot(), vec!["parked", "stopped"]);
}

#[tokio::test]
async fn test_missing_target_reload_leaves_old_diagram_running() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "w": { "opcode": "test_wait", "topLevel": true }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Valid JSON but no target object: a build error, not empty content.
    let err = engine
        .load("tab1", r#"{"foo": 1}"#)
        .await
        .expect_err("reload without a target should fail");
    assert!(matches!(err, BuildError::MissingTarget));

    assert!(engine.is_loaded("tab1").await);
    assert_eq!(trace.snapshot(), vec!["parked"]);
}

#[tokio::test]
async fn test_concurrent_reloads_do_not_leak_chains() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "w": { "opcode": "test_wait", "topLevel": true }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (first, second) = tokio::join!(
        engine.load("tab1", &content),
        engine.load("tab1", &content)
    );
    first.expect("first reload failed");
    second.expect("second reload failed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine.release_all().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Every chain that parked on the lock must have been woken by teardown.
    let log = trace.snapshot();
    let parked = log.iter().filter(|entry| *entry == "parked").count();
    let stopped = log.iter().filter(|entry| *entry == "stopped").count();
    assert_eq!(parked, stopped, "a parked chain survived teardown: {log:?}");
    assert!(!engine.is_loaded("tab1").await);
}

#[tokio::test]
async fn test_malformed_reload_leaves_old_diagram_running() {
    let trace = Trace::new();
    let engine = test_engine(&trace);

    let content = diagram_json(json!({
        "hat": {
            "opcode": "event_got_broadcast",
            "topLevel": true,
            "next": "s1",
            "fields": { "BROADCAST_OPTION": ["ping"] }
        },
        "s1": { "opcode": "test_step", "topLevel": false, "parent": "hat" }
    }));
    engine
        .load("tab1", &content)
        .await
        .expect("Failed to load diagram");
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine
        .load("tab1", "{not json")
        .await
        .expect_err("malformed reload should fail");

    // The old diagram still answers signals.
    assert!(engine.is_loaded("tab1").await);
    engine.signal("tab1", "ping", Value::Null).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trace.snapshot(), vec!["step:s1"]);
}
