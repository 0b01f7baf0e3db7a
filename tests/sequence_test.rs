//! Sequence execution: ordering, guards, flow directives, exports

mod common;

use braid::error::BraidError;
use pretty_assertions::assert_eq;
use serde_json::json;

// =============================================================================
// ORDER AND DATA
// =============================================================================

#[tokio::test]
async fn test_tasks_run_in_order_and_see_earlier_results() {
    let yaml = r#"
document:
  name: ordered
do:
  - first:
      set:
        value: 1
  - second:
      set:
        value: ${ data.first.value + 1 }
  - third:
      set:
        value: ${ data.second.value + 1 }
      export:
        as: ${ [data.first.value, data.second.value, data.third.value] }
"#;
    let output = common::run(yaml, json!({})).await.unwrap();
    assert_eq!(output, json!([1, 2, 3]));
}

#[tokio::test]
async fn test_set_merges_keys_into_data() {
    let yaml = r#"
document:
  name: merge
do:
  - defaults:
      set:
        region: eu
        zone: west
  - report:
      set:
        summary: ${ data.region + '/' + data.zone }
      export:
        as: ${ data.summary }
"#;
    let output = common::run(yaml, json!({})).await.unwrap();
    assert_eq!(output, json!("eu/west"));
}

#[tokio::test]
async fn test_export_sees_task_and_result_bindings() {
    let yaml = r#"
document:
  name: bindings
do:
  - compute:
      set:
        n: ${ input.n * 2 }
      export:
        as:
          name: ${ task.name }
          value: ${ result.n }
"#;
    let output = common::run(yaml, json!({"n": 21})).await.unwrap();
    assert_eq!(output, json!({"name": "compute", "value": 42}));
}

// =============================================================================
// GUARDS
// =============================================================================

#[tokio::test]
async fn test_false_guard_skips_task() {
    let yaml = r#"
document:
  name: guarded
do:
  - maybe:
      if: ${ input.enabled }
      set:
        ran: true
  - report:
      set:
        checked: true
      export:
        as: ${ data }
"#;
    let skipped = common::run(yaml, json!({"enabled": false})).await.unwrap();
    assert!(skipped.get("maybe").is_none());
    assert_eq!(skipped["checked"], json!(true));

    let ran = common::run(yaml, json!({"enabled": true})).await.unwrap();
    assert_eq!(ran["maybe"], json!({"ran": true}));
}

#[tokio::test]
async fn test_literal_false_guard() {
    let yaml = r#"
document:
  name: literal
do:
  - never:
      if: false
      raise:
        error:
          type: unreachable
  - done:
      set:
        ok: true
      export:
        as: ${ data.ok }
"#;
    assert_eq!(common::run(yaml, json!({})).await.unwrap(), json!(true));
}

#[tokio::test]
async fn test_non_boolean_guard_fails_run() {
    let yaml = r#"
document:
  name: bad_guard
do:
  - weird:
      if: ${ input.count }
      set:
        x: 1
"#;
    let err = common::run(yaml, json!({"count": 3})).await.unwrap_err();
    assert!(matches!(err, BraidError::GuardNotBoolean { .. }));
}

// =============================================================================
// FLOW DIRECTIVES
// =============================================================================

#[tokio::test]
async fn test_then_jumps_forward() {
    let yaml = r#"
document:
  name: jump
do:
  - start:
      set:
        trail: start
      then: finish
  - skipped:
      set:
        trail: skipped
  - finish:
      set:
        reached: true
      export:
        as: ${ data }
"#;
    let data = common::run(yaml, json!({})).await.unwrap();
    assert_eq!(data["trail"], json!("start"));
    assert!(data.get("skipped").is_none());
    assert_eq!(data["reached"], json!(true));
}

#[tokio::test]
async fn test_then_end_stops_sequence() {
    let yaml = r#"
document:
  name: stop
do:
  - only:
      set:
        done: true
      export:
        as: stopped early
      then: end
  - never:
      raise:
        error:
          type: unreachable
"#;
    assert_eq!(
        common::run(yaml, json!({})).await.unwrap(),
        json!("stopped early")
    );
}

#[tokio::test]
async fn test_backward_target_is_not_found() {
    let yaml = r#"
document:
  name: backwards
do:
  - first:
      set:
        a: 1
  - second:
      set:
        b: 2
      then: first
"#;
    let err = common::run(yaml, json!({})).await.unwrap_err();
    match err {
        BraidError::FlowTargetNotFound { target } => assert_eq!(target, "first"),
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// NESTED DO / INPUT SCHEMA
// =============================================================================

#[tokio::test]
async fn test_nested_do_shares_state() {
    let yaml = r#"
document:
  name: nested
do:
  - outer:
      do:
        - inner:
            set:
              deep: found
            export:
              as: ${ data.deep }
  - check:
      set:
        seen: ${ data.inner.deep }
      export:
        as: ${ [data.seen, data.outer] }
"#;
    assert_eq!(
        common::run(yaml, json!({})).await.unwrap(),
        json!(["found", "found"])
    );
}

#[tokio::test]
async fn test_workflow_input_schema_rejects_bad_input() {
    let yaml = r#"
document:
  name: typed
input:
  schema:
    type: object
    required: [email]
do:
  - hello:
      set:
        to: ${ input.email }
"#;
    let err = common::run(yaml, json!({"name": "ada"})).await.unwrap_err();
    assert!(matches!(err, BraidError::InputValidation { .. }));
    assert!(common::run(yaml, json!({"email": "a@b.c"})).await.is_ok());
}

#[tokio::test]
async fn test_task_input_schema_stops_the_sequence() {
    let yaml = r#"
document:
  name: task_schema
do:
  - greet:
      set:
        greeting: hi
  - checked:
      input:
        schema:
          type: object
          properties:
            age:
              type: integer
      set:
        adult: ${ input.age >= 18 }
  - after:
      call: activity
      with:
        name: never
"#;
    let calls = common::Counter::default();
    let counter = calls.clone();
    let substrate = common::substrate(yaml)
        .activity("never", move |_args| {
            counter.bump();
            async { Ok(json!(null)) }
        })
        .build()
        .unwrap();

    let err = substrate.run(json!({"age": "old"})).await.unwrap_err();
    assert!(!err.is_retryable());
    match err {
        BraidError::InputValidation { task, violations } => {
            assert_eq!(task, "checked");
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].path, "/age");
            assert!(!violations[0].message.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.get(), 0);
}
