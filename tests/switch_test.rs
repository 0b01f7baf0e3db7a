//! Switch dispatch to named sub-graphs

mod common;

use braid::ast::Workflow;
use braid::error::BraidError;
use braid::runtime::Program;
use pretty_assertions::assert_eq;
use serde_json::json;

const ROUTER: &str = r#"
document:
  name: router
do:
  - handlers:
      if: false
      do:
        - handleA:
            do:
              - markA:
                  set:
                    handled: A
                  export:
                    as: ${ data.handled }
        - handleB:
            do:
              - markB:
                  set:
                    handled: B
                  export:
                    as: ${ data.handled }
        - fallback:
            do:
              - markC:
                  set:
                    handled: C
                  export:
                    as: ${ data.handled }
  - route:
      switch:
        - isA:
            when: ${ input.kind == 'a' }
            then: handleA
        - isB:
            when: ${ input.kind == 'b' }
            then: handleB
        - other:
            then: fallback
      export:
        as: ${ result }
"#;

#[tokio::test]
async fn test_first_matching_case_runs_its_target() {
    assert_eq!(common::run(ROUTER, json!({"kind": "a"})).await.unwrap(), json!("A"));
    assert_eq!(common::run(ROUTER, json!({"kind": "b"})).await.unwrap(), json!("B"));
}

#[tokio::test]
async fn test_default_case_catches_the_rest() {
    assert_eq!(common::run(ROUTER, json!({"kind": "z"})).await.unwrap(), json!("C"));
}

#[tokio::test]
async fn test_target_writes_stay_in_its_scope() {
    let yaml = r#"
document:
  name: scoped_switch
do:
  - handlers:
      if: false
      do:
        - writer:
            do:
              - touch:
                  set:
                    touched: true
  - route:
      switch:
        - always:
            then: writer
  - check:
      set:
        done: true
      export:
        as: ${ data }
"#;
    let data = common::run(yaml, json!({})).await.unwrap();
    assert!(data.get("touched").is_none());
    assert!(data.get("route").is_none());
}

#[test]
fn test_two_default_cases_rejected() {
    let yaml = r#"
document:
  name: ambiguous
do:
  - handlers:
      if: false
      do:
        - one:
            do:
              - a:
                  set:
                    x: 1
  - route:
      switch:
        - first:
            then: one
        - second:
            then: one
"#;
    let workflow = Workflow::from_yaml(yaml).unwrap();
    let err = Program::compile(&workflow).unwrap_err();
    assert!(matches!(err, BraidError::DuplicateSwitchDefault { .. }));
}

#[test]
fn test_unknown_target_rejected_at_compile_time() {
    let yaml = r#"
document:
  name: dangling
do:
  - route:
      switch:
        - only:
            when: ${ input.go }
            then: nowhere
"#;
    let workflow = Workflow::from_yaml(yaml).unwrap();
    match Program::compile(&workflow).unwrap_err() {
        BraidError::UnknownSubGraph { task, name } => {
            assert_eq!(task, "route");
            assert_eq!(name, "nowhere");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_later_cases_are_never_evaluated() {
    let yaml = r#"
document:
  name: short_circuit
do:
  - handlers:
      if: false
      do:
        - targetA:
            do:
              - a:
                  set:
                    picked: A
                  export:
                    as: ${ data.picked }
        - targetB:
            do:
              - b:
                  set:
                    picked: B
                  export:
                    as: ${ data.picked }
  - route:
      switch:
        - never:
            when: ${ false }
            then: targetA
        - taken:
            when: ${ true }
            then: targetB
        - unreachable:
            when: ${ input.missing.field }
            then: targetA
      export:
        as: ${ result }
"#;
    // The last guard is not a boolean and would fail the run if reached
    assert_eq!(common::run(yaml, json!({})).await.unwrap(), json!("B"));
}
