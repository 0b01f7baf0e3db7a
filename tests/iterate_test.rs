//! Iteration over lists, objects and counts

mod common;

use braid::error::BraidError;
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_list_collects_body_outputs_in_order() {
    let yaml = r#"
document:
  name: doubles
do:
  - double:
      for:
        each: n
        in: ${ input.numbers }
      do:
        - calc:
            set:
              value: ${ data.n * 2 }
            export:
              as: ${ data.value }
      export:
        as: ${ result }
"#;
    let output = common::run(yaml, json!({"numbers": [1, 2, 3]})).await.unwrap();
    assert_eq!(output, json!([2, 4, 6]));
}

#[tokio::test]
async fn test_object_iterates_key_and_value() {
    let yaml = r#"
document:
  name: entries
do:
  - walk:
      for:
        at: key
        in:
          a: 1
          b: 2
      do:
        - pair:
            set:
              seen: true
            export:
              as: ${ [data.key, data.item] }
      export:
        as: ${ result }
"#;
    let output = common::run(yaml, json!({})).await.unwrap();
    assert_eq!(output, json!({"a": ["a", 1], "b": ["b", 2]}));
}

#[tokio::test]
async fn test_number_iterates_a_range() {
    let yaml = r#"
document:
  name: counting
do:
  - count:
      for:
        in: 3
      do:
        - echo:
            set:
              at: ${ data.index }
            export:
              as: ${ data.item }
      export:
        as: ${ result }
"#;
    assert_eq!(common::run(yaml, json!({})).await.unwrap(), json!([0, 1, 2]));
}

#[tokio::test]
async fn test_while_stops_iteration() {
    let yaml = r#"
document:
  name: bounded
do:
  - count:
      for:
        in: 10
      while: ${ data.index < 3 }
      do:
        - echo:
            set:
              seen: true
            export:
              as: ${ data.index }
      export:
        as: ${ result }
"#;
    assert_eq!(common::run(yaml, json!({})).await.unwrap(), json!([0, 1, 2]));
}

#[tokio::test]
async fn test_iterations_do_not_leak_into_parent() {
    let yaml = r#"
document:
  name: scoped
do:
  - loop:
      for:
        in: [x, y]
      do:
        - mark:
            set:
              marked: ${ data.item }
  - check:
      set:
        done: true
      export:
        as: ${ data }
"#;
    let data = common::run(yaml, json!({})).await.unwrap();
    assert!(data.get("marked").is_none());
    assert!(data.get("item").is_none());
    assert_eq!(data["loop"], json!([null, null]));
}

#[tokio::test]
async fn test_string_source_is_not_iterable() {
    let yaml = r#"
document:
  name: bad_source
do:
  - loop:
      for:
        in: ${ input.name }
      do:
        - noop:
            set:
              x: 1
"#;
    let err = common::run(yaml, json!({"name": "ada"})).await.unwrap_err();
    assert!(matches!(err, BraidError::NotIterable { .. }));
}
