//! Property-based tests for expression handling and workflow parsing
//!
//! Coverage targets:
//! - Expression detection and traversal (binding/evaluate.rs)
//! - Duration parsing (ast/duration.rs)
//! - Workflow YAML parsing (ast/workflow.rs)

use proptest::prelude::*;
use serde_json::{json, Map, Value};

// =============================================================================
// TEST 1: Traversal
// =============================================================================
// Target: src/binding/evaluate.rs
// Risk: expression-free structures must come back untouched

mod traversal_fuzzing {
    use super::*;
    use braid::binding::{is_runtime_expression, Evaluator};
    use braid::store::ExecutionState;

    fn arb_plain_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _.-]{0,20}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    proptest! {
        /// Property: structures without `${` are returned unchanged
        #[test]
        fn test_plain_values_are_identity(value in arb_plain_value()) {
            let evaluator = Evaluator::new();
            let state = ExecutionState::default();
            let out = evaluator.traverse_and_evaluate(value.clone(), &state).unwrap();
            prop_assert_eq!(out, value);
        }

        /// Property: detection never panics and only fires on `${...}`
        #[test]
        fn test_detection_requires_delimiters(s in ".*") {
            let detected = is_runtime_expression(&s);
            let trimmed = s.trim();
            prop_assert_eq!(detected, trimmed.starts_with("${") && trimmed.ends_with('}'));
        }

        /// Property: evaluation of arbitrary expression bodies never panics
        #[test]
        fn test_evaluation_never_panics(body in "[a-z0-9 +*/<>=!.-]{0,30}") {
            let evaluator = Evaluator::new();
            let state = ExecutionState::new(json!({"n": 1}), Default::default());
            let _ = evaluator.evaluate(&format!("${{ {} }}", body), &state);
        }

        /// Property: integer arithmetic on input comes back as an integer
        #[test]
        fn test_integer_sums_stay_integers(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let evaluator = Evaluator::new();
            let state = ExecutionState::new(json!({"a": a, "b": b}), Default::default());
            let out = evaluator.evaluate("${ input.a + input.b }", &state).unwrap();
            prop_assert_eq!(out, json!(a + b));
        }
    }
}

// =============================================================================
// TEST 2: Durations
// =============================================================================
// Target: src/ast/duration.rs

mod duration_fuzzing {
    use super::*;
    use braid::ast::DurationSpec;
    use std::time::Duration;

    proptest! {
        /// Property: inline millisecond durations convert exactly
        #[test]
        fn test_milliseconds_convert(ms in 0u64..10_000_000) {
            let spec: DurationSpec = serde_json::from_value(json!({"milliseconds": ms})).unwrap();
            prop_assert_eq!(spec.to_duration().unwrap(), Duration::from_millis(ms));
        }

        /// Property: parsing arbitrary strings never panics
        #[test]
        fn test_iso_parsing_never_panics(s in "[PTDHMS0-9.]{0,12}") {
            if let Ok(spec) = serde_json::from_value::<DurationSpec>(json!(s)) {
                let _ = spec.to_duration();
            }
        }
    }
}

// =============================================================================
// TEST 3: Workflow parsing
// =============================================================================
// Target: src/ast/workflow.rs

mod workflow_fuzzing {
    use super::*;
    use braid::ast::Workflow;

    proptest! {
        /// Property: arbitrary YAML never panics the parser
        #[test]
        fn test_parse_never_panics(yaml in ".{0,200}") {
            let _ = Workflow::from_yaml(&yaml);
        }

        /// Property: generated set-only workflows parse with every task in order
        #[test]
        fn test_generated_task_lists_parse(names in prop::collection::btree_set("t_[a-z0-9_]{0,10}", 1..8)) {
            let mut yaml = String::from("document:\n  name: generated\ndo:\n");
            for name in &names {
                yaml.push_str(&format!("  - {name}:\n      set:\n        value: 1\n"));
            }
            let workflow = Workflow::from_yaml(&yaml).unwrap();
            let parsed: Vec<_> = workflow.tasks.iter().map(|item| item.name.clone()).collect();
            let expected: Vec<_> = names.into_iter().collect();
            prop_assert_eq!(parsed, expected);
        }
    }
}
