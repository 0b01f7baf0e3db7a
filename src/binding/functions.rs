//! Extension functions available to runtime expressions
//!
//! Registered as JEXL transforms, so they are called with pipe syntax:
//! `${ input.name|upper }`, `${ 0|uuid }`.
//!
//! `uuid` is non-deterministic. It is only ever reached through an
//! [`EvaluationWrapper`](super::EvaluationWrapper), which lets a replaying
//! substrate hand back the recorded identifier.

use jexl_eval::Evaluator as Jexl;
use serde_json::{json, Value};

/// Build a JEXL evaluator with every extension function registered
pub(crate) fn build_jexl() -> Jexl<'static> {
    Jexl::new()
        .with_transform("uuid", |_args: &[Value]| {
            Ok(json!(uuid::Uuid::new_v4().to_string()))
        })
        .with_transform("lower", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_lowercase()))
        })
        .with_transform("upper", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_uppercase()))
        })
        .with_transform("trim", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.trim()))
        })
        .with_transform("length", |args: &[Value]| {
            let len = match args.first() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                Some(Value::Object(o)) => o.len(),
                _ => 0,
            };
            Ok(json!(len as f64))
        })
        .with_transform("keys", |args: &[Value]| {
            let keys: Vec<&String> = match args.first() {
                Some(Value::Object(o)) => o.keys().collect(),
                _ => Vec::new(),
            };
            Ok(json!(keys))
        })
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_transform_is_v4() {
        let jexl = build_jexl();
        let value = jexl.eval_in_context("0|uuid", &json!({})).unwrap();
        let parsed = uuid::Uuid::parse_str(value.as_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_string_transforms() {
        let jexl = build_jexl();
        let ctx = json!({"name": "  Ada  "});
        assert_eq!(jexl.eval_in_context("name|trim|upper", &ctx).unwrap(), json!("ADA"));
    }

    #[test]
    fn test_length_and_keys() {
        let jexl = build_jexl();
        let ctx = json!({"items": [1, 2, 3], "obj": {"a": 1, "b": 2}});
        assert_eq!(
            jexl.eval_in_context("items|length", &ctx).unwrap().as_f64(),
            Some(3.0)
        );
        assert_eq!(
            jexl.eval_in_context("obj|keys", &ctx).unwrap(),
            json!(["a", "b"])
        );
    }
}
