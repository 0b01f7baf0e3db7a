//! Input Schema Validator
//!
//! Validates task and workflow inputs against inline JSON Schemas.
//!
//! ## Design
//!
//! - `SchemaValidator` is the seam: any implementation returning violations works
//! - `JsonSchemaValidator` compiles schemas with the `jsonschema` crate and caches
//!   them by their serialized form, so a schema inside a loop body compiles once
//!
//! ## Usage
//!
//! ```rust,ignore
//! use braid::ast::schema_validator::{JsonSchemaValidator, SchemaValidator};
//!
//! let validator = JsonSchemaValidator::new();
//! validator.validate("greet", &input, &schema)?;
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BraidError, Result};

/// One schema violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer into the validated value (e.g., "/user/name")
    pub path: String,
    /// Human-readable error message
    pub message: String,
}

/// Validates a value against a schema
pub trait SchemaValidator: Send + Sync {
    /// Every violation of `schema` by `value` (empty when valid)
    fn violations(&self, value: &Value, schema: &Value) -> Result<Vec<SchemaViolation>>;

    /// Fail with a non-retryable validation error naming `subject`
    fn validate(&self, subject: &str, value: &Value, schema: &Value) -> Result<()> {
        let violations = self.violations(value, schema)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(BraidError::InputValidation {
                task: subject.to_string(),
                violations,
            })
        }
    }
}

/// `jsonschema`-backed validator with a compiled-schema cache
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: DashMap<String, Arc<Validator>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, schema: &Value) -> Result<Arc<Validator>> {
        let key = schema.to_string();
        if let Some(found) = self.compiled.get(&key) {
            return Ok(Arc::clone(found.value()));
        }

        let validator = jsonschema::validator_for(schema).map_err(|e| BraidError::InvalidSchema {
            reason: e.to_string(),
        })?;
        let validator = Arc::new(validator);
        self.compiled.insert(key, Arc::clone(&validator));
        Ok(validator)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn violations(&self, value: &Value, schema: &Value) -> Result<Vec<SchemaViolation>> {
        let validator = self.compile(schema)?;
        let violations = validator
            .iter_errors(value)
            .map(|e| SchemaViolation {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        Ok(violations)
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer" }
            }
        })
    }

    #[test]
    fn test_valid_input_passes() {
        let validator = JsonSchemaValidator::new();
        let result = validator.validate("greet", &json!({"name": "ada"}), &person_schema());
        assert!(result.is_ok());
    }

    #[test]
    fn test_violation_carries_detail() {
        let validator = JsonSchemaValidator::new();
        let err = validator
            .validate("greet", &json!({"age": "old"}), &person_schema())
            .unwrap_err();

        match err {
            BraidError::InputValidation { task, violations } => {
                assert_eq!(task, "greet");
                assert_eq!(violations.len(), 2);
                assert!(violations.iter().any(|v| v.path == "/age"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schema_compiled_once() {
        let validator = JsonSchemaValidator::new();
        let schema = person_schema();
        validator.violations(&json!({"name": "a"}), &schema).unwrap();
        validator.violations(&json!({"name": "b"}), &schema).unwrap();
        assert_eq!(validator.compiled.len(), 1);
    }

    #[test]
    fn test_invalid_schema_is_reported() {
        let validator = JsonSchemaValidator::new();
        let err = validator
            .violations(&json!(1), &json!({"type": 12}))
            .unwrap_err();
        assert_eq!(err.code(), "BRAID-031");
    }
}
