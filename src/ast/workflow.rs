//! Workflow document
//!
//! ```yaml
//! document:
//!   name: onboarding
//!   version: 1.0.0
//! input:
//!   schema:
//!     type: object
//!     required: [email]
//! do:
//!   - ...
//! ```

use std::path::Path;

use serde::Deserialize;

use super::task::{InputSpec, TaskList, TimeoutSpec};
use crate::error::{BraidError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    pub document: DocumentMeta,
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default)]
    pub timeout: Option<TimeoutSpec>,
    #[serde(rename = "do")]
    pub tasks: TaskList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentMeta {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Workflow {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let workflow: Workflow = serde_yaml::from_str(yaml).map_err(|e| BraidError::ParseError {
            details: e.to_string(),
        })?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BraidError::WorkflowNotFound {
                path: path.display().to_string(),
            });
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn name(&self) -> &str {
        &self.document.name
    }

    /// Document-level checks that do not need the builder registry
    pub fn validate(&self) -> Result<()> {
        if self.document.name.trim().is_empty() {
            return Err(BraidError::InvalidDocument {
                reason: "document.name must not be empty".to_string(),
            });
        }
        if self.tasks.is_empty() {
            return Err(BraidError::InvalidDocument {
                reason: format!("workflow '{}' has no tasks", self.document.name),
            });
        }
        Ok(())
    }

    /// Input schema of the whole document, if any
    pub fn input_schema(&self) -> Option<&serde_json::Value> {
        self.input.as_ref().and_then(|i| i.schema.as_ref())
    }
}

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
document:
  name: greeting
  version: 0.1.0
input:
  schema:
    type: object
    required: [name]
do:
  - hello:
      set:
        message: hi
"#;

    #[test]
    fn test_parse_document() {
        let workflow = Workflow::from_yaml(YAML).unwrap();
        assert_eq!(workflow.name(), "greeting");
        assert_eq!(workflow.tasks.len(), 1);
        assert!(workflow.input_schema().is_some());
    }

    #[test]
    fn test_empty_task_list_rejected() {
        let err = Workflow::from_yaml("document:\n  name: x\ndo: []\n").unwrap_err();
        assert_eq!(err.code(), "BRAID-003");
    }

    #[test]
    fn test_parse_error_code() {
        let err = Workflow::from_yaml("document: [").unwrap_err();
        assert_eq!(err.code(), "BRAID-001");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let workflow = Workflow::from_file(file.path()).unwrap();
        assert_eq!(workflow.name(), "greeting");
    }

    #[test]
    fn test_missing_file() {
        let err = Workflow::from_file("/nonexistent/flow.yaml").unwrap_err();
        assert_eq!(err.code(), "BRAID-002");
    }
}
