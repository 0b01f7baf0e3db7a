//! Builder registry - task tag → builder constructor
//!
//! The set of supported task kinds is open: callers register extra tags
//! before compiling. Unknown tags fail the build with `UnsupportedTask`.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::compiler::Compiler;
use super::Executable;
use crate::ast::Task;
use crate::error::{BraidError, Result};

/// Turns one named task into an executable
pub trait TaskBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Run this task even while a resumed run is still skipping towards its marker
    fn never_skip_on_resume(&self) -> bool {
        false
    }

    /// `parent` is the name of the graph this task belongs to
    fn build(&self, compiler: &Compiler, parent: &str) -> Result<Arc<dyn Executable>>;
}

/// Constructor registered for a tag
pub type BuilderFn =
    Arc<dyn Fn(&str, &Arc<Task>) -> Result<Box<dyn TaskBuilder>> + Send + Sync>;

#[derive(Clone)]
pub struct BuilderRegistry {
    builders: FxHashMap<String, BuilderFn>,
}

impl Default for BuilderRegistry {
    /// Registry with every built-in task kind
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("do", super::sequence::DoBuilder::boxed);
        registry.register("for", super::iterate::ForBuilder::boxed);
        registry.register("fork", super::fork::ForkBuilder::boxed);
        registry.register("switch", super::switch::SwitchBuilder::boxed);
        registry.register("try", super::try_catch::TryBuilder::boxed);
        registry.register("call", super::call::CallBuilder::boxed);
        registry.register("run", super::run::RunBuilder::boxed);
        registry.register("wait", super::wait::WaitBuilder::boxed);
        registry.register("raise", super::raise::RaiseBuilder::boxed);
        registry.register("listen", super::listen::ListenBuilder::boxed);
        registry.register("set", super::set::SetBuilder::boxed);
        registry
    }
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.builders.keys().collect();
        tags.sort();
        f.debug_struct("BuilderRegistry").field("tags", &tags).finish()
    }
}

impl BuilderRegistry {
    pub fn empty() -> Self {
        Self {
            builders: FxHashMap::default(),
        }
    }

    /// Register (or replace) the constructor for `tag`
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&str, &Arc<Task>) -> Result<Box<dyn TaskBuilder>> + Send + Sync + 'static,
    {
        self.builders.insert(tag.into(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.builders.contains_key(tag)
    }

    /// Builder for a task, chosen by its tag
    pub fn builder_for(&self, name: &str, task: &Arc<Task>) -> Result<Box<dyn TaskBuilder>> {
        let tag = task.tag();
        let constructor = self
            .builders
            .get(tag)
            .ok_or_else(|| BraidError::UnsupportedTask {
                task: name.to_string(),
                tag: tag.to_string(),
            })?;
        constructor(name, task)
    }
}

/// `InvalidTask` for a builder handed the wrong variant
pub(crate) fn wrong_variant(name: &str, expected: &str, task: &Task) -> BraidError {
    BraidError::InvalidTask {
        task: name.to_string(),
        reason: format!("expected a '{}' task, found '{}'", expected, task.tag()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{TaskBase, TaskDefinition};
    use serde_json::json;

    fn task(definition: TaskDefinition) -> Arc<Task> {
        Arc::new(Task {
            base: TaskBase::default(),
            definition,
        })
    }

    #[test]
    fn test_default_registry_covers_builtin_tags() {
        let registry = BuilderRegistry::default();
        for tag in [
            "do",
            "for",
            "fork",
            "switch",
            "try",
            "call",
            "run",
            "wait",
            "raise",
            "listen",
            "set",
        ] {
            assert!(registry.contains(tag), "missing {tag}");
        }
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let registry = BuilderRegistry::default();
        let t = task(TaskDefinition::Other {
            tag: "emit".into(),
            body: json!({}),
        });
        let err = registry.builder_for("announce", &t).err().unwrap();
        assert!(matches!(
            err,
            BraidError::UnsupportedTask { ref task, ref tag } if task == "announce" && tag == "emit"
        ));
    }

    #[test]
    fn test_empty_registry_rejects_builtins() {
        let registry = BuilderRegistry::empty();
        let t = task(TaskDefinition::Set(json!({"a": 1})));
        assert!(registry.builder_for("s", &t).is_err());
    }
}
