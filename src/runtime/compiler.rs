//! Compiler - workflow document → program of named sub-graphs
//!
//! Compilation is eager and fails on the first structural problem:
//! duplicate sibling names, `then` targets that name no sibling, unsupported
//! tags, malformed variants, and references to sub-graphs that were never
//! registered.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::context::ExecContext;
use super::registry::BuilderRegistry;
use super::sequence::{Checkpointing, Sequence, SequenceChild};
use crate::ast::{FlowDirective, JsonSchemaValidator, SchemaValidator, TaskList, Workflow};
use crate::config::BraidConfig;
use crate::error::{BraidError, Result};
use crate::store::ExecutionState;

// ═══════════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════════

/// Settings baked into compiled sequences
#[derive(Clone)]
pub struct CompileOptions {
    /// Continue as new once history exceeds this length (0 = only on suggestion)
    pub max_history_length: usize,
    pub validate_input: bool,
    pub validator: Arc<dyn SchemaValidator>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_history_length: 0,
            validate_input: true,
            validator: Arc::new(JsonSchemaValidator::new()),
        }
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("max_history_length", &self.max_history_length)
            .field("validate_input", &self.validate_input)
            .finish_non_exhaustive()
    }
}

impl CompileOptions {
    pub fn from_config(config: &BraidConfig) -> Self {
        Self {
            max_history_length: config.runtime.max_history_length,
            validate_input: config.runtime.validate_input,
            ..Self::default()
        }
    }

    pub fn with_max_history_length(mut self, max: usize) -> Self {
        self.max_history_length = max;
        self
    }
}

// ═══════════════════════════════════════════════════════════════
// Sub-graphs
// ═══════════════════════════════════════════════════════════════

/// A sequence the substrate can run in isolation
pub struct SubGraph {
    name: String,
    sequence: Arc<Sequence>,
    input_schema: Option<Value>,
    options: Arc<CompileOptions>,
}

impl std::fmt::Debug for SubGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubGraph")
            .field("name", &self.name)
            .field("tasks", &self.sequence.len())
            .finish()
    }
}

impl SubGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh state for a run starting here, input checked against the declared schema
    pub fn initial_state(&self, input: Value, env: Arc<Map<String, Value>>) -> Result<ExecutionState> {
        if self.options.validate_input {
            if let Some(schema) = &self.input_schema {
                self.options.validator.validate(&self.name, &input, schema)?;
            }
        }
        Ok(ExecutionState::new(input, env))
    }

    /// Run to completion and hand back the final state
    ///
    /// Entry-point sequences checkpoint: they may end in `ContinueAsNew`.
    pub async fn run(
        &self,
        ctx: &ExecContext,
        input: &Value,
        mut state: ExecutionState,
    ) -> Result<ExecutionState> {
        self.sequence
            .run(ctx, input, &mut state, Checkpointing::Enabled)
            .await?;
        Ok(state)
    }
}

/// Name → sub-graph, shared between compiler and program
#[derive(Debug, Clone, Default)]
pub struct SubGraphRegistry {
    graphs: Arc<DashMap<String, Arc<SubGraph>>>,
}

impl SubGraphRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<SubGraph>> {
        self.graphs.get(name).map(|g| Arc::clone(g.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graphs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Sorted names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.iter().map(|g| g.key().clone()).collect();
        names.sort();
        names
    }

    fn insert(&self, graph: SubGraph) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.graphs.entry(graph.name.clone()) {
            Entry::Occupied(_) => Err(BraidError::DuplicateSubGraph { name: graph.name }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(graph));
                Ok(())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Program
// ═══════════════════════════════════════════════════════════════

/// Output of compilation: the root sub-graph plus every generated one
#[derive(Debug, Clone)]
pub struct Program {
    root: String,
    graphs: SubGraphRegistry,
    options: Arc<CompileOptions>,
}

impl Program {
    /// Compile with every built-in task kind and default options
    pub fn compile(workflow: &Workflow) -> Result<Self> {
        Compiler::new(BuilderRegistry::default(), CompileOptions::default()).compile(workflow)
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> Result<Arc<SubGraph>> {
        self.graph(&self.root)
    }

    pub fn graph(&self, name: &str) -> Result<Arc<SubGraph>> {
        self.graphs
            .get(name)
            .ok_or_else(|| BraidError::SubGraphNotFound {
                name: name.to_string(),
            })
    }

    pub fn graphs(&self) -> &SubGraphRegistry {
        &self.graphs
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }
}

// ═══════════════════════════════════════════════════════════════
// Compiler
// ═══════════════════════════════════════════════════════════════

pub struct Compiler {
    registry: BuilderRegistry,
    options: Arc<CompileOptions>,
    graphs: SubGraphRegistry,
    /// (task, sub-graph) pairs checked once every graph is registered
    references: Mutex<Vec<(String, String)>>,
}

impl Compiler {
    pub fn new(registry: BuilderRegistry, options: CompileOptions) -> Self {
        Self {
            registry,
            options: Arc::new(options),
            graphs: SubGraphRegistry::default(),
            references: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &Arc<CompileOptions> {
        &self.options
    }

    #[instrument(name = "compile", skip_all, fields(workflow = %workflow.name()))]
    pub fn compile(self, workflow: &Workflow) -> Result<Program> {
        workflow.validate()?;
        let root = workflow.name().to_string();

        let sequence = self.compile_sequence(&root, &workflow.tasks)?;
        self.register(&root, sequence, workflow.input_schema().cloned())?;

        for (task, name) in self.references.lock().iter() {
            if !self.graphs.contains(name) {
                return Err(BraidError::UnknownSubGraph {
                    task: task.clone(),
                    name: name.clone(),
                });
            }
        }

        debug!(graphs = self.graphs.len(), "compiled workflow");
        Ok(Program {
            root,
            graphs: self.graphs,
            options: self.options,
        })
    }

    /// Build every child of a task list, in order
    pub fn compile_sequence(&self, graph: &str, tasks: &TaskList) -> Result<Arc<Sequence>> {
        let mut seen = FxHashSet::default();
        for item in tasks.iter() {
            if !seen.insert(item.name.as_str()) {
                return Err(BraidError::DuplicateTaskName {
                    name: item.name.clone(),
                    scope: graph.to_string(),
                });
            }
        }

        let mut children = Vec::with_capacity(tasks.len());
        for item in tasks.iter() {
            if let Some(FlowDirective::Target(target)) = &item.task.base.then {
                if !seen.contains(target.as_str()) {
                    return Err(BraidError::MissingFlowTarget {
                        task: item.name.clone(),
                        target: target.clone(),
                    });
                }
            }

            let builder = self.registry.builder_for(&item.name, &item.task)?;
            let executable = builder.build(self, graph)?;
            children.push(SequenceChild::new(
                item.name.clone(),
                Arc::clone(&item.task),
                executable,
                builder.never_skip_on_resume(),
            ));
        }

        Ok(Arc::new(Sequence::new(
            graph,
            children,
            Arc::clone(&self.options),
        )))
    }

    /// Compile `tasks` and register them as sub-graph `name`
    pub fn compile_sub_graph(&self, name: &str, tasks: &TaskList) -> Result<Arc<Sequence>> {
        let sequence = self.compile_sequence(name, tasks)?;
        self.register(name, Arc::clone(&sequence), None)?;
        Ok(sequence)
    }

    pub fn register(
        &self,
        name: &str,
        sequence: Arc<Sequence>,
        input_schema: Option<Value>,
    ) -> Result<()> {
        debug!(graph = name, "registering sub-graph");
        self.graphs.insert(SubGraph {
            name: name.to_string(),
            sequence,
            input_schema,
            options: Arc::clone(&self.options),
        })
    }

    /// Record that `task` invokes sub-graph `name`; checked at the end of compilation
    pub fn require_sub_graph(&self, task: &str, name: &str) {
        self.references
            .lock()
            .push((task.to_string(), name.to_string()));
    }
}
