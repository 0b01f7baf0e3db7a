//! Runner - load, compile and run a workflow document locally
//!
//! The CLI entry point. Compiles with options from [`BraidConfig`], runs the
//! program on a [`LocalSubstrate`] and prints a short colored report.

use std::path::Path;
use std::time::Instant;

use colored::Colorize;
use serde_json::Value;
use tracing::{info, instrument};

use super::compiler::{CompileOptions, Compiler, Program};
use super::registry::BuilderRegistry;
use crate::ast::Workflow;
use crate::config::BraidConfig;
use crate::error::{BraidError, Result};
use crate::event::HistoryEventKind;
use crate::substrate::{LocalSubstrate, LocalSubstrateBuilder, RunOutcome};

pub struct Runner {
    workflow: Workflow,
    program: Program,
    config: BraidConfig,
}

impl Runner {
    pub fn new(workflow: Workflow, config: BraidConfig) -> Result<Self> {
        let options = CompileOptions::from_config(&config);
        let program = Compiler::new(BuilderRegistry::default(), options).compile(&workflow)?;
        Ok(Self {
            workflow,
            program,
            config,
        })
    }

    pub fn from_file(path: impl AsRef<Path>, config: BraidConfig) -> Result<Self> {
        Self::new(Workflow::from_file(path)?, config)
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Substrate builder preloaded with this runner's program and config
    pub fn substrate(&self) -> LocalSubstrateBuilder {
        LocalSubstrate::builder(self.program.clone()).config(self.config.clone())
    }

    /// Run on a default local substrate
    pub async fn run(&self, input: Value) -> Result<RunOutcome> {
        let substrate = self.substrate().build()?;
        self.run_on(&substrate, input).await
    }

    /// Run on `substrate`, bounded by the document's `timeout` when set
    #[instrument(skip_all, fields(workflow = %self.workflow.name()))]
    pub async fn run_on(&self, substrate: &LocalSubstrate, input: Value) -> Result<RunOutcome> {
        let start = Instant::now();
        info!(graphs = self.program.graphs().len(), "Starting workflow execution");
        println!(
            "{} Running workflow {} ({} sub-graphs)...\n",
            "→".cyan(),
            self.workflow.name().bold(),
            self.program.graphs().len()
        );

        let limit = match &self.workflow.timeout {
            Some(timeout) => Some(timeout.after.to_duration()?),
            None => None,
        };
        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, substrate.run(input)).await {
                Ok(result) => result,
                Err(_) => {
                    substrate.cancel();
                    Err(BraidError::RunTimeout {
                        workflow: self.workflow.name().to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => substrate.run(input).await,
        };

        let elapsed = format!("({:.1}s)", start.elapsed().as_secs_f32()).dimmed();
        match &result {
            Ok(outcome) => {
                let calls = outcome
                    .history
                    .count(|e| matches!(e, HistoryEventKind::CallCompleted { .. }));
                println!(
                    "  {} {} {} calls, {} continuations {}",
                    "✓".green(),
                    self.workflow.name(),
                    calls,
                    outcome.continuations,
                    elapsed
                );
                info!(
                    run_id = %outcome.run_id,
                    continuations = outcome.continuations,
                    "Workflow completed"
                );
            }
            Err(e) => {
                println!("  {} {} {}", "✗".red(), self.workflow.name(), elapsed);
                println!("      {} {}", "Error:".red(), e);
            }
        }
        result
    }
}
