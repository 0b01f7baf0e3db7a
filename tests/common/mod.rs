//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use braid::ast::Workflow;
use braid::runtime::Program;
use braid::substrate::{LocalSubstrate, LocalSubstrateBuilder, RetryConfig};
use serde_json::{Map, Value};

pub fn program(yaml: &str) -> Program {
    let workflow = Workflow::from_yaml(yaml).expect("workflow parses");
    Program::compile(&workflow).expect("workflow compiles")
}

/// Builder with an empty `env` and a retry policy that does not sleep
pub fn substrate(yaml: &str) -> LocalSubstrateBuilder {
    LocalSubstrate::builder(program(yaml))
        .env(Map::new())
        .retry(
            RetryConfig::default()
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(0.0),
        )
}

pub async fn run(yaml: &str, input: Value) -> braid::Result<Value> {
    let substrate = substrate(yaml).build()?;
    substrate.run(input).await.map(|outcome| outcome.output)
}

/// Call counter shared with activity closures
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}
