//! Continue-as-new: restarts resume where the previous run stopped

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use braid::ast::Workflow;
use braid::binding::Evaluator;
use braid::error::{BraidError, Result};
use braid::event::HistoryEventKind;
use braid::runtime::{BuilderRegistry, CompileOptions, Compiler, ExecContext, Program, RunInfo};
use braid::store::ExecutionState;
use braid::substrate::{CallRequest, HeartbeatGuard, LocalSubstrate, Substrate};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

const STEPS: &str = r#"
document:
  name: steps
do:
  - taskA:
      call: activity
      with:
        name: step
        arguments:
          - a
  - taskB:
      call: activity
      with:
        name: step
        arguments:
          - b
  - taskC:
      call: activity
      with:
        name: step
        arguments:
          - c
      export:
        as: ${ [data.taskA, data.taskB, data.taskC] }
"#;

fn compile(yaml: &str, max_history_length: usize) -> Program {
    let workflow = Workflow::from_yaml(yaml).unwrap();
    let options = CompileOptions::default().with_max_history_length(max_history_length);
    Compiler::new(BuilderRegistry::default(), options)
        .compile(&workflow)
        .unwrap()
}

fn substrate(program: Program, calls: &common::Counter) -> LocalSubstrate {
    let calls = calls.clone();
    LocalSubstrate::builder(program)
        .env(Map::new())
        .activity("step", move |args: Vec<Value>| {
            calls.bump();
            let label = args.first().and_then(Value::as_str).unwrap_or("?").to_string();
            async move { Ok(json!(format!("done-{label}"))) }
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_history_limit_restarts_without_repeating_calls() {
    let calls = common::Counter::default();
    let outcome = substrate(compile(STEPS, 2), &calls)
        .run(json!({}))
        .await
        .unwrap();

    assert_eq!(outcome.output, json!(["done-a", "done-b", "done-c"]));
    // RunStarted + two events per call: a restart before taskB and before taskC
    assert_eq!(outcome.continuations, 2);
    assert_eq!(calls.get(), 3);
}

#[tokio::test]
async fn test_restarted_run_matches_uninterrupted_run() {
    let interrupted = substrate(compile(STEPS, 2), &common::Counter::default())
        .run(json!({}))
        .await
        .unwrap();
    let straight = substrate(compile(STEPS, 0), &common::Counter::default())
        .run(json!({}))
        .await
        .unwrap();

    assert_eq!(straight.continuations, 0);
    assert_eq!(interrupted.output, straight.output);
    assert_eq!(interrupted.state.data, straight.state.data);
}

#[tokio::test]
async fn test_last_run_history_starts_at_marker() {
    let outcome = substrate(compile(STEPS, 2), &common::Counter::default())
        .run(json!({}))
        .await
        .unwrap();

    let first = outcome.history.events().into_iter().next().map(|e| e.kind);
    match first {
        Some(HistoryEventKind::RunStarted { resume_marker, .. }) => {
            assert_eq!(resume_marker.as_deref(), Some("taskC-2"));
        }
        other => panic!("unexpected first event: {other:?}"),
    }
    // Only taskC ran in the final run
    assert_eq!(
        outcome
            .history
            .count(|e| matches!(e, HistoryEventKind::CallCompleted { .. })),
        1
    );
    assert!(!outcome.state.is_resuming());
}

#[tokio::test]
async fn test_nested_lists_do_not_checkpoint() {
    let yaml = r#"
document:
  name: nested_steps
do:
  - group:
      do:
        - one:
            call: activity
            with:
              name: step
              arguments:
                - one
        - two:
            call: activity
            with:
              name: step
              arguments:
                - two
      export:
        as: ${ [data.one, data.two] }
"#;
    let calls = common::Counter::default();
    let outcome = substrate(compile(yaml, 2), &calls)
        .run(json!({}))
        .await
        .unwrap();
    assert_eq!(outcome.continuations, 0);
    assert_eq!(outcome.output, json!(["done-one", "done-two"]));
    assert_eq!(calls.get(), 2);
}

// =============================================================================
// NEVER-SKIP CHILDREN ON RESUME
// =============================================================================

const NESTED_BEFORE_RESTART: &str = r#"
document:
  name: nested_resume
do:
  - first:
      call: activity
      with:
        name: step
        arguments:
          - first
  - inner:
      metadata:
        searchAttributes:
          stage: inner
      do:
        - mark:
            set:
              marked: true
            export:
              as: inner-out
  - mid:
      call: activity
      with:
        name: step
        arguments:
          - mid
      export:
        as: mid-out
  - last:
      call: activity
      with:
        name: step
        arguments:
          - last
"#;

#[tokio::test]
async fn test_nested_list_before_marker_leaves_state_untouched() {
    let straight = substrate(compile(NESTED_BEFORE_RESTART, 0), &common::Counter::default())
        .run(json!({}))
        .await
        .unwrap();
    let calls = common::Counter::default();
    let resumed = substrate(compile(NESTED_BEFORE_RESTART, 3), &calls)
        .run(json!({}))
        .await
        .unwrap();

    assert_eq!(straight.continuations, 0);
    assert!(resumed.continuations >= 1);
    assert_eq!(straight.state.data["inner"], json!("inner-out"));
    assert_eq!(resumed.state.data, straight.state.data);
    assert_eq!(resumed.output, straight.output);
    assert_eq!(calls.get(), 3);
    // Search attributes were applied before the restart, not again after it
    assert_eq!(
        resumed
            .history
            .count(|e| matches!(e, HistoryEventKind::SearchAttributesUpserted { .. })),
        0
    );
}

#[tokio::test]
async fn test_query_listener_re_registers_after_restart() {
    let yaml = r#"
document:
  name: queried
do:
  - status:
      listen:
        to:
          one:
            with:
              id: status
              type: query
              data: ${ input.label }
  - taskA:
      call: activity
      with:
        name: step
        arguments:
          - a
  - taskB:
      call: activity
      with:
        name: step
        arguments:
          - b
"#;
    let calls = common::Counter::default();
    let substrate = substrate(compile(yaml, 2), &calls);
    let outcome = substrate.run(json!({"label": "busy"})).await.unwrap();

    assert_eq!(outcome.continuations, 1);
    assert_eq!(calls.get(), 2);
    assert_eq!(substrate.query("status"), Some(json!("busy")));
    assert_eq!(
        outcome
            .history
            .count(|e| matches!(e, HistoryEventKind::QueryRegistered { .. })),
        1
    );
    assert!(outcome.state.data.get("status").is_none());
}

// =============================================================================
// HANDLER QUIESCENCE
// =============================================================================

const DETACHED_BEFORE_RESTART: &str = r#"
document:
  name: background
do:
  - jobs:
      if: false
      do:
        - slow_job:
            do:
              - work:
                  call: activity
                  with:
                    name: slow
  - kick:
      run:
        workflow:
          name: slow_job
        await: false
  - after:
      call: activity
      with:
        name: finished
      export:
        as: ${ result }
"#;

fn background(program: Program, work: Duration, done: &common::Counter) -> LocalSubstrate {
    let slow_done = done.clone();
    let check = done.clone();
    LocalSubstrate::builder(program)
        .env(Map::new())
        .activity("slow", move |_args: Vec<Value>| {
            let done = slow_done.clone();
            async move {
                tokio::time::sleep(work).await;
                done.bump();
                Ok(json!("slow"))
            }
        })
        .activity("finished", move |_args: Vec<Value>| {
            let seen = check.get();
            async move { Ok(json!(seen)) }
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_restart_waits_for_detached_handlers() {
    let done = common::Counter::default();
    let outcome = background(
        compile(DETACHED_BEFORE_RESTART, 1),
        Duration::from_millis(150),
        &done,
    )
    .run(json!({}))
    .await
    .unwrap();

    assert_eq!(outcome.continuations, 1);
    // The background job finished before the restarted run reached `after`
    assert_eq!(outcome.output, json!(1));
}

#[tokio::test]
async fn test_cancel_while_quiescing_fails_with_marker() {
    let done = common::Counter::default();
    let substrate = background(
        compile(DETACHED_BEFORE_RESTART, 1),
        Duration::from_secs(30),
        &done,
    );
    let cancel = substrate.cancellation();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), substrate.run(json!({})))
        .await
        .expect("run stops once cancelled");
    match result.unwrap_err() {
        BraidError::HandlersNotFinished {
            entry_point,
            resume_marker,
            ..
        } => {
            assert_eq!(entry_point, "background");
            assert_eq!(resume_marker, "after-2");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(done.get(), 0);
}

// =============================================================================
// CHECKPOINT PLACEMENT
// =============================================================================

/// Local substrate that suggests a restart at every checkpoint
struct EagerRestart(LocalSubstrate);

#[async_trait]
impl Substrate for EagerRestart {
    async fn execute_call(&self, ctx: &ExecContext, request: CallRequest) -> Result<Value> {
        self.0.execute_call(ctx, request).await
    }

    async fn execute_sub_graph(
        &self,
        ctx: &ExecContext,
        name: &str,
        input: Value,
        state: ExecutionState,
    ) -> Result<Value> {
        self.0.execute_sub_graph(ctx, name, input, state).await
    }

    async fn start_sub_graph(
        &self,
        ctx: &ExecContext,
        name: &str,
        input: Value,
        state: ExecutionState,
    ) -> Result<()> {
        self.0.start_sub_graph(ctx, name, input, state).await
    }

    async fn await_condition(
        &self,
        ctx: &ExecContext,
        predicate: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<()> {
        self.0.await_condition(ctx, predicate).await
    }

    async fn sleep(&self, ctx: &ExecContext, duration: Duration) -> Result<()> {
        self.0.sleep(ctx, duration).await
    }

    async fn await_signal(&self, ctx: &ExecContext, name: &str) -> Result<Value> {
        self.0.await_signal(ctx, name).await
    }

    fn register_query(&self, ctx: &ExecContext, name: &str, response: Value) -> Result<()> {
        self.0.register_query(ctx, name, response)
    }

    fn continuation_suggested(&self, _ctx: &ExecContext) -> bool {
        true
    }

    fn history_length(&self, ctx: &ExecContext) -> usize {
        self.0.history_length(ctx)
    }

    fn request_continuation(
        &self,
        ctx: &ExecContext,
        entry_point: &str,
        input: Value,
        state: ExecutionState,
    ) -> BraidError {
        self.0.request_continuation(ctx, entry_point, input, state)
    }

    fn register_heartbeat(&self, ctx: &ExecContext, interval: Duration) -> HeartbeatGuard {
        self.0.register_heartbeat(ctx, interval)
    }
}

#[tokio::test]
async fn test_first_child_never_checkpoints() {
    let local = LocalSubstrate::builder(compile(STEPS, 0))
        .env(Map::new())
        .activity("step", |_args: Vec<Value>| async { Ok(json!("done")) })
        .build()
        .unwrap();
    let graph = local.program().root().unwrap();
    let ctx = ExecContext::new(
        Arc::new(EagerRestart(local.clone())),
        Arc::new(local.clone()),
        Evaluator::new(),
        RunInfo::new("steps", graph.name()),
    );
    let state = graph
        .initial_state(json!({}), Arc::new(Map::new()))
        .unwrap();

    match graph.run(&ctx, &json!({}), state).await.unwrap_err() {
        BraidError::ContinueAsNew { state, .. } => {
            // taskA ran; the restart resumes at the second child
            assert_eq!(state.resume_marker.as_deref(), Some("taskB-1"));
            assert_eq!(state.data["taskA"], json!("done"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
