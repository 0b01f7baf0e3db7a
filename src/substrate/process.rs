//! Process runner - local commands for `run.shell`, `run.script`, `run.container`

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{BraidError, Result};

/// Runs a command to completion and returns its trimmed stdout
///
/// A non-zero exit is `BraidError::ProcessExit` carrying stdout and stderr.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        env: &FxHashMap<String, String>,
        workdir: Option<&Path>,
    ) -> Result<String>;
}

/// `tokio::process` runner; the child is killed if the call future is dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        env: &FxHashMap<String, String>,
        workdir: Option<&Path>,
    ) -> Result<String> {
        debug!(command, args = ?args, "spawning process");
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| BraidError::ProcessSpawn {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            return Err(BraidError::ProcessExit {
                command: command.to_string(),
                code: output.status.code(),
                stdout,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }
}
