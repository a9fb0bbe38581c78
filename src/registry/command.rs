// src/registry/command.rs

//! Processor that shells out to an external command.
//!
//! The [`ProcessorInput`] is written to the command's stdin as JSON; the
//! command must print a single JSON object on stdout, which becomes the
//! module's fields.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::processor::{Fields, ProcessError, ProcessFuture, Processor, ProcessorInput};
use super::ModuleName;

#[derive(Debug, Clone)]
pub struct CommandProcessor {
    module: ModuleName,
    cmd: String,
    workdir: Option<PathBuf>,
}

impl CommandProcessor {
    pub fn new(module: impl Into<ModuleName>, cmd: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            cmd: cmd.into(),
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, dir: PathBuf) -> Self {
        self.workdir = Some(dir);
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }
}

impl Processor for CommandProcessor {
    fn process(&self, input: ProcessorInput) -> ProcessFuture {
        let this = self.clone();
        Box::pin(async move {
            run_command(&this, &input)
                .await
                .map_err(|e| ProcessError::Failed(format!("{e:#}")))
        })
    }
}

async fn run_command(proc: &CommandProcessor, input: &ProcessorInput) -> Result<Fields> {
    info!(
        module = %proc.module,
        entity = %input.entity,
        shape = %input.shape,
        cmd = %proc.cmd,
        "starting processor command"
    );

    let payload = serde_json::to_vec(input).context("serialising processor input")?;

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&proc.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&proc.cmd);
        c
    };

    if let Some(ref dir) = proc.workdir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning processor for module '{}'", proc.module))?;

    // Feed stdin concurrently so a chatty command cannot deadlock on a full
    // stdout pipe while we are still writing.
    if let Some(mut stdin) = child.stdin.take() {
        let module = proc.module.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(module = %module, error = %e, "processor closed stdin early");
            }
        });
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for processor of module '{}'", proc.module))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(module = %proc.module, "stderr: {}", line);
    }

    let code = output.status.code().unwrap_or(-1);
    info!(
        module = %proc.module,
        entity = %input.entity,
        exit_code = code,
        success = output.status.success(),
        "processor command exited"
    );

    if !output.status.success() {
        return Err(anyhow!(
            "processor command for module '{}' exited with code {}",
            proc.module,
            code
        ));
    }

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("parsing stdout of module '{}' as JSON", proc.module))?;

    match value {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(anyhow!(
            "processor command for module '{}' must print a JSON object, got {}",
            proc.module,
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
