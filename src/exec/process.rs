//! Command execution through OS processes

use super::{command_line, error_tail, stream_child_output, CommandExecutor, StreamCommand};
use crate::error::{DevcycleError, DevcycleResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Executor that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create a new process executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, path: &str, args: &[String]) -> DevcycleResult<Vec<u8>> {
        let line = command_line(path, args);
        debug!("Executing: {}", line);

        let output = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DevcycleError::command_failed(line.clone(), e))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(DevcycleError::external_tool(
                line,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ))
        }
    }

    fn command(&self, path: &str, args: &[String]) -> Box<dyn StreamCommand> {
        Box::new(ProcessCommand {
            path: path.to_string(),
            args: args.to_vec(),
        })
    }
}

/// A process spawned with piped stdin and streamed output
struct ProcessCommand {
    path: String,
    args: Vec<String>,
}

#[async_trait]
impl StreamCommand for ProcessCommand {
    async fn run(
        self: Box<Self>,
        input: &[u8],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> DevcycleResult<()> {
        let line = command_line(&self.path, &self.args);
        debug!("Executing with input: {}", line);

        let mut child = Command::new(&self.path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DevcycleError::command_failed(line.clone(), e))?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // Feed and drain concurrently so a chatty child cannot block on a full pipe
        let (fed, lines) = tokio::join!(feed, stream_child_output(&mut child, on_output));

        let status = child
            .wait()
            .await
            .map_err(|e| DevcycleError::command_failed(line.clone(), e))?;

        if !status.success() {
            return Err(DevcycleError::external_tool(line, error_tail(&lines), ""));
        }

        fed.map_err(|e| DevcycleError::io(format!("writing stdin of '{}'", line), e))
    }
}
