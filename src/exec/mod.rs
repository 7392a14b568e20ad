//! External command execution
//!
//! Every call to an external tool (docker, helm, kubectl) goes through the
//! [`CommandExecutor`] capability so tests can substitute scripted fakes that
//! replay fixed outputs and assert on invocation order and arguments.
//!
//! Two kinds of invocation exist:
//! - [`CommandExecutor::run`]: run to completion and capture stdout
//! - [`CommandExecutor::command`]: a [`StreamCommand`] handle that is fed
//!   stdin and streams its output line by line

mod process;

pub use process::ProcessExecutor;

use crate::error::DevcycleResult;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in tool error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Capability for invoking external tools
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `path args...` to completion and return its stdout
    async fn run(&self, path: &str, args: &[String]) -> DevcycleResult<Vec<u8>>;

    /// Prepare `path args...` for a streamed run with piped stdin
    fn command(&self, path: &str, args: &[String]) -> Box<dyn StreamCommand>;
}

/// A prepared command whose stdin is fed and whose output is streamed
#[async_trait]
pub trait StreamCommand: Send {
    /// Run with `input` on stdin, calling `on_output` for every output line
    async fn run(
        self: Box<Self>,
        input: &[u8],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> DevcycleResult<()>;
}

/// Render an invocation the way a user would type it
pub fn command_line(path: &str, args: &[String]) -> String {
    if args.is_empty() {
        path.to_string()
    } else {
        format!("{} {}", path, args.join(" "))
    }
}

/// Extract the useful tail of tool output for error diagnostics.
///
/// Keeps the last `ERROR_TAIL_LINES` lines so error messages are actionable
/// without being overwhelming.
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting. This is a standalone
/// async function (not behind `async_trait`) to avoid lifetime issues with the
/// `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Vec::new();
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
