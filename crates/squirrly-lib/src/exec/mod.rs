//! Remote command execution
//!
//! Every interaction with the cluster's processes funnels through the
//! [`RemoteExecutor`] trait: control-plane HTTP calls, artifact searches,
//! the byte relay and the analysis request all run as commands inside a
//! target container.

mod kubernetes;

pub use kubernetes::KubeExecutor;

use crate::error::ExecError;
use crate::models::ProcessTarget;
use async_trait::async_trait;

/// Captured result of a command that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a non-zero exit into an error
    pub fn into_checked(self, target: &ProcessTarget) -> Result<Self, ExecError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ExecError::NonZeroExit {
                target: target.to_string(),
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Result of streaming one command's stdout into another command's stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeOutput {
    pub bytes_copied: u64,
    pub sink: ExecOutput,
}

/// Runs commands against remote execution targets.
///
/// Calls block until the remote command exits; there is no implicit retry.
/// End of stdin is not signalled on every cluster version, so commands that
/// consume stdin must bound their own read (`head -c N`).
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `target`, optionally feeding `stdin`
    async fn execute(
        &self,
        target: &ProcessTarget,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, ExecError>;

    /// Stream the stdout of `source_cmd` into the stdin of `sink_cmd`.
    ///
    /// The default implementation buffers the whole output in memory.
    async fn pipe(
        &self,
        source: &ProcessTarget,
        source_cmd: &[String],
        sink: &ProcessTarget,
        sink_cmd: &[String],
    ) -> Result<PipeOutput, ExecError> {
        let produced = self
            .execute(source, source_cmd, None)
            .await?
            .into_checked(source)?;
        let consumed = self
            .execute(sink, sink_cmd, Some(&produced.stdout))
            .await?
            .into_checked(sink)?;
        Ok(PipeOutput {
            bytes_copied: produced.stdout.len() as u64,
            sink: consumed,
        })
    }
}

/// Build an argument vector from string-like parts
pub fn command<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Wrap a POSIX shell script; `args` become `$1..$n` so nothing is re-quoted
pub fn shell<I, S>(script: &str, args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut argv = command(["sh", "-c", script, "squirrly"]);
    argv.extend(args.into_iter().map(Into::into));
    argv
}

/// Parse a decimal byte count printed by a remote command
pub fn parse_byte_count(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}
