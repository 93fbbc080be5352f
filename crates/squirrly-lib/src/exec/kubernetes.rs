//! Remote execution over the Kubernetes pod exec subresource

use super::{ExecOutput, PipeOutput, RemoteExecutor};
use crate::error::ExecError;
use crate::models::ProcessTarget;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, AttachedProcess};
use kube::Client;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Executes commands in pod containers through the API server
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
    /// Upper bound for a single command, including output collection
    timeout: Duration,
}

impl KubeExecutor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn attach_params(target: &ProcessTarget, stdin: bool) -> AttachParams {
        let params = AttachParams::default()
            .stdin(stdin)
            .stdout(true)
            .stderr(true);
        match &target.container {
            Some(container) => params.container(container.clone()),
            None => params,
        }
    }

    async fn spawn(
        &self,
        target: &ProcessTarget,
        command: &[String],
        stdin: bool,
    ) -> Result<AttachedProcess, ExecError> {
        debug!(target = %target, command = ?command, "Executing remote command");
        self.pods(&target.namespace)
            .exec(
                &target.pod,
                command.to_vec(),
                &Self::attach_params(target, stdin),
            )
            .await
            .map_err(|e| transport(target, e))
    }

    async fn run(
        &self,
        target: &ProcessTarget,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, ExecError> {
        let mut process = self.spawn(target, command, stdin.is_some()).await?;

        if let Some(bytes) = stdin {
            let mut writer = process
                .stdin()
                .ok_or_else(|| transport(target, "stdin not attached"))?;
            writer
                .write_all(bytes)
                .await
                .map_err(|e| transport(target, e))?;
            writer.flush().await.map_err(|e| transport(target, e))?;
        }

        finish(target, process).await
    }
}

#[async_trait]
impl RemoteExecutor for KubeExecutor {
    async fn execute(
        &self,
        target: &ProcessTarget,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, ExecError> {
        tokio::time::timeout(self.timeout, self.run(target, command, stdin))
            .await
            .map_err(|_| ExecError::Timeout {
                target: target.to_string(),
                secs: self.timeout.as_secs(),
            })?
    }

    async fn pipe(
        &self,
        source: &ProcessTarget,
        source_cmd: &[String],
        sink: &ProcessTarget,
        sink_cmd: &[String],
    ) -> Result<PipeOutput, ExecError> {
        let mut producer = self.spawn(source, source_cmd, false).await?;
        let mut consumer = self.spawn(sink, sink_cmd, true).await?;

        let mut reader = producer
            .stdout()
            .ok_or_else(|| transport(source, "stdout not attached"))?;
        let mut writer = consumer
            .stdin()
            .ok_or_else(|| transport(sink, "stdin not attached"))?;

        let bytes_copied = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| transport(sink, e))?;
        writer.flush().await.map_err(|e| transport(sink, e))?;
        drop(writer);

        finish(source, producer).await?.into_checked(source)?;
        let sink_output = finish(sink, consumer).await?.into_checked(sink)?;

        Ok(PipeOutput {
            bytes_copied,
            sink: sink_output,
        })
    }
}

/// Drain stdout and stderr concurrently, then wait for the exit status
async fn finish(
    target: &ProcessTarget,
    mut process: AttachedProcess,
) -> Result<ExecOutput, ExecError> {
    let status = process.take_status();
    let (stdout, stderr) = tokio::join!(read_all(process.stdout()), read_all(process.stderr()));
    let stdout = stdout.map_err(|e| transport(target, e))?;
    let stderr = stderr.map_err(|e| transport(target, e))?;

    let status = match status {
        Some(pending) => pending.await,
        None => None,
    };
    let status = status.ok_or_else(|| transport(target, "exec stream closed without a status"))?;
    let exit_code = exit_code(&status).ok_or_else(|| {
        transport(
            target,
            status
                .message
                .clone()
                .unwrap_or_else(|| "exec failed without an exit code".to_string()),
        )
    })?;

    Ok(ExecOutput {
        stdout,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Recover the process exit code from an exec status.
///
/// The API server reports success as `status: Success` and a non-zero exit
/// as a `NonZeroExitCode` failure whose `ExitCode` cause carries the code.
fn exit_code(status: &Status) -> Option<i32> {
    if status.status.as_deref() == Some("Success") {
        return Some(0);
    }
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        .and_then(|cause| cause.message.as_deref()?.trim().parse().ok())
}

fn transport(target: &ProcessTarget, reason: impl ToString) -> ExecError {
    ExecError::Transport {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    #[test]
    fn test_exit_code_success() {
        let status = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        assert_eq!(exit_code(&status), Some(0));
    }

    #[test]
    fn test_exit_code_from_cause() {
        let status = Status {
            status: Some("Failure".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("2".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(exit_code(&status), Some(2));
    }

    #[test]
    fn test_exit_code_missing() {
        let status = Status {
            status: Some("Failure".to_string()),
            message: Some("container not found".to_string()),
            ..Default::default()
        };
        assert_eq!(exit_code(&status), None);
    }

    #[test]
    fn test_attach_params_container() {
        let target = ProcessTarget::new("ns", "pod", Some("main".to_string()));
        let params = KubeExecutor::attach_params(&target, true);
        assert_eq!(params.container.as_deref(), Some("main"));
        assert!(params.stdin);
        assert!(params.stdout);
    }
}
