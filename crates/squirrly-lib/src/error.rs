//! Error types for the orchestration pipeline

use thiserror::Error;

/// Failure of a single remote command invocation.
///
/// A command that ran and exited non-zero is reported through
/// [`crate::exec::ExecOutput::exit_code`]; it only becomes `NonZeroExit` when a
/// caller requires success. Only `Transport` and `Timeout` mean the remote
/// was never properly reached.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to reach {target}: {reason}")]
    Transport { target: String, reason: String },

    #[error("command on {target} exited with code {code}: {stderr}")]
    NonZeroExit {
        target: String,
        code: i32,
        stderr: String,
    },

    #[error("command on {target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },
}

/// How a failure affects the overall run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort immediately with a non-zero exit
    Fatal,
    /// Report a warning; the run still completes
    Degraded,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("deployment '{name}' not found in namespace '{namespace}'")]
    DeploymentNotFound { namespace: String, name: String },

    #[error("no coordinator pod found for deployment '{0}'")]
    CoordinatorNotFound(String),

    #[error("control API service '{0}' is not reachable")]
    ControlApiUnreachable(String),

    #[error("no jobs found on the control plane")]
    NoJobsFound,

    #[error("no vertices found for job {0}")]
    VertexNotFound(String),

    #[error("no workers registered with the control plane")]
    NoWorkersFound,

    #[error("profiler trigger rejected (HTTP {}): {body}", code_label(.http_code))]
    ProfilerTriggerFailed { http_code: Option<u16>, body: String },

    #[error("no worker pods found for deployment '{0}'")]
    NoWorkerPodsFound(String),

    #[error("no profiling artifact found after {attempts} attempts")]
    NoArtifactFound { attempts: u32 },

    #[error("artifact {path} on {worker} is empty or unreadable")]
    ArtifactUnreadable { path: String, worker: String },

    #[error("relayed artifact size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("failed to build analysis payload: {diagnostics}")]
    PayloadBuildFailed { diagnostics: String },

    #[error("unsupported analysis provider '{0}'")]
    UnsupportedProvider(String),

    #[error("no credential configured for analysis provider '{0}'")]
    MissingCredential(String),

    #[error("analysis request failed (HTTP {}): {body}", code_label(.http_code))]
    ProviderRequestFailed { http_code: Option<u16>, body: String },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("failed to watch pod {pod}: {reason}")]
    Watch { pod: String, reason: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify the failure as fatal or degraded.
    ///
    /// Discovery and trigger failures mean the target is absent or refused the
    /// run. Everything after a successful trigger is best-effort.
    pub fn severity(&self) -> Severity {
        match self {
            Error::DeploymentNotFound { .. }
            | Error::CoordinatorNotFound(_)
            | Error::ControlApiUnreachable(_)
            | Error::NoJobsFound
            | Error::VertexNotFound(_)
            | Error::NoWorkersFound
            | Error::ProfilerTriggerFailed { .. }
            | Error::Exec(ExecError::Transport { .. })
            | Error::Exec(ExecError::Timeout { .. })
            | Error::Watch { .. }
            | Error::Kube(_)
            | Error::Json(_)
            | Error::Io(_) => Severity::Fatal,
            Error::NoWorkerPodsFound(_)
            | Error::NoArtifactFound { .. }
            | Error::ArtifactUnreadable { .. }
            | Error::SizeMismatch { .. }
            | Error::PayloadBuildFailed { .. }
            | Error::UnsupportedProvider(_)
            | Error::MissingCredential(_)
            | Error::Exec(ExecError::NonZeroExit { .. })
            | Error::ProviderRequestFailed { .. } => Severity::Degraded,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

fn code_label(code: &Option<u16>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "no response".to_string())
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_failures_are_fatal() {
        assert!(Error::NoJobsFound.is_fatal());
        assert!(Error::CoordinatorNotFound("job".into()).is_fatal());
        assert!(Error::ProfilerTriggerFailed {
            http_code: Some(500),
            body: String::new(),
        }
        .is_fatal());
    }

    #[test]
    fn test_post_trigger_failures_are_degraded() {
        assert_eq!(
            Error::NoArtifactFound { attempts: 12 }.severity(),
            Severity::Degraded
        );
        assert_eq!(
            Error::SizeMismatch {
                expected: 10,
                actual: 9
            }
            .severity(),
            Severity::Degraded
        );
        assert_eq!(
            Error::UnsupportedProvider("anthropic".into()).severity(),
            Severity::Degraded
        );
    }

    #[test]
    fn test_remote_refusal_is_degraded_but_unreachable_is_fatal() {
        let refused = Error::Exec(ExecError::NonZeroExit {
            target: "flink/jm-0".into(),
            code: 1,
            stderr: "No space left on device".into(),
        });
        assert_eq!(refused.severity(), Severity::Degraded);

        let unreachable = Error::Exec(ExecError::Transport {
            target: "flink/jm-0".into(),
            reason: "connection reset".into(),
        });
        assert!(unreachable.is_fatal());
        assert!(Error::Exec(ExecError::Timeout {
            target: "flink/jm-0".into(),
            secs: 60,
        })
        .is_fatal());
    }

    #[test]
    fn test_missing_http_code_is_labelled() {
        let err = Error::ProviderRequestFailed {
            http_code: None,
            body: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "analysis request failed (HTTP no response): connection refused"
        );
    }
}
