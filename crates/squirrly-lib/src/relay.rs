//! Artifact relay from worker to coordinator
//!
//! Only the coordinator has egress to the analysis provider, so the artifact
//! is copied there first: the worker's `cat` is piped into a bounded write on
//! the coordinator, and the copy is accepted only when its byte count equals
//! the source's. The prompt and the provider payload are then written next to
//! it. All of these live in a per-run [`Scratch`] set that is removed once the
//! analysis request has been sent.

use crate::analysis::AnalysisProvider;
use crate::error::{Error, ExecError, Result};
use crate::exec::{command, parse_byte_count, shell, RemoteExecutor};
use crate::models::ProcessTarget;
use crate::observability::StructuredLogger;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Default ceiling on the worker-to-coordinator copy
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(120);

/// Case-insensitive marker proving the HTML body made it into the payload
const PAYLOAD_MARKER: &str = "doctype html";

const SIZE_SCRIPT: &str = r#"wc -c < "$1""#;
const WRITE_SCRIPT: &str = r#"umask 077; head -c "$1" > "$2""#;
const DIAGNOSE_SCRIPT: &str = r#"ls -l "$@" 2>&1
command -v jq >/dev/null 2>&1 && jq --version 2>&1 || echo "jq: not installed""#;

/// Temporary files on the coordinator, namespaced by a timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scratch {
    pub artifact: String,
    pub prompt: String,
    pub payload: String,
    pub headers: String,
}

impl Scratch {
    pub fn new(stamp: DateTime<Utc>) -> Self {
        let prefix = format!("/tmp/squirrly_{}", stamp.format("%Y%m%d_%H%M%S_%3f"));
        Self {
            artifact: format!("{}_artifact.html", prefix),
            prompt: format!("{}_prompt.txt", prefix),
            payload: format!("{}_payload.json", prefix),
            headers: format!("{}_headers.txt", prefix),
        }
    }

    pub fn paths(&self) -> [&str; 4] {
        [
            self.artifact.as_str(),
            self.prompt.as_str(),
            self.payload.as_str(),
            self.headers.as_str(),
        ]
    }
}

pub struct ArtifactRelay {
    executor: Arc<dyn RemoteExecutor>,
    timeout: Duration,
    logger: StructuredLogger,
}

impl ArtifactRelay {
    pub fn new(executor: Arc<dyn RemoteExecutor>, logger: StructuredLogger) -> Self {
        Self {
            executor,
            timeout: DEFAULT_RELAY_TIMEOUT,
            logger,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Copy `path` from `worker` to `scratch.artifact` on `coordinator`.
    ///
    /// Returns the verified byte count.
    pub async fn relay(
        &self,
        worker: &ProcessTarget,
        path: &str,
        coordinator: &ProcessTarget,
        scratch: &Scratch,
    ) -> Result<u64> {
        let expected = match self.byte_count(worker, path).await? {
            Some(size) if size > 0 => size,
            _ => {
                return Err(Error::ArtifactUnreadable {
                    path: path.to_string(),
                    worker: worker.pod.clone(),
                })
            }
        };

        let source_cmd = command(["cat", path]);
        let sink_cmd = shell(WRITE_SCRIPT, [expected.to_string(), scratch.artifact.clone()]);
        let copy = self
            .executor
            .pipe(worker, &source_cmd, coordinator, &sink_cmd);
        let copied = tokio::time::timeout(self.timeout, copy)
            .await
            .map_err(|_| ExecError::Timeout {
                target: coordinator.to_string(),
                secs: self.timeout.as_secs(),
            })?;
        match copied {
            Ok(_) => {}
            // The worker could not read the file it just sized.
            Err(ExecError::NonZeroExit { target, .. }) if target == worker.to_string() => {
                return Err(Error::ArtifactUnreadable {
                    path: path.to_string(),
                    worker: worker.pod.clone(),
                })
            }
            // A failed write on the coordinator shows up in the size check.
            Err(ExecError::NonZeroExit { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let actual = self
            .byte_count(coordinator, &scratch.artifact)
            .await?
            .unwrap_or(0);
        self.logger.log_relay(expected, actual);
        if actual != expected {
            return Err(Error::SizeMismatch { expected, actual });
        }
        Ok(actual)
    }

    /// Write the prompt and build the provider payload on the coordinator.
    ///
    /// Returns whether the payload embeds the artifact's HTML marker; a
    /// missing marker is reported but does not fail the build.
    pub async fn build_payload(
        &self,
        coordinator: &ProcessTarget,
        scratch: &Scratch,
        prompt: &str,
        provider: &dyn AnalysisProvider,
    ) -> Result<bool> {
        match self
            .write_file(coordinator, &scratch.prompt, prompt.as_bytes())
            .await
        {
            Err(Error::Exec(ExecError::NonZeroExit { code, stderr, .. })) => {
                return Err(Error::PayloadBuildFailed {
                    diagnostics: format!(
                        "writing prompt {} failed with exit code {}: {}",
                        scratch.prompt,
                        code,
                        stderr.trim()
                    ),
                })
            }
            other => other?,
        }

        let build = provider.payload_command(&scratch.prompt, &scratch.artifact, &scratch.payload);
        let output = self.executor.execute(coordinator, &build, None).await?;
        if !output.is_success() {
            let diagnostics = self.diagnose(coordinator, scratch).await;
            return Err(Error::PayloadBuildFailed {
                diagnostics: format!(
                    "exit code {}: {}\n{}",
                    output.exit_code,
                    output.stderr.trim(),
                    diagnostics
                ),
            });
        }

        let marker = self
            .executor
            .execute(
                coordinator,
                &shell(r#"grep -qi "$1" "$2""#, [PAYLOAD_MARKER, scratch.payload.as_str()]),
                None,
            )
            .await?;
        self.logger
            .log_payload_built(&scratch.payload, marker.is_success());
        Ok(marker.is_success())
    }

    /// Write `bytes` to `path` on `target` through stdin
    pub async fn write_file(&self, target: &ProcessTarget, path: &str, bytes: &[u8]) -> Result<()> {
        let argv = shell(WRITE_SCRIPT, [bytes.len().to_string(), path.to_string()]);
        self.executor
            .execute(target, &argv, Some(bytes))
            .await?
            .into_checked(target)?;
        Ok(())
    }

    /// Remove every scratch file; failures are logged, never raised
    pub async fn cleanup(&self, coordinator: &ProcessTarget, scratch: &Scratch) {
        let mut argv = command(["rm", "-f"]);
        argv.extend(scratch.paths().iter().map(|p| p.to_string()));

        let outcome = self
            .executor
            .execute(coordinator, &argv, None)
            .await
            .and_then(|output| output.into_checked(coordinator));
        if let Err(e) = outcome {
            self.logger.log_cleanup_failed(&e.to_string());
        }
    }

    /// `Ok(None)` when the file is missing or the count is unparsable
    async fn byte_count(&self, target: &ProcessTarget, path: &str) -> Result<Option<u64>> {
        let output = self
            .executor
            .execute(target, &shell(SIZE_SCRIPT, [path]), None)
            .await?;
        if !output.is_success() {
            return Ok(None);
        }
        Ok(parse_byte_count(&output.stdout_text()))
    }

    async fn diagnose(&self, coordinator: &ProcessTarget, scratch: &Scratch) -> String {
        let argv = shell(
            DIAGNOSE_SCRIPT,
            [
                scratch.prompt.as_str(),
                scratch.artifact.as_str(),
                scratch.payload.as_str(),
            ],
        );
        match self.executor.execute(coordinator, &argv, None).await {
            Ok(output) => output.stdout_text().trim().to_string(),
            Err(e) => format!("diagnostics unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::OpenAiProvider;
    use crate::exec::ExecOutput;
    use crate::testkit::ScriptedExecutor;
    use chrono::TimeZone;

    const ARTIFACT: &str = "/tmp/tm_ITIMER_2024-01-01_12_00_00.html";

    fn worker() -> ProcessTarget {
        ProcessTarget::new("flink", "tm-0", None)
    }

    fn coordinator() -> ProcessTarget {
        ProcessTarget::new("flink", "jm-0", None)
    }

    fn scratch() -> Scratch {
        Scratch::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 5).unwrap())
    }

    fn relay(executor: Arc<ScriptedExecutor>) -> ArtifactRelay {
        ArtifactRelay::new(executor, StructuredLogger::new("flink", "sample-job"))
    }

    fn sized(executor: &ScriptedExecutor, source: u64, copy: u64) {
        executor.on_pod("tm-0", "wc -c", ExecOutput::success(format!("{}\n", source)));
        executor.on_pod("jm-0", "wc -c", ExecOutput::success(format!("{}\n", copy)));
        executor.on("cat", ExecOutput::success(vec![b'x'; source as usize]));
        executor.on("head -c", ExecOutput::success(""));
    }

    #[test]
    fn test_scratch_paths_are_timestamped() {
        let s = scratch();
        assert_eq!(s.artifact, "/tmp/squirrly_20240101_120005_000_artifact.html");
        assert_eq!(s.payload, "/tmp/squirrly_20240101_120005_000_payload.json");
        assert_eq!(s.paths().len(), 4);
    }

    #[tokio::test]
    async fn test_relay_succeeds_on_equal_counts() {
        for size in [1u64, 512, 65_536] {
            let executor = Arc::new(ScriptedExecutor::new());
            sized(&executor, size, size);

            let copied = relay(executor.clone())
                .relay(&worker(), ARTIFACT, &coordinator(), &scratch())
                .await
                .unwrap();
            assert_eq!(copied, size);

            let writes = executor.calls_matching("head -c");
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].target.pod, "jm-0");
            assert_eq!(writes[0].stdin.as_ref().map(Vec::len), Some(size as usize));
            assert!(writes[0].command.contains(&size.to_string()));
        }
    }

    #[tokio::test]
    async fn test_relay_rejects_unequal_counts() {
        for (source, copy) in [(10u64, 9u64), (1, 2), (4096, 0)] {
            let executor = Arc::new(ScriptedExecutor::new());
            sized(&executor, source, copy);

            let result = relay(executor)
                .relay(&worker(), ARTIFACT, &coordinator(), &scratch())
                .await;
            assert!(matches!(
                result,
                Err(Error::SizeMismatch { expected, actual }) if expected == source && actual == copy
            ));
        }
    }

    #[tokio::test]
    async fn test_empty_artifact_is_unreadable_before_copy() {
        let executor = Arc::new(ScriptedExecutor::new());
        sized(&executor, 0, 0);

        let result = relay(executor.clone())
            .relay(&worker(), ARTIFACT, &coordinator(), &scratch())
            .await;
        assert!(matches!(result, Err(Error::ArtifactUnreadable { .. })));
        assert!(executor.calls_matching("cat").is_empty());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_unreadable() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on("wc -c", ExecOutput::failure(1, "No such file or directory"));

        let result = relay(executor)
            .relay(&worker(), ARTIFACT, &coordinator(), &scratch())
            .await;
        assert!(matches!(result, Err(Error::ArtifactUnreadable { worker, .. }) if worker == "tm-0"));
    }

    #[tokio::test]
    async fn test_build_payload_ships_prompt_through_stdin() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on("head -c", ExecOutput::success(""));
        executor.on("jq -n", ExecOutput::success(""));
        executor.on("grep -qi", ExecOutput::success(""));

        let marker_found = relay(executor.clone())
            .build_payload(&coordinator(), &scratch(), "Explain this flamegraph", &OpenAiProvider::new())
            .await
            .unwrap();
        assert!(marker_found);

        let writes = executor.calls_matching("head -c");
        assert_eq!(
            writes[0].stdin.as_deref(),
            Some("Explain this flamegraph".as_bytes())
        );
        assert!(writes[0].command.contains(&scratch().prompt));

        let build = &executor.calls_matching("jq -n")[0];
        assert!(build.command.contains(&scratch().payload));
        assert!(build.command.contains(&scratch().artifact));
    }

    #[tokio::test]
    async fn test_build_payload_failure_carries_diagnostics() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on("head -c", ExecOutput::success(""));
        executor.on("jq -n", ExecOutput::failure(127, "sh: jq: not found"));
        executor.on("ls -l", ExecOutput::success("jq: not installed\n"));

        let result = relay(executor)
            .build_payload(&coordinator(), &scratch(), "prompt", &OpenAiProvider::new())
            .await;
        match result {
            Err(Error::PayloadBuildFailed { diagnostics }) => {
                assert!(diagnostics.contains("exit code 127"));
                assert!(diagnostics.contains("jq: not installed"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_marker_is_only_a_warning() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on("head -c", ExecOutput::success(""));
        executor.on("jq -n", ExecOutput::success(""));
        executor.on("grep -qi", ExecOutput::failure(1, ""));

        let marker_found = relay(executor)
            .build_payload(&coordinator(), &scratch(), "prompt", &OpenAiProvider::new())
            .await
            .unwrap();
        assert!(!marker_found);
    }

    #[tokio::test]
    async fn test_cleanup_removes_every_scratch_file() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on("rm -f", ExecOutput::success(""));

        relay(executor.clone())
            .cleanup(&coordinator(), &scratch())
            .await;

        let calls = executor.calls_matching("rm -f");
        assert_eq!(calls.len(), 1);
        for path in scratch().paths() {
            assert!(calls[0].command.contains(&path.to_string()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_timeout() {
        struct Stalled;

        #[async_trait::async_trait]
        impl RemoteExecutor for Stalled {
            async fn execute(
                &self,
                _target: &ProcessTarget,
                command: &[String],
                _stdin: Option<&[u8]>,
            ) -> std::result::Result<ExecOutput, ExecError> {
                if command.iter().any(|part| part == "cat") {
                    std::future::pending::<()>().await;
                }
                Ok(ExecOutput::success("42"))
            }
        }

        let relay = ArtifactRelay::new(Arc::new(Stalled), StructuredLogger::new("flink", "job"))
            .with_timeout(Duration::from_secs(3));
        let result = relay
            .relay(&worker(), ARTIFACT, &coordinator(), &scratch())
            .await;
        assert!(matches!(
            result,
            Err(Error::Exec(ExecError::Timeout { secs: 3, .. }))
        ));
    }
}
