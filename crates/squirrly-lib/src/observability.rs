//! Structured logging for orchestration events
//!
//! Every significant pipeline event is emitted as a `tracing` event with a
//! stable `event` field plus the run context, so JSON logs can be filtered
//! per deployment.

use crate::discovery::DiscoveryStep;
use crate::models::{Artifact, ProfilingRun};
use crate::report::RunStatus;
use tracing::{debug, info, warn};

/// Structured logger carrying the run's target context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    namespace: String,
    deployment: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            deployment: deployment.into(),
        }
    }

    /// Log run start
    pub fn log_run_started(&self, version: &str, mode: &str, duration_secs: u64) {
        info!(
            event = "run_started",
            namespace = %self.namespace,
            deployment = %self.deployment,
            version = %version,
            mode = %mode,
            duration_secs = duration_secs,
            "Profiling run started"
        );
    }

    /// Log a completed discovery step
    pub fn log_discovery_step(&self, step: DiscoveryStep, resolved: &str) {
        debug!(
            event = "discovery_step",
            namespace = %self.namespace,
            deployment = %self.deployment,
            step = %step,
            resolved = %resolved,
            "Discovery step completed"
        );
    }

    /// Log that a listing offered several candidates and the first was taken
    pub fn log_ambiguous_selection(&self, step: DiscoveryStep, chosen: &str, candidates: usize) {
        warn!(
            event = "ambiguous_selection",
            namespace = %self.namespace,
            deployment = %self.deployment,
            step = %step,
            chosen = %chosen,
            candidates = candidates,
            "Several candidates found; using the first"
        );
    }

    /// Log an accepted profiler trigger
    pub fn log_profiler_triggered(&self, worker_id: &str, run: &ProfilingRun, http_code: u16) {
        info!(
            event = "profiler_triggered",
            namespace = %self.namespace,
            deployment = %self.deployment,
            worker_id = %worker_id,
            mode = %run.mode,
            duration_secs = run.duration_secs,
            started_at = %run.started_at.to_rfc3339(),
            http_code = http_code,
            "Profiler trigger accepted"
        );
    }

    /// Log one artifact search attempt
    pub fn log_poll_attempt(&self, attempt: u32, max_attempts: u32, found: bool) {
        debug!(
            event = "poll_attempt",
            namespace = %self.namespace,
            deployment = %self.deployment,
            attempt = attempt,
            max_attempts = max_attempts,
            found = found,
            "Artifact search attempt"
        );
    }

    /// Log a search failure on one worker
    pub fn log_search_failed(&self, worker: &str, error: &str) {
        warn!(
            event = "artifact_search_failed",
            namespace = %self.namespace,
            deployment = %self.deployment,
            worker = %worker,
            error = %error,
            "Artifact search failed on worker"
        );
    }

    /// Log the artifact chosen for this run
    pub fn log_artifact_found(&self, artifact: &Artifact, attempt: u32) {
        info!(
            event = "artifact_found",
            namespace = %self.namespace,
            deployment = %self.deployment,
            path = %artifact.path,
            worker = %artifact.host_worker,
            size_bytes = artifact.size_bytes,
            matches_run = artifact.matches_run,
            attempt = attempt,
            "Profiling artifact found"
        );
    }

    /// Log the relay verification result
    pub fn log_relay(&self, expected: u64, actual: u64) {
        if expected == actual {
            info!(
                event = "relay_verified",
                namespace = %self.namespace,
                deployment = %self.deployment,
                bytes = actual,
                "Artifact relayed to coordinator"
            );
        } else {
            warn!(
                event = "relay_size_mismatch",
                namespace = %self.namespace,
                deployment = %self.deployment,
                expected_bytes = expected,
                actual_bytes = actual,
                "Relayed artifact size differs from source"
            );
        }
    }

    /// Log the payload build and whether the artifact marker was found in it
    pub fn log_payload_built(&self, path: &str, marker_found: bool) {
        if marker_found {
            debug!(
                event = "payload_built",
                namespace = %self.namespace,
                deployment = %self.deployment,
                path = %path,
                "Analysis payload built"
            );
        } else {
            warn!(
                event = "payload_marker_missing",
                namespace = %self.namespace,
                deployment = %self.deployment,
                path = %path,
                "Analysis payload does not appear to embed the artifact"
            );
        }
    }

    /// Log analysis completion or failure
    pub fn log_analysis(&self, provider: &str, outcome: Result<usize, &str>) {
        match outcome {
            Ok(chars) => info!(
                event = "analysis_completed",
                namespace = %self.namespace,
                deployment = %self.deployment,
                provider = %provider,
                response_chars = chars,
                "Analysis completed"
            ),
            Err(reason) => warn!(
                event = "analysis_unavailable",
                namespace = %self.namespace,
                deployment = %self.deployment,
                provider = %provider,
                reason = %reason,
                "Analysis not available"
            ),
        }
    }

    /// Log temp file cleanup problems on the coordinator
    pub fn log_cleanup_failed(&self, error: &str) {
        warn!(
            event = "cleanup_failed",
            namespace = %self.namespace,
            deployment = %self.deployment,
            error = %error,
            "Failed to remove temporary files on coordinator"
        );
    }

    /// Log the end of the run
    pub fn log_run_finished(&self, status: RunStatus) {
        match status {
            RunStatus::Success => info!(
                event = "run_finished",
                namespace = %self.namespace,
                deployment = %self.deployment,
                status = %status,
                "Profiling run finished"
            ),
            _ => warn!(
                event = "run_finished",
                namespace = %self.namespace,
                deployment = %self.deployment,
                status = %status,
                "Profiling run finished"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("flink", "sample-job");
        assert_eq!(logger.namespace, "flink");
        assert_eq!(logger.deployment, "sample-job");
    }
}
