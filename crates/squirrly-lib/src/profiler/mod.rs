//! Profiler trigger and artifact poller
//!
//! Starts a timed profiling run on the chosen worker, sleeps out the run's
//! duration, then searches every worker pod for the HTML artifact under a
//! [`PollPolicy`]. Workers are visited sequentially within an attempt and the
//! first worker with any match wins.

mod poll;
mod search;

pub use poll::{PollOutcome, PollPolicy};
pub use search::{parse_stat, stat_command, ArtifactPattern, Candidate};

use crate::cluster::ClusterQuery;
use crate::discovery::DiscoveredTarget;
use crate::error::{Error, Result};
use crate::exec::RemoteExecutor;
use crate::models::{Artifact, PodRole, ProcessTarget, ProfilerMode, ProfilingRun};
use crate::observability::StructuredLogger;
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Default artifact search paths on worker pods
pub const DEFAULT_SEARCH_PATHS: [&str; 3] = ["/tmp", "/opt/flink/log", "/opt/flink/profiler"];

/// Parameters of one profiling run
#[derive(Debug, Clone)]
pub struct ProfilerSettings {
    pub mode: ProfilerMode,
    pub duration_secs: u64,
    pub search_paths: Vec<String>,
    pub poll: PollPolicy,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            mode: ProfilerMode::default(),
            duration_secs: 60,
            search_paths: DEFAULT_SEARCH_PATHS.iter().map(|p| p.to_string()).collect(),
            poll: PollPolicy::default(),
        }
    }
}

pub struct ProfilerTrigger {
    cluster: Arc<dyn ClusterQuery>,
    executor: Arc<dyn RemoteExecutor>,
    container: Option<String>,
    logger: StructuredLogger,
}

impl ProfilerTrigger {
    pub fn new(
        cluster: Arc<dyn ClusterQuery>,
        executor: Arc<dyn RemoteExecutor>,
        container: Option<String>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cluster,
            executor,
            container,
            logger,
        }
    }

    /// Start profiling on the discovered worker.
    ///
    /// `started_at` is taken before the request is sent and truncated to
    /// whole seconds; it is the key used to match artifacts to this run.
    pub async fn trigger(
        &self,
        target: &DiscoveredTarget,
        settings: &ProfilerSettings,
    ) -> Result<ProfilingRun> {
        let started_at = Utc::now().trunc_subsecs(0);
        let response = target
            .control_plane
            .start_profiling(&target.worker_id, settings.mode, settings.duration_secs)
            .await?;

        let run = ProfilingRun {
            mode: settings.mode,
            duration_secs: settings.duration_secs,
            started_at,
        };
        self.logger.log_profiler_triggered(
            &target.worker_id,
            &run,
            response.code.unwrap_or_default(),
        );
        Ok(run)
    }

    /// Sleep out the run, then poll the workers for its artifact
    pub async fn wait_for_artifact(
        &self,
        target: &DiscoveredTarget,
        run: &ProfilingRun,
        settings: &ProfilerSettings,
    ) -> Result<Artifact> {
        // The profiler exposes no completion signal besides the file itself.
        tokio::time::sleep(Duration::from_secs(run.duration_secs)).await;

        let deployment = &target.deployment;
        let workers: Vec<ProcessTarget> = self
            .cluster
            .list_pods(&deployment.namespace, &deployment.selector(PodRole::Worker))
            .await?
            .into_iter()
            .map(|pod| ProcessTarget::new(&deployment.namespace, pod, self.container.clone()))
            .collect();
        if workers.is_empty() {
            return Err(Error::NoWorkerPodsFound(deployment.name.clone()));
        }

        let pattern = ArtifactPattern::for_run(run);
        let search = pattern.search_command(&settings.search_paths);
        let max_attempts = settings.poll.max_attempts;

        let outcome = settings
            .poll
            .run(|attempt| self.search_attempt(attempt, max_attempts, &workers, &pattern, &search))
            .await;

        match outcome {
            PollOutcome::Found {
                value: (worker, candidate),
                attempt,
            } => {
                let artifact = self.describe(&worker, candidate).await;
                self.logger.log_artifact_found(&artifact, attempt);
                Ok(artifact)
            }
            PollOutcome::Exhausted { attempts } => Err(Error::NoArtifactFound { attempts }),
        }
    }

    /// [`trigger`](Self::trigger) followed by [`wait_for_artifact`](Self::wait_for_artifact)
    pub async fn trigger_and_wait(
        &self,
        target: &DiscoveredTarget,
        settings: &ProfilerSettings,
    ) -> Result<(ProfilingRun, Artifact)> {
        let run = self.trigger(target, settings).await?;
        let artifact = self.wait_for_artifact(target, &run, settings).await?;
        Ok((run, artifact))
    }

    async fn search_attempt(
        &self,
        attempt: u32,
        max_attempts: u32,
        workers: &[ProcessTarget],
        pattern: &ArtifactPattern,
        search: &[String],
    ) -> Option<(ProcessTarget, Candidate)> {
        let mut found = None;
        for worker in workers {
            match self.executor.execute(worker, search, None).await {
                Ok(output) => {
                    if let Some(candidate) = pattern.select_candidate(&output.stdout_text()) {
                        found = Some((worker.clone(), candidate));
                        break;
                    }
                }
                Err(e) => self.logger.log_search_failed(&worker.pod, &e.to_string()),
            }
        }
        self.logger
            .log_poll_attempt(attempt, max_attempts, found.is_some());
        found
    }

    /// Stat the chosen file. A failed stat leaves size and mtime unknown;
    /// the relay measures the size again before copying.
    async fn describe(&self, worker: &ProcessTarget, candidate: Candidate) -> Artifact {
        let stat = match self
            .executor
            .execute(worker, &stat_command(&candidate.path), None)
            .await
        {
            Ok(output) => parse_stat(&output.stdout_text()),
            Err(e) => {
                self.logger.log_search_failed(&worker.pod, &e.to_string());
                None
            }
        };
        let (size_bytes, modified_at) = stat.unwrap_or((0, None));

        Artifact {
            path: candidate.path,
            host_worker: worker.pod.clone(),
            size_bytes,
            modified_at,
            matches_run: candidate.matches_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::ControlPlaneClient;
    use crate::exec::ExecOutput;
    use crate::models::Deployment;
    use crate::testkit::{FakeCluster, ScriptedExecutor};
    use tokio::time::Instant;

    const NS: &str = "flink";
    const TRIGGER: &str = "taskmanagers/tm-1/profiler";

    fn target(executor: Arc<ScriptedExecutor>) -> DiscoveredTarget {
        let coordinator = ProcessTarget::new(NS, "sample-job-jm-0", None);
        DiscoveredTarget {
            deployment: Deployment::new(NS, "sample-job"),
            coordinator: coordinator.clone(),
            control_plane: ControlPlaneClient::new(executor, coordinator, "http://localhost:8081"),
            job_id: "job-1".to_string(),
            vertex_ids: vec!["v-1".to_string()],
            worker_id: "tm-1".to_string(),
        }
    }

    fn cluster(workers: &[&str]) -> FakeCluster {
        let d = Deployment::new(NS, "sample-job");
        FakeCluster::new().with_pods(NS, &d.selector(PodRole::Worker), workers)
    }

    fn trigger(cluster: FakeCluster, executor: Arc<ScriptedExecutor>) -> ProfilerTrigger {
        ProfilerTrigger::new(
            Arc::new(cluster),
            executor,
            None,
            StructuredLogger::new(NS, "sample-job"),
        )
    }

    fn settings(duration_secs: u64) -> ProfilerSettings {
        ProfilerSettings {
            duration_secs,
            ..ProfilerSettings::default()
        }
    }

    fn today_artifact(worker: &str) -> String {
        format!(
            "/tmp/{}_ITIMER_{}_12_00_00.html\n",
            worker,
            Utc::now().format("%Y-%m-%d")
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_worker_with_a_match_wins() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on(TRIGGER, ExecOutput::success("{}\n202"));
        executor.on_pod("tm-a", "find", ExecOutput::success(""));
        executor.on_pod("tm-b", "find", ExecOutput::success(today_artifact("tm-b")));
        executor.on_pod("tm-c", "find", ExecOutput::success(today_artifact("tm-c")));
        executor.on("stat", ExecOutput::success("4096 1704110400"));

        let t = target(executor.clone());
        let (run, artifact) = trigger(cluster(&["tm-a", "tm-b", "tm-c"]), executor.clone())
            .trigger_and_wait(&t, &settings(5))
            .await
            .unwrap();

        assert_eq!(run.mode, ProfilerMode::Itimer);
        assert_eq!(artifact.host_worker, "tm-b");
        assert_eq!(artifact.size_bytes, 4096);
        assert!(artifact.matches_run);
        assert!(executor
            .calls_matching("find")
            .iter()
            .all(|call| call.target.pod != "tm-c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_worker_is_skipped() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on(TRIGGER, ExecOutput::success("{}\n200"));
        executor.on_pod("tm-b", "find", ExecOutput::success(today_artifact("tm-b")));
        executor.fail_transport("find", "pod tm-a is gone");
        executor.on("stat", ExecOutput::success("10 1704110400"));

        let t = target(executor.clone());
        let (_, artifact) = trigger(cluster(&["tm-a", "tm-b"]), executor)
            .trigger_and_wait(&t, &settings(1))
            .await
            .unwrap();
        assert_eq!(artifact.host_worker, "tm-b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_poll_takes_duration_plus_budget() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on(TRIGGER, ExecOutput::success("{}\n202"));
        executor.on("find", ExecOutput::success(""));

        let t = target(executor.clone());
        let start = Instant::now();
        let result = trigger(cluster(&["tm-a"]), executor.clone())
            .trigger_and_wait(&t, &settings(5))
            .await;

        assert!(matches!(result, Err(Error::NoArtifactFound { attempts: 12 })));
        assert_eq!(start.elapsed(), Duration::from_secs(5 + 60));
        assert_eq!(executor.calls_matching("find").len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_trigger_does_not_sleep_or_poll() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on(TRIGGER, ExecOutput::success("boom\n500"));

        let t = target(executor.clone());
        let start = Instant::now();
        let result = trigger(cluster(&["tm-a"]), executor.clone())
            .trigger_and_wait(&t, &settings(30))
            .await;

        assert!(matches!(
            result,
            Err(Error::ProfilerTriggerFailed {
                http_code: Some(500),
                ..
            })
        ));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(executor.calls_matching("find").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_worker_pods() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on(TRIGGER, ExecOutput::success("{}\n202"));

        let t = target(executor.clone());
        let result = trigger(cluster(&[]), executor)
            .trigger_and_wait(&t, &settings(1))
            .await;
        assert!(matches!(result, Err(Error::NoWorkerPodsFound(name)) if name == "sample-job"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_on_later_attempt() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.on(TRIGGER, ExecOutput::success("{}\n202"));
        executor.on_sequence(
            None,
            "find",
            vec![
                ExecOutput::success(""),
                ExecOutput::success(""),
                ExecOutput::success("/opt/flink/log/tm_ITIMER_2020-01-01_00_00_00.html\n"),
            ],
        );
        executor.on("stat", ExecOutput::success("garbage"));

        let t = target(executor.clone());
        let start = Instant::now();
        let (_, artifact) = trigger(cluster(&["tm-a"]), executor)
            .trigger_and_wait(&t, &settings(2))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(2 + 10));
        assert!(!artifact.matches_run);
        assert_eq!(artifact.size_bytes, 0);
    }
}
