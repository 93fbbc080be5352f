//! The orchestrator
//!
//! Runs discovery, trigger, poll, relay and analysis strictly in sequence.
//! Discovery and trigger failures end the run as failed. Once the profiler has
//! accepted a run, every later problem degrades the run instead, unless it is
//! a transport failure against the cluster itself.

use crate::analysis::{provider_for, AnalysisClient, DEFAULT_PROMPT};
use crate::cluster::ClusterQuery;
use crate::discovery::{DiscoveredTarget, Discoverer};
use crate::error::{Error, Result};
use crate::exec::RemoteExecutor;
use crate::models::{Artifact, Deployment, ProcessTarget};
use crate::observability::StructuredLogger;
use crate::profiler::{ProfilerSettings, ProfilerTrigger};
use crate::relay::{ArtifactRelay, Scratch, DEFAULT_RELAY_TIMEOUT};
use crate::report::{RunReport, RunStatus, Stage, StageStatus};
use crate::sink::{Notice, ResultSink};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Everything a run needs besides the cluster handles
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub namespace: String,
    pub deployment: String,
    /// Container to exec into on deployment pods; `None` uses the pod default
    pub container: Option<String>,
    /// Control API base URL as seen from inside the coordinator
    pub control_api_url: String,
    pub profiler: ProfilerSettings,
    pub provider: String,
    pub api_key: Option<String>,
    pub prompt: String,
    pub relay_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            deployment: "sample-job".to_string(),
            container: Some("flink-main-container".to_string()),
            control_api_url: "http://localhost:8081".to_string(),
            profiler: ProfilerSettings::default(),
            provider: "openai".to_string(),
            api_key: None,
            prompt: DEFAULT_PROMPT.to_string(),
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    cluster: Arc<dyn ClusterQuery>,
    executor: Arc<dyn RemoteExecutor>,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        cluster: Arc<dyn ClusterQuery>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        let logger = StructuredLogger::new(&config.namespace, &config.deployment);
        Self {
            config,
            cluster,
            executor,
            logger,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the whole pipeline, reporting progress through `sink`.
    ///
    /// Pipeline failures are recorded in the returned report; `Err` means the
    /// sink itself could not be written.
    pub async fn run(&self, sink: &mut ResultSink) -> Result<RunReport> {
        let settings = &self.config.profiler;
        self.logger.log_run_started(
            env!("CARGO_PKG_VERSION"),
            settings.mode.as_str(),
            settings.duration_secs,
        );

        let mut report = RunReport::new();
        self.execute(&mut report, sink).await?;
        report.finish();

        let status = report.status();
        self.logger.log_run_finished(status);
        let notice = match status {
            RunStatus::Success => Notice::Success,
            RunStatus::Degraded => Notice::Warning,
            RunStatus::Failed => Notice::Error,
        };
        sink.notice(notice, &report.summary_line())?;
        Ok(report)
    }

    async fn execute(&self, report: &mut RunReport, sink: &mut ResultSink) -> Result<()> {
        let deployment = Deployment::new(&self.config.namespace, &self.config.deployment);
        let settings = &self.config.profiler;
        sink.notice(
            Notice::Info,
            &format!(
                "Profiling {} ({} mode, {}s)",
                deployment, settings.mode, settings.duration_secs
            ),
        )?;

        let discoverer = Discoverer::new(
            self.cluster.clone(),
            self.executor.clone(),
            self.config.container.clone(),
            &self.config.control_api_url,
            self.logger.clone(),
        );
        let target = match discoverer.discover(&deployment).await {
            Ok(target) => target,
            Err(e) => return self.abort(report, sink, Stage::Discovery, e),
        };
        report.record(Stage::Discovery, StageStatus::Succeeded, None);
        sink.notice(
            Notice::Success,
            &format!(
                "Found job {} (coordinator {}, worker {})",
                target.job_id, target.coordinator.pod, target.worker_id
            ),
        )?;

        let trigger = ProfilerTrigger::new(
            self.cluster.clone(),
            self.executor.clone(),
            self.config.container.clone(),
            self.logger.clone(),
        );
        let run = match trigger.trigger(&target, settings).await {
            Ok(run) => run,
            Err(e) => return self.abort(report, sink, Stage::Trigger, e),
        };
        report.record(Stage::Trigger, StageStatus::Succeeded, None);
        sink.notice(
            Notice::Success,
            &format!(
                "Profiler started on {}; waiting {}s for it to finish",
                target.worker_id, run.duration_secs
            ),
        )?;

        let artifact = match trigger.wait_for_artifact(&target, &run, settings).await {
            Ok(artifact) => artifact,
            Err(e) => return self.degrade(report, sink, Stage::Poll, e),
        };
        if artifact.matches_run {
            report.record(Stage::Poll, StageStatus::Succeeded, None);
            sink.notice(
                Notice::Success,
                &format!(
                    "Artifact {} on {} ({} bytes)",
                    artifact.path, artifact.host_worker, artifact.size_bytes
                ),
            )?;
        } else {
            let message = format!(
                "{} on {} does not carry this run's date; using it as the closest match",
                artifact.path, artifact.host_worker
            );
            report.record(Stage::Poll, StageStatus::Degraded, Some(message.clone()));
            sink.notice(Notice::Warning, &message)?;
        }
        report.artifact = Some(artifact.clone());

        let relay = ArtifactRelay::new(self.executor.clone(), self.logger.clone())
            .with_timeout(self.config.relay_timeout);
        let scratch = Scratch::new(Utc::now());
        let outcome = self
            .relay_and_analyse(report, sink, &target, &artifact, &relay, &scratch)
            .await;
        relay.cleanup(&target.coordinator, &scratch).await;
        outcome
    }

    async fn relay_and_analyse(
        &self,
        report: &mut RunReport,
        sink: &mut ResultSink,
        target: &DiscoveredTarget,
        artifact: &Artifact,
        relay: &ArtifactRelay,
        scratch: &Scratch,
    ) -> Result<()> {
        let coordinator = &target.coordinator;
        let worker = ProcessTarget::new(
            &coordinator.namespace,
            &artifact.host_worker,
            self.config.container.clone(),
        );

        match relay
            .relay(&worker, &artifact.path, coordinator, scratch)
            .await
        {
            Ok(bytes) => {
                report.record(Stage::Relay, StageStatus::Succeeded, None);
                sink.notice(
                    Notice::Success,
                    &format!("Relayed {} bytes to {}", bytes, coordinator.pod),
                )?;
            }
            Err(e) => return self.degrade(report, sink, Stage::Relay, e),
        }

        let provider = match provider_for(&self.config.provider) {
            Ok(provider) => provider,
            Err(e) => return self.degrade(report, sink, Stage::Analysis, e),
        };

        match relay
            .build_payload(coordinator, scratch, &self.config.prompt, provider.as_ref())
            .await
        {
            Ok(true) => {}
            Ok(false) => sink.notice(
                Notice::Warning,
                "Payload does not appear to embed the artifact; submitting anyway",
            )?,
            Err(e) => return self.degrade(report, sink, Stage::Analysis, e),
        }

        let credential = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());
        let Some(credential) = credential else {
            let e = Error::MissingCredential(provider.name().to_string());
            self.logger
                .log_analysis(provider.name(), Err(&e.to_string()));
            report.record(Stage::Analysis, StageStatus::Skipped, Some(e.to_string()));
            sink.notice(Notice::Warning, &format!("Analysis skipped: {}", e))?;
            return Ok(());
        };

        let client = AnalysisClient::new(self.executor.clone(), self.logger.clone());
        match client
            .submit(coordinator, scratch, provider.as_ref(), credential)
            .await
        {
            Ok(result) => {
                report.record(Stage::Analysis, StageStatus::Succeeded, None);
                sink.notice(
                    Notice::Success,
                    &format!("Analysis from {}:", result.provider_name),
                )?;
                sink.text(&result.response_text)?;
                report.analysis = Some(result);
                Ok(())
            }
            Err(e) => self.degrade(report, sink, Stage::Analysis, e),
        }
    }

    /// Record a run-ending failure
    fn abort(
        &self,
        report: &mut RunReport,
        sink: &mut ResultSink,
        stage: Stage,
        error: Error,
    ) -> Result<()> {
        report.record(stage, StageStatus::Failed, Some(error.to_string()));
        sink.notice(Notice::Error, &format!("{} failed: {}", stage, error))?;
        Ok(())
    }

    /// Record a best-effort failure; fatal errors still end the run
    fn degrade(
        &self,
        report: &mut RunReport,
        sink: &mut ResultSink,
        stage: Stage,
        error: Error,
    ) -> Result<()> {
        if error.is_fatal() {
            return self.abort(report, sink, stage, error);
        }
        report.record(stage, StageStatus::Degraded, Some(error.to_string()));
        sink.notice(Notice::Warning, &format!("{} degraded: {}", stage, error))?;
        Ok(())
    }
}
