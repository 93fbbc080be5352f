//! Target discovery
//!
//! Resolves a named deployment to its coordinator pod, a running job and a
//! live worker. Every step is a hard stop: a discovery failure means the
//! target is genuinely absent, so nothing here retries.

use crate::cluster::ClusterQuery;
use crate::control_plane::ControlPlaneClient;
use crate::error::{Error, Result};
use crate::exec::RemoteExecutor;
use crate::models::{Deployment, PodRole, ProcessTarget};
use crate::observability::StructuredLogger;
use std::fmt;
use std::sync::Arc;

/// Discovery steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStep {
    VerifyDeploymentExists,
    ResolveCoordinatorProcess,
    VerifyControlApiReachable,
    ResolveJob,
    ResolveVertex,
    ResolveWorker,
}

impl DiscoveryStep {
    pub const ALL: [DiscoveryStep; 6] = [
        DiscoveryStep::VerifyDeploymentExists,
        DiscoveryStep::ResolveCoordinatorProcess,
        DiscoveryStep::VerifyControlApiReachable,
        DiscoveryStep::ResolveJob,
        DiscoveryStep::ResolveVertex,
        DiscoveryStep::ResolveWorker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryStep::VerifyDeploymentExists => "verify_deployment",
            DiscoveryStep::ResolveCoordinatorProcess => "resolve_coordinator",
            DiscoveryStep::VerifyControlApiReachable => "verify_control_api",
            DiscoveryStep::ResolveJob => "resolve_job",
            DiscoveryStep::ResolveVertex => "resolve_vertex",
            DiscoveryStep::ResolveWorker => "resolve_worker",
        }
    }
}

impl fmt::Display for DiscoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the later stages need to act on the target
#[derive(Clone)]
pub struct DiscoveredTarget {
    pub deployment: Deployment,
    pub coordinator: ProcessTarget,
    pub control_plane: ControlPlaneClient,
    pub job_id: String,
    pub vertex_ids: Vec<String>,
    pub worker_id: String,
}

/// Resolves a deployment to concrete processes
pub struct Discoverer {
    cluster: Arc<dyn ClusterQuery>,
    executor: Arc<dyn RemoteExecutor>,
    /// Container to exec into on deployment pods
    container: Option<String>,
    control_api_url: String,
    logger: StructuredLogger,
}

impl Discoverer {
    pub fn new(
        cluster: Arc<dyn ClusterQuery>,
        executor: Arc<dyn RemoteExecutor>,
        container: Option<String>,
        control_api_url: impl Into<String>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cluster,
            executor,
            container,
            control_api_url: control_api_url.into(),
            logger,
        }
    }

    /// Run every discovery step, stopping at the first failure
    pub async fn discover(&self, deployment: &Deployment) -> Result<DiscoveredTarget> {
        self.verify_deployment(deployment).await?;
        self.logger
            .log_discovery_step(DiscoveryStep::VerifyDeploymentExists, &deployment.name);

        let coordinator = self.resolve_coordinator(deployment).await?;
        self.logger
            .log_discovery_step(DiscoveryStep::ResolveCoordinatorProcess, &coordinator.pod);

        self.verify_control_api(deployment).await?;
        self.logger.log_discovery_step(
            DiscoveryStep::VerifyControlApiReachable,
            &deployment.rest_service(),
        );

        let control_plane = ControlPlaneClient::new(
            self.executor.clone(),
            coordinator.clone(),
            self.control_api_url.clone(),
        );

        // First entry wins for jobs and workers. Topologies with several
        // running jobs or task managers get a warning, not a wider search.
        let job_id = self
            .first(
                DiscoveryStep::ResolveJob,
                control_plane.list_jobs().await?.into_iter().map(|job| job.id),
            )
            .ok_or(Error::NoJobsFound)?;
        self.logger
            .log_discovery_step(DiscoveryStep::ResolveJob, &job_id);

        let vertex_ids: Vec<String> = control_plane
            .get_job_detail(&job_id)
            .await?
            .into_iter()
            .map(|vertex| vertex.id)
            .collect();
        self.logger.log_discovery_step(
            DiscoveryStep::ResolveVertex,
            vertex_ids.first().map(String::as_str).unwrap_or_default(),
        );

        let worker_id = self
            .first(
                DiscoveryStep::ResolveWorker,
                control_plane
                    .list_workers()
                    .await?
                    .into_iter()
                    .map(|worker| worker.id),
            )
            .ok_or(Error::NoWorkersFound)?;
        self.logger
            .log_discovery_step(DiscoveryStep::ResolveWorker, &worker_id);

        Ok(DiscoveredTarget {
            deployment: deployment.clone(),
            coordinator,
            control_plane,
            job_id,
            vertex_ids,
            worker_id,
        })
    }

    async fn verify_deployment(&self, deployment: &Deployment) -> Result<()> {
        if self.cluster.deployment_exists(deployment).await? {
            Ok(())
        } else {
            Err(Error::DeploymentNotFound {
                namespace: deployment.namespace.clone(),
                name: deployment.name.clone(),
            })
        }
    }

    async fn resolve_coordinator(&self, deployment: &Deployment) -> Result<ProcessTarget> {
        let pods = self
            .cluster
            .list_pods(
                &deployment.namespace,
                &deployment.selector(PodRole::Coordinator),
            )
            .await?;
        self.first(DiscoveryStep::ResolveCoordinatorProcess, pods)
            .map(|pod| ProcessTarget::new(&deployment.namespace, pod, self.container.clone()))
            .ok_or_else(|| Error::CoordinatorNotFound(deployment.name.clone()))
    }

    fn first(
        &self,
        step: DiscoveryStep,
        candidates: impl IntoIterator<Item = String>,
    ) -> Option<String> {
        let mut candidates = candidates.into_iter();
        let chosen = candidates.next()?;
        let others = candidates.count();
        if others > 0 {
            self.logger
                .log_ambiguous_selection(step, &chosen, others + 1);
        }
        Some(chosen)
    }

    async fn verify_control_api(&self, deployment: &Deployment) -> Result<()> {
        let service = deployment.rest_service();
        if self
            .cluster
            .service_exists(&deployment.namespace, &service)
            .await?
        {
            Ok(())
        } else {
            Err(Error::ControlApiUnreachable(service))
        }
    }
}
