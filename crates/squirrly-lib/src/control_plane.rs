//! Client for the job runtime's REST control API
//!
//! The orchestrator has no network path to the control API, so every request
//! is issued with `curl` from inside the coordinator container against its own
//! REST endpoint. Responses are parsed as JSON.
//!
//! Listing calls return every entry, but callers pick the first one: the
//! profiler targets single-job, single-worker topologies, and no ordering or
//! freshness guarantee is assumed for the listing.

use crate::error::{Error, Result};
use crate::exec::{command, RemoteExecutor};
use crate::models::{ProcessTarget, ProfilerMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Request timeout handed to curl, in seconds
const CURL_MAX_TIME_SECS: u32 = 30;

/// Raw HTTP exchange result. `code` is `None` when no response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub code: Option<u16>,
    pub body: String,
}

impl HttpResponse {
    /// Split curl output produced with `-w "\n%{http_code}"`
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_end_matches(['\r', '\n']);
        let (body, code) = match trimmed.rsplit_once('\n') {
            Some((body, code)) => (body, code),
            None => ("", trimmed),
        };
        let code = code.trim().parse::<u16>().ok().filter(|c| *c != 0);
        Self {
            code,
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.code, Some(200..=299))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSummary {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VertexSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobDetail {
    #[serde(default)]
    vertices: Vec<VertexSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSummary {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkerList {
    #[serde(default, alias = "workers")]
    taskmanagers: Vec<WorkerSummary>,
}

/// Body of the profiler trigger request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerRequest {
    pub mode: ProfilerMode,
    pub duration: u64,
}

/// Control API client bound to one coordinator process
#[derive(Clone)]
pub struct ControlPlaneClient {
    executor: Arc<dyn RemoteExecutor>,
    coordinator: ProcessTarget,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        coordinator: ProcessTarget,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            coordinator,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Issue a request and return the raw exchange.
    ///
    /// A curl failure (connection refused, timeout) yields `code: None`;
    /// only a failure to run the command at all is an error.
    async fn request(&self, method: &str, path: &str, body: Option<&str>) -> Result<HttpResponse> {
        let max_time = CURL_MAX_TIME_SECS.to_string();
        let mut argv = command(["curl", "-sS", "--max-time", max_time.as_str(), "-X", method]);
        if let Some(body) = body {
            argv.extend(command(["-H", "Content-Type: application/json", "-d", body]));
        }
        argv.extend(command(["-w", "\n%{http_code}"]));
        argv.push(self.url(path));

        let output = self
            .executor
            .execute(&self.coordinator, &argv, None)
            .await?;
        let response = HttpResponse::parse(&output.stdout_text());
        debug!(
            method = %method,
            path = %path,
            code = ?response.code,
            exit_code = output.exit_code,
            "Control API request"
        );
        Ok(response)
    }

    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let response = self.request("GET", path, None).await?;
        if response.code.is_none() {
            return Err(Error::ControlApiUnreachable(self.url(path)));
        }
        Ok(response)
    }

    /// List jobs known to the control plane
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let response = self.get("jobs").await?;
        let jobs = serde_json::from_str::<JobList>(&response.body)
            .map(|list| list.jobs)
            .unwrap_or_default();
        if jobs.is_empty() {
            return Err(Error::NoJobsFound);
        }
        Ok(jobs)
    }

    /// Vertices of a job's execution graph
    pub async fn get_job_detail(&self, job_id: &str) -> Result<Vec<VertexSummary>> {
        let response = self.get(&format!("jobs/{}", job_id)).await?;
        let vertices = serde_json::from_str::<JobDetail>(&response.body)
            .map(|detail| detail.vertices)
            .unwrap_or_default();
        if vertices.is_empty() {
            return Err(Error::VertexNotFound(job_id.to_string()));
        }
        Ok(vertices)
    }

    /// Workers registered with the control plane
    pub async fn list_workers(&self) -> Result<Vec<WorkerSummary>> {
        let response = self.get("taskmanagers").await?;
        let workers = serde_json::from_str::<WorkerList>(&response.body)
            .map(|list| list.taskmanagers)
            .unwrap_or_default();
        if workers.is_empty() {
            return Err(Error::NoWorkersFound);
        }
        Ok(workers)
    }

    /// Start a timed profiling run; succeeds only on HTTP 200 or 202
    pub async fn start_profiling(
        &self,
        worker_id: &str,
        mode: ProfilerMode,
        duration_secs: u64,
    ) -> Result<HttpResponse> {
        let body = profiler_request_body(mode, duration_secs)?;
        let response = self
            .request(
                "POST",
                &format!("taskmanagers/{}/profiler", worker_id),
                Some(&body),
            )
            .await?;

        match response.code {
            Some(200) | Some(202) => Ok(response),
            http_code => Err(Error::ProfilerTriggerFailed {
                http_code,
                body: response.body,
            }),
        }
    }
}

/// JSON body for the profiler trigger; echoes mode and duration unchanged
pub fn profiler_request_body(mode: ProfilerMode, duration_secs: u64) -> Result<String> {
    Ok(serde_json::to_string(&ProfilerRequest {
        mode,
        duration: duration_secs,
    })?)
}
