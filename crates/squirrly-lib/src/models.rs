//! Core data models for the profiling run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named logical target owning one coordinator and N workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub namespace: String,
    pub name: String,
}

impl Deployment {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Label selector for pods carrying the given component role
    pub fn selector(&self, role: PodRole) -> String {
        format!("app={},component={}", self.name, role.label())
    }

    /// Name of the service fronting the coordinator's REST endpoint
    pub fn rest_service(&self) -> String {
        format!("{}-rest", self.name)
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Role label of a deployment pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodRole {
    Coordinator,
    Worker,
}

impl PodRole {
    pub fn label(&self) -> &'static str {
        match self {
            PodRole::Coordinator => "jobmanager",
            PodRole::Worker => "taskmanager",
        }
    }
}

/// A resolved remote execution target: a container inside a pod
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessTarget {
    pub namespace: String,
    pub pod: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl ProcessTarget {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container,
        }
    }
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(c) => write!(f, "{}/{}[{}]", self.namespace, self.pod, c),
            None => write!(f, "{}/{}", self.namespace, self.pod),
        }
    }
}

/// Profiler sampling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProfilerMode {
    Cpu,
    #[default]
    Itimer,
    Alloc,
}

impl ProfilerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilerMode::Cpu => "CPU",
            ProfilerMode::Itimer => "ITIMER",
            ProfilerMode::Alloc => "ALLOC",
        }
    }
}

impl fmt::Display for ProfilerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfilerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CPU" => Ok(ProfilerMode::Cpu),
            "ITIMER" => Ok(ProfilerMode::Itimer),
            "ALLOC" => Ok(ProfilerMode::Alloc),
            other => Err(format!(
                "unknown profiler mode '{}' (expected CPU, ITIMER or ALLOC)",
                other
            )),
        }
    }
}

/// An accepted profiling run; immutable once the trigger succeeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingRun {
    pub mode: ProfilerMode,
    pub duration_secs: u64,
    /// Recorded before the trigger request; correlates artifacts to this run
    pub started_at: DateTime<Utc>,
}

impl ProfilingRun {
    /// Date fragment the profiler embeds in artifact file names
    pub fn date_stamp(&self) -> String {
        self.started_at.format("%Y-%m-%d").to_string()
    }
}

/// A profiling output file located on a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub host_worker: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// True only when the run's date stamp literally appears in the file name
    pub matches_run: bool,
}

impl Artifact {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// The outcome of a successful analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub provider_name: String,
    /// Coordinator path of the payload that was submitted
    pub request_payload: String,
    pub response_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_profiler_mode_parsing() {
        assert_eq!("itimer".parse::<ProfilerMode>(), Ok(ProfilerMode::Itimer));
        assert_eq!("CPU".parse::<ProfilerMode>(), Ok(ProfilerMode::Cpu));
        assert_eq!(" Alloc ".parse::<ProfilerMode>(), Ok(ProfilerMode::Alloc));
        assert!("WALL".parse::<ProfilerMode>().is_err());
        assert_eq!(ProfilerMode::default(), ProfilerMode::Itimer);
    }

    #[test]
    fn test_deployment_selectors() {
        let deployment = Deployment::new("flink", "sample-job");
        assert_eq!(
            deployment.selector(PodRole::Coordinator),
            "app=sample-job,component=jobmanager"
        );
        assert_eq!(
            deployment.selector(PodRole::Worker),
            "app=sample-job,component=taskmanager"
        );
        assert_eq!(deployment.rest_service(), "sample-job-rest");
        assert_eq!(deployment.to_string(), "flink/sample-job");
    }

    #[test]
    fn test_run_date_stamp() {
        let run = ProfilingRun {
            mode: ProfilerMode::Itimer,
            duration_secs: 5,
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };
        assert_eq!(run.date_stamp(), "2024-01-01");
    }

    #[test]
    fn test_artifact_file_name() {
        let artifact = Artifact {
            path: "/tmp/tm-1_ITIMER_2024-01-01_12_00_00.html".to_string(),
            host_worker: "sample-job-taskmanager-1-1".to_string(),
            size_bytes: 42,
            modified_at: None,
            matches_run: true,
        };
        assert_eq!(artifact.file_name(), "tm-1_ITIMER_2024-01-01_12_00_00.html");
    }
}
