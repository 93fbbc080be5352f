//! Stage outcome tracking and overall run status

use crate::models::{AnalysisResult, Artifact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Trigger,
    Poll,
    Relay,
    Analysis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovery => "discovery",
            Stage::Trigger => "trigger",
            Stage::Poll => "poll",
            Stage::Relay => "relay",
            Stage::Analysis => "analysis",
        };
        f.write_str(name)
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    /// Completed with a warning; the run continues
    Degraded,
    /// Intentionally not performed
    Skipped,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Degraded => "degraded",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Degraded,
    Failed,
}

impl RunStatus {
    /// Process exit code: degraded runs still exit successfully
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Success | RunStatus::Degraded => 0,
            RunStatus::Failed => 1,
        }
    }

    /// Compute overall status from stage outcomes
    pub fn compute(stages: &[StageOutcome]) -> RunStatus {
        let mut has_degraded = false;

        for outcome in stages {
            match outcome.status {
                StageStatus::Failed => return RunStatus::Failed,
                StageStatus::Degraded | StageStatus::Skipped => has_degraded = true,
                StageStatus::Succeeded => {}
            }
        }

        if has_degraded {
            RunStatus::Degraded
        } else {
            RunStatus::Success
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Success => "success",
            RunStatus::Degraded => "degraded",
            RunStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            artifact: None,
            analysis: None,
        }
    }

    /// Record a stage outcome, replacing an earlier outcome for the same stage
    pub fn record(&mut self, stage: Stage, status: StageStatus, message: Option<String>) {
        self.stages.retain(|outcome| outcome.stage != stage);
        self.stages.push(StageOutcome {
            stage,
            status,
            message,
        });
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|outcome| outcome.stage == stage)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::compute(&self.stages)
    }

    /// One-line summary of the run
    pub fn summary_line(&self) -> String {
        let artifact = match &self.artifact {
            Some(artifact) if artifact.matches_run => {
                format!("artifact found ({})", artifact.file_name())
            }
            Some(artifact) => format!(
                "artifact found ({}, best-effort match)",
                artifact.file_name()
            ),
            None => "no artifact found".to_string(),
        };

        let analysis = match self.outcome(Stage::Analysis).map(|o| o.status) {
            Some(StageStatus::Succeeded) => "analysis completed",
            Some(StageStatus::Skipped) => "analysis skipped",
            Some(StageStatus::Degraded) | Some(StageStatus::Failed) => "analysis failed",
            None => "analysis not attempted",
        };

        format!("Run {}: {}, {}", self.status(), artifact, analysis)
    }
}
