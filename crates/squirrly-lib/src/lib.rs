//! Profiling orchestration library
//!
//! This crate provides the core functionality for:
//! - Discovering a running stream-processing job inside a cluster
//! - Triggering the in-process profiler on one of its workers
//! - Polling for and relaying the resulting flamegraph artifact
//! - Submitting the artifact to an analysis provider
//! - Delivering the run log and analysis through a result sink

pub mod analysis;
pub mod cluster;
pub mod control_plane;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod profiler;
pub mod relay;
pub mod report;
pub mod sink;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, ExecError, Result, Severity};
pub use models::*;
pub use observability::StructuredLogger;
pub use pipeline::{Orchestrator, OrchestratorConfig};
pub use report::{RunReport, RunStatus, StageStatus};
