use crate::error::JobResult;
use crate::job::{JobSpec, JobStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

mod http;
mod runner;
pub use http::HttpJobClient;
pub use runner::{JobOutcome, JobReport, JobRunner, PollPolicy};

#[cfg(test)]
pub(crate) mod testing;

/// Accepted submission: the id issued by the service plus the raw response.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job_id: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: u64 },
    /// The service answered with structured data instead of the artifact.
    Failed { payload: Value },
}

/// The three calls exposed by the lipsync job service.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn submit(&self, spec: &JobSpec) -> JobResult<Submission>;

    /// Single read of the job state. Safe to repeat.
    async fn poll_status(&self, job_id: &str) -> JobResult<JobStatus>;

    /// Fetches the finished artifact into `destination`, replacing any
    /// existing file. Does not check the job state first.
    async fn download(&self, job_id: &str, destination: &Path) -> JobResult<DownloadOutcome>;
}
