use super::{DownloadOutcome, JobApi, Submission};
use crate::error::JobResult;
use crate::job::{JobSpec, JobStatus};
use async_trait::async_trait;
use mockall::mock;
use std::path::Path;

mock! {
    pub JobApi {}

    #[async_trait]
    impl JobApi for JobApi {
        async fn submit(&self, spec: &JobSpec) -> JobResult<Submission>;
        async fn poll_status(&self, job_id: &str) -> JobResult<JobStatus>;
        async fn download(&self, job_id: &str, destination: &Path) -> JobResult<DownloadOutcome>;
    }
}
