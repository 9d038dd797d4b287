use super::{DownloadOutcome, JobApi};
use crate::config::{ClientConfig, Profile};
use crate::error::{JobError, JobResult};
use crate::job::{JobOptions, JobSpec, JobState};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the service reports a terminal state.
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: None,
        }
    }
}

impl From<&ClientConfig> for PollPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_wait: config.max_wait(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    /// The service reported the job as failed; nothing was downloaded.
    Failed { status: Value },
    /// The job finished but the download returned a diagnostic payload.
    DownloadFailed { payload: Value },
}

/// Result of one submit, poll, download cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: String,
    /// Raw body of the `generate` response.
    pub submission: Value,
    pub polls: u32,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Downloaded { .. })
    }

    /// Converts unsuccessful outcomes into the matching error.
    pub fn into_result(self) -> JobResult<JobReport> {
        match &self.outcome {
            JobOutcome::Downloaded { .. } => Ok(self),
            JobOutcome::Failed { status } => Err(JobError::JobFailed {
                job_id: self.job_id.clone(),
                payload: status.clone(),
            }),
            JobOutcome::DownloadFailed { payload } => Err(JobError::service(payload.clone())),
        }
    }
}

/// Drives a job through submission, polling and download.
///
/// The stages run strictly one after another. Polling stops on `finished`
/// or `failed`, when `max_wait` elapses, or when the cancellation token
/// fires; the token is checked once per iteration and while sleeping.
pub struct JobRunner {
    api: Arc<dyn JobApi>,
    policy: PollPolicy,
    profile: Profile,
    tts_engine: String,
}

impl JobRunner {
    pub fn new(api: Arc<dyn JobApi>, policy: PollPolicy) -> Self {
        Self {
            api,
            policy,
            profile: Profile::default(),
            tts_engine: crate::job::DEFAULT_TTS_ENGINE.to_string(),
        }
    }

    pub fn from_config(api: Arc<dyn JobApi>, config: &ClientConfig) -> Self {
        Self::new(api, PollPolicy::from(config))
            .with_profile(config.profile)
            .with_tts_engine(config.tts_engine.clone())
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_tts_engine(mut self, engine: String) -> Self {
        self.tts_engine = engine;
        self
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn build_spec(&self, options: &JobOptions) -> JobResult<JobSpec> {
        options.build(self.profile, &self.tts_engine)
    }

    /// Builds a job from loose options, then runs it. Invalid options fail
    /// before anything is sent.
    pub async fn run_options(
        &self,
        options: &JobOptions,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> JobResult<JobReport> {
        let spec = self.build_spec(options)?;
        self.run(&spec, destination, cancel).await
    }

    pub async fn run(
        &self,
        spec: &JobSpec,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> JobResult<JobReport> {
        let submission = self.api.submit(spec).await?;
        let job_id = submission.job_id.clone();

        let (polls, status) = match self.wait_for_completion(&job_id, cancel).await? {
            (polls, JobState::Finished, _) => (polls, None),
            (polls, _, raw) => (polls, Some(raw)),
        };

        if let Some(status) = status {
            warn!(job_id = %job_id, polls, %status, "job failed");
            return Ok(JobReport {
                job_id,
                submission: submission.response,
                polls,
                outcome: JobOutcome::Failed { status },
            });
        }

        let outcome = match self.api.download(&job_id, destination).await? {
            DownloadOutcome::Saved { path, bytes } => JobOutcome::Downloaded { path, bytes },
            DownloadOutcome::Failed { payload } => JobOutcome::DownloadFailed { payload },
        };

        Ok(JobReport {
            job_id,
            submission: submission.response,
            polls,
            outcome,
        })
    }

    /// Polls until the job reaches a terminal state and returns the number
    /// of polls, the terminal state and the last raw status.
    async fn wait_for_completion(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> JobResult<(u32, JobState, Value)> {
        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled {
                    job_id: job_id.to_string(),
                });
            }

            let status = self.api.poll_status(job_id).await?;
            polls += 1;
            match status.state {
                JobState::Finished | JobState::Failed => {
                    info!(job_id, polls, state = ?status.state, "job reached terminal state");
                    return Ok((polls, status.state, status.raw));
                }
                JobState::Running(ref state) => {
                    debug!(job_id, polls, state = %state, "job still running");
                }
            }

            let waited = started.elapsed();
            if let Some(max_wait) = self.policy.max_wait {
                if waited >= max_wait {
                    return Err(JobError::Timeout {
                        job_id: job_id.to_string(),
                        waited,
                    });
                }
            }

            if !self.policy.interval.is_zero() {
                select! {
                    _ = cancel.cancelled() => {
                        return Err(JobError::Cancelled { job_id: job_id.to_string() });
                    }
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
        }
    }
}
