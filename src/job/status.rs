use crate::error::{JobError, JobResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Any non-terminal value reported by the service, kept verbatim.
    Running(String),
    Finished,
    Failed,
}

impl JobState {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "finished" => JobState::Finished,
            "failed" => JobState::Failed,
            _ => JobState::Running(value.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running(_))
    }
}

/// One observation of a job as reported by the `status` endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// The full response body, kept for diagnostics.
    pub raw: Value,
}

impl JobStatus {
    /// Reads the state from `status`, falling back to the older `message`
    /// field some deployments still return.
    pub fn from_response(job_id: &str, raw: Value) -> JobResult<Self> {
        let state = {
            let object = raw
                .as_object()
                .ok_or_else(|| JobError::service(raw.clone()))?;
            object
                .get("status")
                .and_then(Value::as_str)
                .or_else(|| object.get("message").and_then(Value::as_str))
                .map(JobState::parse)
                .ok_or_else(|| JobError::service(raw.clone()))?
        };
        Ok(Self {
            job_id: job_id.to_string(),
            state,
            raw,
        })
    }
}
