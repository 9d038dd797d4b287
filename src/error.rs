use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors produced while building, submitting, tracking or downloading a job.
///
/// `Validation` is always raised before any request leaves the process.
/// `JobFailed` means the service accepted the job and later reported it as
/// failed, which callers usually want to tell apart from `Transport` (the
/// service could not be reached) and `Service` (the service answered with an
/// error payload).
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job parameters: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    /// The HTTP client or a request could not be built; nothing was sent.
    #[error("http client error: {0}")]
    Client(reqwest::Error),

    #[error("service error: {payload}")]
    Service { payload: Value },

    #[error("job {job_id} failed: {payload}")]
    JobFailed { job_id: String, payload: Value },

    #[error("job {job_id} still running after {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error("job {job_id} cancelled")]
    Cancelled { job_id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobError {
    pub fn validation(message: impl Into<String>) -> Self {
        JobError::Validation(message.into())
    }

    pub fn service(payload: Value) -> Self {
        JobError::Service { payload }
    }

    /// Wraps a non-JSON body so it can still be reported as a payload.
    pub fn service_text(status: u16, body: &str) -> Self {
        JobError::Service {
            payload: json!({ "error": body, "status": status }),
        }
    }

    /// Stable identifier used when recording the error in batch results.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::Transport(_) => "transport",
            JobError::Client(_) => "client",
            JobError::Service { .. } => "service",
            JobError::JobFailed { .. } => "job_failed",
            JobError::Timeout { .. } => "timeout",
            JobError::Cancelled { .. } => "cancelled",
            JobError::Io(_) => "io",
            JobError::Json(_) => "json",
        }
    }

    /// Server supplied diagnostics, when the error carries any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            JobError::Service { payload } | JobError::JobFailed { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "payload": self.payload().cloned().unwrap_or(Value::Null),
        })
    }
}

impl From<reqwest::Error> for JobError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            JobError::Client(e)
        } else {
            JobError::Transport(e)
        }
    }
}

pub type JobResult<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_build_failure_is_not_transport() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let err = JobError::from(err);
        assert_eq!(err.kind(), "client");
        assert!(err.payload().is_none());
    }

    #[test]
    fn test_to_json_carries_kind_and_payload() {
        let value = JobError::service_text(502, "bad gateway").to_json();
        assert_eq!(value["kind"], "service");
        assert_eq!(value["payload"]["status"], 502);
        assert_eq!(value["payload"]["error"], "bad gateway");
    }
}
