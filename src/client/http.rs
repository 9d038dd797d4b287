use super::{DownloadOutcome, JobApi, Submission};
use crate::config::{ClientConfig, DownloadAddressing};
use crate::error::{JobError, JobResult};
use crate::job::{JobSpec, JobStatus};
use crate::version;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// reqwest implementation of [`JobApi`] against the lipsync HTTP service.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    base_url: Url,
    token: String,
    addressing: DownloadAddressing,
    /// Applied to `generate` and `status` only. Downloads are bounded by the
    /// connect timeout alone.
    request_timeout: Option<Duration>,
    http_client: HttpClient,
}

impl HttpJobClient {
    pub fn new(config: &ClientConfig, token: impl Into<String>) -> JobResult<Self> {
        // A trailing slash keeps `join` from replacing the last path segment.
        let base = format!("{}/", config.base_url().trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| {
            JobError::validation(format!("invalid base url '{}': {}", config.base_url(), e))
        })?;

        let request_timeout = config.request_timeout_ms.map(Duration::from_millis);
        let mut builder = HttpClient::builder().user_agent(version::get_useragent());
        if let Some(timeout) = request_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            base_url,
            token: token.into(),
            addressing: config.download_addressing(),
            request_timeout,
            http_client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn with_timeout(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    fn endpoint(&self, name: &str) -> JobResult<Url> {
        self.base_url
            .join(name)
            .map_err(|e| JobError::validation(format!("invalid endpoint {}: {}", name, e)))
    }

    async fn job_form(spec: &JobSpec, audio_file: &Path) -> JobResult<Form> {
        let bytes = tokio::fs::read(audio_file).await?;
        let file_name = audio_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let job = serde_json::to_string_pretty(&spec.to_request())?;
        Ok(Form::new()
            .part("audio", Part::bytes(bytes).file_name(file_name))
            .part("job", Part::text(job).mime_str("application/json")?))
    }
}

/// `fileName` used by the file name addressed download endpoint.
pub(crate) fn download_file_name(job_id: &str, destination: &Path) -> String {
    match destination.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", job_id, ext),
        _ => job_id.to_string(),
    }
}

fn job_id_of(response: &Value) -> Option<String> {
    let id = response.get("jobId").or_else(|| response.get("job_id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_json_object(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Map<String, Value>>(body).is_ok()
}

#[async_trait]
impl JobApi for HttpJobClient {
    async fn submit(&self, spec: &JobSpec) -> JobResult<Submission> {
        let url = self.endpoint("generate")?;
        let request = self.with_timeout(
            self.http_client
                .post(url)
                .query(&[("token", self.token.as_str())]),
        );

        let request = match spec.audio_file() {
            Some(audio_file) => {
                debug!(audio_file = %audio_file.display(), "submitting job with audio upload");
                request.multipart(Self::job_form(spec, audio_file).await?)
            }
            None => request.json(&spec.to_request()),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => return Err(JobError::service_text(status.as_u16(), &body)),
        };
        if !status.is_success() {
            warn!(status = status.as_u16(), "generate request rejected");
            return Err(JobError::service(value));
        }

        match job_id_of(&value) {
            Some(job_id) => {
                info!(job_id = %job_id, output = %spec.output_type(), "job submitted");
                Ok(Submission {
                    job_id,
                    response: value,
                })
            }
            None => Err(JobError::service(value)),
        }
    }

    async fn poll_status(&self, job_id: &str) -> JobResult<JobStatus> {
        let response = self
            .with_timeout(self.http_client.get(self.endpoint("status")?))
            .query(&[("jobId", job_id), ("token", self.token.as_str())])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => return Err(JobError::service_text(status.as_u16(), &body)),
        };
        if !status.is_success() {
            return Err(JobError::service(value));
        }
        JobStatus::from_response(job_id, value)
    }

    async fn download(&self, job_id: &str, destination: &Path) -> JobResult<DownloadOutcome> {
        let request = self
            .http_client
            .get(self.endpoint("download")?)
            .query(&[("token", self.token.as_str())]);
        let request = match self.addressing {
            DownloadAddressing::JobId => request.query(&[("jobId", job_id)]),
            DownloadAddressing::FileName => {
                request.query(&[("fileName", download_file_name(job_id, destination))])
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let json_content = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|content_type| content_type.contains("json"))
            .unwrap_or(false);
        let body = response.bytes().await?;

        if json_content || is_json_object(&body) {
            let payload = serde_json::from_slice(&body).unwrap_or_else(|_| {
                json!({ "error": String::from_utf8_lossy(&body), "status": status.as_u16() })
            });
            warn!(job_id, %payload, "download returned structured data instead of content");
            return Ok(DownloadOutcome::Failed { payload });
        }
        if !status.is_success() {
            let payload =
                json!({ "error": String::from_utf8_lossy(&body), "status": status.as_u16() });
            warn!(job_id, status = status.as_u16(), "download failed");
            return Ok(DownloadOutcome::Failed { payload });
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(destination).await?;
        file.write_all(&body).await?;
        file.flush().await?;

        info!(job_id, path = %destination.display(), bytes = body.len(), "content downloaded");
        Ok(DownloadOutcome::Saved {
            path: destination.to_path_buf(),
            bytes: body.len() as u64,
        })
    }
}
