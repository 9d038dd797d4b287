//! Sequential batch runs driven by a JSON input file.
//!
//! Two input layouts are accepted:
//!
//! ```json
//! { "jobs": [ { "text": "...", "language": "en-US", "output_file": "/tmp/a.mp4" } ] }
//! ```
//!
//! ```json
//! {
//!   "default_settings": { "language": "en-US" },
//!   "output_dir": "/tmp/out",
//!   "samples": { "intro": { "text": "..." } }
//! }
//! ```
//!
//! Every sample is validated before the first request is sent. Samples then
//! run one at a time and the outcome of each is recorded in
//! `<input stem>_results.json` next to the input file.

use crate::client::{JobOutcome, JobRunner};
use crate::error::{JobError, JobResult};
use crate::job::{JobOptions, JobSpec, ALLOWED_FIELDS};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const RESULTS_SUFFIX: &str = "_results.json";

/// `inputs/run.json` -> `inputs/run_results.json`
pub fn results_path(input_file: &Path) -> PathBuf {
    let stem = input_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    input_file.with_file_name(format!("{}{}", stem, RESULTS_SUFFIX))
}

/// A sample that passed validation and is ready to be submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSample {
    pub id: String,
    pub destination: PathBuf,
    pub spec: JobSpec,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub results_file: PathBuf,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Map<String, Value>,
}

/// Entries recorded by [`BatchRunner::run_samples`], keyed by sample id.
#[derive(Debug, Clone, Default)]
pub struct SampleResults {
    pub entries: Map<String, Value>,
    pub failed: usize,
}

pub struct BatchRunner {
    runner: JobRunner,
}

fn as_object<'a>(value: &'a Value, what: &str) -> JobResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| JobError::validation(format!("{} must be a JSON object", what)))
}

fn check_allowed(id: &str, fields: &Map<String, Value>) -> JobResult<()> {
    match fields.keys().find(|key| !ALLOWED_FIELDS.contains(&key.as_str())) {
        Some(key) => Err(JobError::validation(format!(
            "input sample {} has invalid field: {}, must be one of {:?}",
            id, key, ALLOWED_FIELDS
        ))),
        None => Ok(()),
    }
}

fn require(id: &str, fields: &Map<String, Value>, name: &str) -> JobResult<()> {
    match fields.get(name) {
        Some(Value::Null) | None => Err(JobError::validation(format!(
            "input sample {} is missing {} field",
            id, name
        ))),
        Some(_) => Ok(()),
    }
}

fn path_field(fields: &Map<String, Value>, name: &str) -> Option<PathBuf> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

impl BatchRunner {
    pub fn new(runner: JobRunner) -> Self {
        Self { runner }
    }

    /// Validates every sample of a batch document. Nothing is sent; the
    /// first invalid sample aborts the whole plan.
    pub fn plan(&self, input: &Value, output_dir: Option<&Path>) -> JobResult<Vec<PlannedSample>> {
        let root = as_object(input, "batch input")?;

        if let Some(jobs) = root.get("jobs") {
            let jobs = jobs
                .as_array()
                .ok_or_else(|| JobError::validation("\"jobs\" must be a list of job objects"))?;
            return jobs
                .iter()
                .enumerate()
                .map(|(index, job)| {
                    let id = index.to_string();
                    let fields = as_object(job, &format!("input sample {}", id))?;
                    self.plan_sample(id, fields.clone(), None)
                })
                .collect();
        }

        if let Some(samples) = root.get("samples") {
            let samples = as_object(samples, "\"samples\"")?;
            let defaults = match root.get("default_settings") {
                Some(defaults) => as_object(defaults, "\"default_settings\"")?.clone(),
                None => Map::new(),
            };
            check_allowed("default_settings", &defaults)?;

            let shared_dir = output_dir
                .map(Path::to_path_buf)
                .or_else(|| path_field(root, "output_dir"));
            return samples
                .iter()
                .map(|(id, sample)| {
                    let sample = as_object(sample, &format!("input sample {}", id))?;
                    let mut fields = defaults.clone();
                    fields.extend(sample.iter().map(|(k, v)| (k.clone(), v.clone())));
                    self.plan_sample(id.clone(), fields, shared_dir.as_deref())
                })
                .collect();
        }

        Err(JobError::validation(
            "input json file incorrect format, needs a \"jobs\" or \"samples\" field",
        ))
    }

    fn plan_sample(
        &self,
        id: String,
        fields: Map<String, Value>,
        shared_dir: Option<&Path>,
    ) -> JobResult<PlannedSample> {
        check_allowed(&id, &fields)?;
        require(&id, &fields, "text")?;
        require(&id, &fields, "language")?;
        let profile = self.runner.profile();
        if profile.requires_target_rig() {
            require(&id, &fields, "target_rig")?;
        }

        let output_file = path_field(&fields, "output_file");
        let sample_dir = path_field(&fields, "output_dir");
        let options: JobOptions = serde_json::from_value(Value::Object(fields)).map_err(|e| {
            JobError::validation(format!("input sample {} is malformed: {}", id, e))
        })?;
        let spec = self.runner.build_spec(&options).map_err(|e| match e {
            JobError::Validation(message) => {
                JobError::validation(format!("input sample {}: {}", id, message))
            }
            other => other,
        })?;

        let destination = match (output_file, sample_dir.as_deref().or(shared_dir)) {
            (Some(file), _) => file,
            (None, Some(dir)) => dir.join(format!("{}.{}", id, spec.output_type().extension())),
            (None, None) => {
                return Err(JobError::validation(format!(
                    "input sample {} is missing output_file field",
                    id
                )))
            }
        };

        Ok(PlannedSample {
            id,
            destination,
            spec,
        })
    }

    /// Runs planned samples one after another. Per-sample failures are
    /// recorded in the returned entries rather than raised.
    pub async fn run_samples(
        &self,
        samples: &[PlannedSample],
        cancel: &CancellationToken,
    ) -> SampleResults {
        let total = samples.len();
        let mut results = SampleResults::default();
        for (index, sample) in samples.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining = total - index, "batch cancelled");
                break;
            }
            info!(sample = %sample.id, index = index + 1, total, "running sample");

            let entry = match self.runner.run(&sample.spec, &sample.destination, cancel).await {
                Ok(report) => match report.outcome {
                    JobOutcome::Downloaded { .. } => report.submission,
                    _ => {
                        results.failed += 1;
                        let submission = report.submission.clone();
                        let error = report
                            .into_result()
                            .err()
                            .map(|e| e.to_json())
                            .unwrap_or(Value::Null);
                        json!({ "response": submission, "error": error })
                    }
                },
                Err(e) => {
                    results.failed += 1;
                    warn!(sample = %sample.id, "sample failed: {}", e);
                    json!({ "response": Value::Null, "error": e.to_json() })
                }
            };
            results.entries.insert(sample.id.clone(), entry);
        }
        results
    }

    /// Loads, validates and runs a batch file, then writes the results file.
    pub async fn run_file(
        &self,
        input_file: &Path,
        output_dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> JobResult<BatchSummary> {
        let content = tokio::fs::read_to_string(input_file).await?;
        let input: Value = serde_json::from_str(&content)
            .map_err(|e| JobError::validation(format!("{}: {}", input_file.display(), e)))?;

        let samples = self.plan(&input, output_dir)?;
        info!(input = %input_file.display(), samples = samples.len(), "batch validated");

        let SampleResults {
            entries: results,
            failed,
        } = self.run_samples(&samples, cancel).await;

        let results_file = results_path(input_file);
        tokio::fs::write(&results_file, serde_json::to_string_pretty(&results)?).await?;
        info!(
            results = %results_file.display(),
            succeeded = results.len() - failed,
            failed,
            "batch finished"
        );

        Ok(BatchSummary {
            results_file,
            succeeded: results.len() - failed,
            failed,
            results,
        })
    }
}
