use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod version;

pub use client::{HttpJobClient, JobApi, JobOutcome, JobReport, JobRunner, PollPolicy};
pub use config::{ClientConfig, Config, Profile};
pub use error::{JobError, JobResult};
pub use job::{JobOptions, JobSpec, JobState, JobStatus};

/// Installs the global subscriber. `level` is added on top of the `RUST_LOG`
/// directives; when `log_file` is set output goes there instead of stderr. Keep the returned
/// guard alive until exit so buffered lines are flushed.
pub fn init_tracing(
    level: Option<&str>,
    log_file: Option<&str>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let mut env_filter = EnvFilter::from_default_env();
    if let Some(Ok(level)) = level.map(|level| level.parse::<LevelFilter>()) {
        env_filter = env_filter.add_directive(level.into());
    }

    match log_file {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .map_err(|e| anyhow::anyhow!("{}: {}", e, log_file))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
            Ok(None)
        }
    }
}
