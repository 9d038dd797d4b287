use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use lipsync_client::{batch::BatchRunner, config::ClientArgs, version, HttpJobClient, JobRunner};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run every job of a JSON batch file one after another and write a
/// `<input>_results.json` summary next to it
#[derive(Parser, Debug)]
#[command(
    author,
    version = version::get_short_version(),
    about,
    long_about = version::get_version_info()
)]
struct Args {
    #[command(flatten)]
    client: ClientArgs,

    /// Path to the json file describing the jobs
    #[arg(long)]
    input_file: PathBuf,

    /// Directory for samples that do not name an output_file
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();
    dotenv().ok();
    let args = Args::parse();

    let config = args.client.load_config()?;
    let _guard =
        lipsync_client::init_tracing(config.log_level.as_deref(), config.log_file.as_deref())?;
    let token = args.client.resolve_token(&config)?;

    let client = HttpJobClient::new(&config.client, token)?;
    let runner = JobRunner::from_config(Arc::new(client), &config.client);
    let batch = BatchRunner::new(runner);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received CTRL+C, stopping after the current sample");
            ctrl_c.cancel();
        }
    });

    info!(input = %args.input_file.display(), profile = %config.client.profile, "Starting batch");
    let summary = batch
        .run_file(&args.input_file, args.output_dir.as_deref(), &cancel)
        .await?;

    println!(
        "{} succeeded, {} failed, results written to {}",
        summary.succeeded,
        summary.failed,
        summary.results_file.display()
    );
    Ok(())
}
