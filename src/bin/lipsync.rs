use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use lipsync_client::{
    config::ClientArgs,
    job::{OutputType, TargetRig},
    version, HttpJobClient, JobOptions, JobOutcome, JobRunner,
};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Generate a lipsync video or animation curves for one piece of text and
/// download the result
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

    /// Text for the avatar to speak, SSML when wrapped in <speak>
    #[arg(long)]
    text: String,

    /// Language of the text, see the API docs for available codes
    #[arg(long)]
    language: String,

    /// File to save the generated content to
    #[arg(long)]
    output_file: PathBuf,

    /// Content type to generate (default depends on the profile)
    #[arg(long, value_enum)]
    output_type: Option<OutputType>,

    /// Rig the animation curves target
    #[arg(long, value_enum)]
    target_rig: Option<TargetRig>,

    /// Actor voice or rendered actor, not needed with an audio source or tts voice
    #[arg(long)]
    actor: Option<String>,

    /// Camera id for rendered video
    #[arg(long)]
    camera: Option<u32>,

    /// Comma separated background colour, eg. 120,200,120
    #[arg(long)]
    background_rgb: Option<String>,

    /// Frame size of the rendered video, eg. 1920x1080
    #[arg(long, conflicts_with_all = ["frame_width", "frame_height"])]
    video_resolution: Option<String>,

    /// Width of frames in the generated video
    #[arg(long, requires = "frame_height")]
    frame_width: Option<u32>,

    /// Height of frames in the generated video
    #[arg(long, requires = "frame_width")]
    frame_height: Option<u32>,

    /// Voice of the tts engine
    #[arg(long)]
    tts_voice: Option<String>,

    /// Speed of the speech, 1.0 is normal speed
    #[arg(long)]
    tts_speed: Option<f32>,

    /// HTTP, S3 or OBS URL of an audio file for the engine to fetch
    #[arg(long, conflicts_with = "audio_file")]
    audio_url: Option<String>,

    /// Local audio file to upload with the job
    #[arg(long)]
    audio_file: Option<PathBuf>,

    /// Emotion expression applied to the avatar
    #[arg(long, value_parser = ["neutral", "happy", "sad", "surprise", "fear", "disappointed"])]
    emotion: Option<String>,

    /// 0.0 for no expression, 1.0 for maximum expression
    #[arg(long, default_value = "1.0")]
    emotion_level: f32,
}

impl Args {
    fn job_options(&self) -> JobOptions {
        JobOptions {
            text: Some(self.text.clone()),
            language: Some(self.language.clone()),
            target_rig: self.target_rig,
            actor: self.actor.clone(),
            camera: self.camera,
            tts_voice: self.tts_voice.clone(),
            tts_speed: self.tts_speed,
            background_rgb: self.background_rgb.clone(),
            audio_url: self.audio_url.clone(),
            audio_file: self.audio_file.clone(),
            emotion: self.emotion.clone(),
            emotion_level: self.emotion.as_ref().map(|_| self.emotion_level),
            output_type: self.output_type,
            video_resolution: self.video_resolution.clone(),
            frame_width: self.frame_width,
            frame_height: self.frame_height,
        }
    }
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
    info!(
        base_url = %client.base_url(),
        profile = %config.client.profile,
        "Submitting job"
    );
    let runner = JobRunner::from_config(Arc::new(client), &config.client);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received CTRL+C, cancelling job");
            ctrl_c.cancel();
        }
    });

    let report = runner
        .run_options(&args.job_options(), &args.output_file, &cancel)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report.submission)?);

    if let JobOutcome::Downloaded { path, bytes } = &report.outcome {
        info!(job_id = %report.job_id, polls = report.polls, "Job complete");
        println!("Saved {} bytes to {}", bytes, path.display());
    }
    report.into_result()?;
    Ok(())
}
