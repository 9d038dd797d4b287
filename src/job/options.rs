use super::{
    AudioSource, BackgroundColor, Emotion, Expression, JobSpec, OutputSpec, OutputType,
    Resolution, TtsParams,
};
use crate::config::Profile;
use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Field names accepted in a batch sample. `token` and `sentences_file` are
/// tolerated for compatibility with older input files and otherwise ignored.
pub const ALLOWED_FIELDS: &[&str] = &[
    "language",
    "actor",
    "text",
    "camera",
    "background_rgb",
    "sentences_file",
    "tts_voice",
    "tts_speed",
    "target_rig",
    "audio_url",
    "audio_file",
    "emotion",
    "emotion_level",
    "token",
    "output_type",
    "video_resolution",
    "frame_width",
    "frame_height",
    "output_dir",
    "output_file",
];

/// Flat, loosely typed job parameters as they arrive from a command line or a
/// batch file. [`JobOptions::build`] turns them into a [`JobSpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub text: Option<String>,
    pub language: Option<String>,
    pub target_rig: Option<super::TargetRig>,
    pub actor: Option<String>,
    pub camera: Option<u32>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
    pub background_rgb: Option<String>,
    pub audio_url: Option<String>,
    pub audio_file: Option<PathBuf>,
    pub emotion: Option<String>,
    pub emotion_level: Option<f32>,
    pub output_type: Option<OutputType>,
    pub video_resolution: Option<String>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
}

impl FromStr for Expression {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(Expression::Neutral),
            "happy" => Ok(Expression::Happy),
            "sad" => Ok(Expression::Sad),
            "surprise" => Ok(Expression::Surprise),
            "fear" => Ok(Expression::Fear),
            "disappointed" => Ok(Expression::Disappointed),
            other => Err(JobError::validation(format!(
                "unknown emotion '{}', expected one of neutral, happy, sad, surprise, fear, disappointed",
                other
            ))),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl JobOptions {
    /// Validates the parameters against `profile` and produces a job spec.
    /// Nothing here touches the network.
    pub fn build(&self, profile: Profile, tts_engine: &str) -> JobResult<JobSpec> {
        let text = non_empty(&self.text)
            .ok_or_else(|| JobError::validation("text is required"))?;
        let language = non_empty(&self.language)
            .ok_or_else(|| JobError::validation("language is required"))?;

        let audio = self.audio_source()?;
        let output = self.output_spec(profile)?;
        let emotion = self.emotion()?;

        if let Some(speed) = self.tts_speed {
            if speed < 0.0 || !speed.is_finite() {
                return Err(JobError::validation(format!(
                    "tts speed must be a positive number, got {}",
                    speed
                )));
            }
        }

        let target_rig = profile
            .forced_rig()
            .or(self.target_rig)
            .unwrap_or_default();

        Ok(JobSpec {
            target_rig,
            text: text.to_string(),
            language: language.to_string(),
            tts: TtsParams::new(tts_engine, self.tts_voice.clone(), self.tts_speed),
            output,
            actor: non_empty(&self.actor).map(str::to_string),
            camera: self.camera,
            emotion,
            audio,
        })
    }

    fn audio_source(&self) -> JobResult<Option<AudioSource>> {
        let audio_url = non_empty(&self.audio_url);
        match (audio_url, &self.audio_file) {
            (Some(_), Some(_)) => Err(JobError::validation(
                "only one of audio_file or audio_url should be supplied",
            )),
            (Some(raw), None) => url::Url::parse(raw)
                .map(|url| Some(AudioSource::Url(url)))
                .map_err(|e| JobError::validation(format!("invalid audio_url '{}': {}", raw, e))),
            (None, Some(path)) => {
                if !path.is_file() {
                    return Err(JobError::validation(format!(
                        "audio file does not exist: {}",
                        path.display()
                    )));
                }
                Ok(Some(AudioSource::File(path.clone())))
            }
            (None, None) => Ok(None),
        }
    }

    fn output_spec(&self, profile: Profile) -> JobResult<OutputSpec> {
        let output_type = self.output_type.unwrap_or(profile.default_output());
        if !profile.allowed_outputs().contains(&output_type) {
            return Err(JobError::validation(format!(
                "output type '{}' is not supported by the {} client, expected one of {:?}",
                output_type,
                profile,
                profile.allowed_outputs()
            )));
        }

        // Malformed video settings are rejected even when they would be ignored.
        let resolution = self.resolution()?;
        let background = non_empty(&self.background_rgb)
            .map(BackgroundColor::from_str)
            .transpose()?;

        match output_type {
            OutputType::Video => Ok(OutputSpec::Video {
                resolution,
                background,
            }),
            other => {
                if resolution.is_some() || background.is_some() {
                    warn!(output = %other, "video settings ignored for non-video output");
                }
                Ok(match other {
                    OutputType::Csv => OutputSpec::Csv,
                    _ => OutputSpec::Fbx,
                })
            }
        }
    }

    fn resolution(&self) -> JobResult<Option<Resolution>> {
        let resolution = non_empty(&self.video_resolution);
        match (resolution, self.frame_width, self.frame_height) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(JobError::validation(
                "use either video_resolution or frame_width/frame_height, not both",
            )),
            (Some(raw), None, None) => raw.parse().map(Some),
            (None, Some(width), Some(height)) => Resolution::new(width, height).map(Some),
            (None, Some(_), None) | (None, None, Some(_)) => Err(JobError::validation(
                "frame_width and frame_height must be given together",
            )),
            (None, None, None) => Ok(None),
        }
    }

    fn emotion(&self) -> JobResult<Option<Emotion>> {
        match non_empty(&self.emotion) {
            Some(name) => {
                let expression = name.parse::<Expression>()?;
                Emotion::new(expression, self.emotion_level.unwrap_or(1.0)).map(Some)
            }
            None => {
                if self.emotion_level.is_some() {
                    warn!("emotion_level ignored because no emotion is set");
                }
                Ok(None)
            }
        }
    }
}
