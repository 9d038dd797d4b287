use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

mod options;
mod status;
pub use options::{JobOptions, ALLOWED_FIELDS};
pub use status::{JobState, JobStatus};


pub const DEFAULT_TTS_ENGINE: &str = "Google";
const SSML_ROOT_TAG: &str = "<speak>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetRig {
    #[default]
    Metahumans,
    Arkit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Video,
    Csv,
    Fbx,
}

impl OutputType {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputType::Video => "mp4",
            OutputType::Csv => "csv",
            OutputType::Fbx => "fbx",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputType::Video => "video",
            OutputType::Csv => "csv",
            OutputType::Fbx => "fbx",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Surprise,
    Fear,
    Disappointed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Emotion {
    pub expression: Expression,
    pub level: f32,
}

impl Emotion {
    pub fn new(expression: Expression, level: f32) -> JobResult<Self> {
        if !(0.0..=1.0).contains(&level) {
            return Err(JobError::validation(format!(
                "emotion level must be between 0.0 and 1.0, got {}",
                level
            )));
        }
        Ok(Self { expression, level })
    }
}

/// Background colour of a rendered video, parsed from `"r,g,b"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackgroundColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl FromStr for BackgroundColor {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            JobError::validation(format!(
                "background colour '{}' must be three comma separated values in 0-255, eg. 120,200,120",
                s
            ))
        };
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<JobResult<Vec<u8>>>()?;
        match parts.as_slice() {
            [red, green, blue] => Ok(Self {
                red: *red,
                green: *green,
                blue: *blue,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Video frame size, parsed from `"WIDTHxHEIGHT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> JobResult<Self> {
        if width == 0 || height == 0 {
            return Err(JobError::validation(format!(
                "video resolution {}x{} must be positive",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl FromStr for Resolution {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            JobError::validation(format!(
                "video resolution '{}' is incorrect, should be of the form 1920x1080",
                s
            ))
        };
        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
        Resolution::new(width, height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtsParams {
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

impl TtsParams {
    /// Empty voices and a zero speed are treated as "let the engine decide".
    pub fn new(engine: impl Into<String>, voice: Option<String>, speed: Option<f32>) -> Self {
        Self {
            engine: engine.into(),
            voice: voice.filter(|v| !v.trim().is_empty()),
            speed: speed.filter(|s| *s != 0.0),
        }
    }
}

impl Default for TtsParams {
    fn default() -> Self {
        Self::new(DEFAULT_TTS_ENGINE, None, None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputSpec {
    Video {
        resolution: Option<Resolution>,
        background: Option<BackgroundColor>,
    },
    Csv,
    Fbx,
}

impl OutputSpec {
    pub fn output_type(&self) -> OutputType {
        match self {
            OutputSpec::Video { .. } => OutputType::Video,
            OutputSpec::Csv => OutputType::Csv,
            OutputSpec::Fbx => OutputType::Fbx,
        }
    }
}

/// Where the speech audio comes from when it is not synthesized from text.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    Url(url::Url),
    File(PathBuf),
}

/// A validated job. Build it through [`JobOptions::build`] to get the
/// parameter checks, or directly when the values are already typed.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub target_rig: TargetRig,
    pub text: String,
    pub language: String,
    pub tts: TtsParams,
    pub output: OutputSpec,
    pub actor: Option<String>,
    pub camera: Option<u32>,
    pub emotion: Option<Emotion>,
    pub audio: Option<AudioSource>,
}

impl JobSpec {
    pub fn new(text: impl Into<String>, language: impl Into<String>, output: OutputSpec) -> Self {
        Self {
            target_rig: TargetRig::default(),
            text: text.into(),
            language: language.into(),
            tts: TtsParams::default(),
            output,
            actor: None,
            camera: None,
            emotion: None,
            audio: None,
        }
    }

    pub fn output_type(&self) -> OutputType {
        self.output.output_type()
    }

    pub fn is_ssml(&self) -> bool {
        self.text.contains(SSML_ROOT_TAG)
    }

    pub fn audio_file(&self) -> Option<&PathBuf> {
        match &self.audio {
            Some(AudioSource::File(path)) => Some(path),
            _ => None,
        }
    }

    /// The JSON job object understood by the `generate` endpoint.
    pub fn to_request(&self) -> JobRequest<'_> {
        let output = match &self.output {
            OutputSpec::Video {
                resolution,
                background,
            } => OutputRequest::Video {
                width: resolution.map(|r| r.width),
                height: resolution.map(|r| r.height),
                background_color: *background,
            },
            OutputSpec::Csv => OutputRequest::Csv,
            OutputSpec::Fbx => OutputRequest::Fbx,
        };
        let audio_url = match &self.audio {
            Some(AudioSource::Url(url)) => Some(url.as_str()),
            _ => None,
        };
        JobRequest {
            target_rig: self.target_rig,
            text: &self.text,
            language: &self.language,
            tts_params: &self.tts,
            output,
            actor: self.actor.as_deref().filter(|a| !a.is_empty()),
            camera: self.camera,
            emotion: self.emotion,
            audio_url,
            is_ssml: self.is_ssml(),
            wait_time: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobRequest<'a> {
    pub target_rig: TargetRig,
    pub text: &'a str,
    pub language: &'a str,
    pub tts_params: &'a TtsParams,
    pub output: OutputRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<&'a str>,
    pub is_ssml: bool,
    pub wait_time: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputRequest {
    Video {
        width: Option<u32>,
        height: Option<u32>,
        background_color: Option<BackgroundColor>,
    },
    Csv,
    Fbx,
}
