use crate::job::{OutputType, TargetRig, DEFAULT_TTS_ENGINE};
use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const TOKEN_ENV: &str = "LIPSYNC_TOKEN";
const DEFAULT_BASE_URL: &str = "https://lipsync-ai.emotechlab.com/lipsync";
const VIDEO_BASE_URL: &str = "https://lipsync-ai.api.emotechlab.com/lipsync";

/// The service historically shipped three slightly different clients. A
/// profile selects one set of those conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Any output type, downloads addressed by job id.
    #[default]
    Generic,
    /// Animation curves only (csv or fbx), downloads addressed by file name.
    Animation,
    /// Rendered video only, always on the metahumans rig.
    Video,
}

impl Profile {
    pub fn default_output(&self) -> OutputType {
        match self {
            Profile::Animation => OutputType::Csv,
            Profile::Generic | Profile::Video => OutputType::Video,
        }
    }

    pub fn allowed_outputs(&self) -> &'static [OutputType] {
        match self {
            Profile::Generic => &[OutputType::Video, OutputType::Csv, OutputType::Fbx],
            Profile::Animation => &[OutputType::Csv, OutputType::Fbx],
            Profile::Video => &[OutputType::Video],
        }
    }

    pub fn forced_rig(&self) -> Option<TargetRig> {
        match self {
            Profile::Video => Some(TargetRig::Metahumans),
            _ => None,
        }
    }

    pub fn requires_target_rig(&self) -> bool {
        matches!(self, Profile::Animation)
    }

    pub fn download_addressing(&self) -> DownloadAddressing {
        match self {
            Profile::Generic => DownloadAddressing::JobId,
            Profile::Animation | Profile::Video => DownloadAddressing::FileName,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Profile::Video => VIDEO_BASE_URL,
            _ => DEFAULT_BASE_URL,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Generic => "generic",
            Profile::Animation => "animation",
            Profile::Video => "video",
        };
        f.write_str(name)
    }
}

/// How the `download` endpoint is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadAddressing {
    /// `download?jobId={id}`
    JobId,
    /// `download?fileName={id}.{ext}`
    FileName,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub profile: Profile,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub download_by: Option<DownloadAddressing>,
    pub tts_engine: String,
    /// Total time for `generate` and `status` calls, connect timeout for downloads.
    pub request_timeout_ms: Option<u64>,
    pub poll_interval_ms: u64,
    /// Upper bound on polling; unset means poll until the job terminates.
    pub max_wait_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            base_url: None,
            token: None,
            download_by: None,
            tts_engine: DEFAULT_TTS_ENGINE.to_string(),
            request_timeout_ms: Some(120_000),
            poll_interval_ms: 2_000,
            max_wait_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.profile.default_base_url())
    }

    pub fn download_addressing(&self) -> DownloadAddressing {
        self.download_by
            .unwrap_or_else(|| self.profile.download_addressing())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }

    /// Resolves the token: explicit value, then config file, then environment.
    pub fn resolve_token(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.token.clone())
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            client: ClientConfig::default(),
        }
    }
}

/// Flags shared by the command line tools.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ClientArgs {
    /// Path to the configuration file (TOML format)
    #[arg(long)]
    pub conf: Option<String>,

    /// User token tied to the account, falls back to the config file or LIPSYNC_TOKEN
    #[arg(long)]
    pub token: Option<String>,

    /// Client conventions to follow
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Base URL of the lipsync service
    #[arg(long)]
    pub base_url: Option<String>,

    /// Delay between status polls in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Give up polling after this many seconds (default: wait forever)
    #[arg(long)]
    pub max_wait_secs: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ClientArgs {
    /// Loads the config file, if any, and applies the command line overrides.
    pub fn load_config(&self) -> Result<Config, Error> {
        let mut config = Config::load_or_default(self.conf.as_deref())?;
        let client = &mut config.client;
        if let Some(profile) = self.profile {
            client.profile = profile;
        }
        if let Some(ref base_url) = self.base_url {
            client.base_url = Some(base_url.clone());
        }
        if let Some(interval) = self.poll_interval_ms {
            client.poll_interval_ms = interval;
        }
        if let Some(max_wait) = self.max_wait_secs {
            client.max_wait_secs = Some(max_wait);
        }
        if self.verbose {
            config.log_level = Some("debug".to_string());
        }
        Ok(config)
    }

    pub fn resolve_token(&self, config: &Config) -> Result<String, Error> {
        config
            .client
            .resolve_token(self.token.as_deref())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "missing token: pass --token, set client.token in the config file or export {}",
                    TOKEN_ENV
                )
            })
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
