//! Application configuration, read from the environment.
//!
//! Supported env vars (a `.env` file is honoured by `main`):
//! - `DATA_DIR`, `STREAMS_FILE`, `LOG_DIR`
//! - `API_BIND_ADDRESS`, `API_PORT`
//! - `FFMPEG_PATH`, `ENCODER_FANOUT`, `ENCODER_LOGLEVEL`
//! - `RESTART_COOLDOWN_MS`, `STOP_GRACE_SECS`, `STOP_POLICY`

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::process::{EncoderConfig, FanoutMode};
use crate::supervisor::{StopPolicy, SupervisorSettings};
use crate::{Error, Result};

/// Everything needed to boot the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Location of the stream definitions file.
    pub streams_file: PathBuf,
    pub log_dir: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub encoder: EncoderConfig,
    pub supervisor: SupervisorSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            streams_file: data_dir.join("streams.json"),
            data_dir,
            log_dir: PathBuf::from("./logs"),
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            encoder: EncoderConfig::default(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from process environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` as the variable source.
    ///
    /// Blank values count as unset. Values that are set but unparsable are
    /// rejected rather than silently replaced by defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(data_dir) = var("DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.streams_file = match var("STREAMS_FILE") {
            Some(file) => PathBuf::from(file),
            None => config.data_dir.join("streams.json"),
        };
        if let Some(log_dir) = var("LOG_DIR") {
            config.log_dir = PathBuf::from(log_dir);
        }

        if let Some(bind_address) = var("API_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        if let Some(port) = var("API_PORT") {
            config.port = parse("API_PORT", &port)?;
        }

        if let Some(path) = var("FFMPEG_PATH") {
            config.encoder.binary_path = path;
        }
        if let Some(fanout) = var("ENCODER_FANOUT") {
            config.encoder.fanout = parse::<FanoutMode>("ENCODER_FANOUT", &fanout)?;
        }
        if let Some(level) = var("ENCODER_LOGLEVEL") {
            config.encoder.log_level = level;
        }

        if let Some(ms) = var("RESTART_COOLDOWN_MS") {
            config.supervisor.restart_cooldown =
                Duration::from_millis(parse("RESTART_COOLDOWN_MS", &ms)?);
        }
        if let Some(secs) = var("STOP_GRACE_SECS") {
            config.supervisor.stop_grace = Duration::from_secs(parse("STOP_GRACE_SECS", &secs)?);
        }
        if let Some(policy) = var("STOP_POLICY") {
            config.supervisor.stop_policy = parse::<StopPolicy>("STOP_POLICY", &policy)?;
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::config(format!("invalid {key} {raw:?}: {e}")))
}
