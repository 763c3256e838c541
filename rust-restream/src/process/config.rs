//! Encoder invocation settings.

use serde::{Deserialize, Serialize};

/// How one source is fanned out to several destinations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FanoutMode {
    /// One encoder process per destination.
    #[default]
    PerDestination,
    /// A single encoder process using the `tee` muxer.
    Tee,
}

/// External encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    /// Arguments placed before `-i`.
    #[serde(default = "default_input_args")]
    pub input_args: Vec<String>,
    /// Arguments placed after `-i` and before the output.
    #[serde(default = "default_output_args")]
    pub output_args: Vec<String>,
    /// Container for every destination.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Value passed to `-loglevel`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub fanout: FanoutMode,
}

fn default_binary_path() -> String {
    "ffmpeg".to_string()
}

/// Read the input at its native frame rate.
fn default_input_args() -> Vec<String> {
    vec!["-re".to_string()]
}

/// Copy every codec, no re-encoding.
fn default_output_args() -> Vec<String> {
    vec!["-c".to_string(), "copy".to_string()]
}

fn default_output_format() -> String {
    "flv".to_string()
}

fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            input_args: default_input_args(),
            output_args: default_output_args(),
            output_format: default_output_format(),
            log_level: default_log_level(),
            fanout: FanoutMode::default(),
        }
    }
}
