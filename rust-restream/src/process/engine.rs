//! Encoder engines: turn a stream definition into a running process group.

use async_trait::async_trait;
use tracing::info;

use super::config::{EncoderConfig, FanoutMode};
use super::group::ProcessGroup;
use crate::Result;
use crate::domain::StreamDefinition;

/// Label used for the single member of a tee group.
pub const TEE_LABEL: &str = "tee";

/// Something that can launch the processes for a stream.
#[async_trait]
pub trait StreamEngine: Send + Sync {
    /// Short engine name for logs and health output.
    fn name(&self) -> &'static str;

    /// Spawn the process group pushing `definition`'s source to its destinations.
    ///
    /// Returns `Error::Spawn` if the processes cannot be started; in that
    /// case nothing is left running.
    async fn launch(&self, stream_id: &str, definition: &StreamDefinition) -> Result<ProcessGroup>;

    /// Check if the engine is available (e.g., binary exists).
    fn is_available(&self) -> bool;

    /// Get the engine version string.
    fn version(&self) -> Option<String>;
}

/// FFmpeg-based restreaming engine.
pub struct FfmpegEngine {
    /// Engine configuration.
    config: EncoderConfig,
    /// Cached version string.
    version: Option<String>,
}

impl FfmpegEngine {
    /// Create a new FFmpeg engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(EncoderConfig::default())
    }

    /// Create with a custom configuration.
    pub fn with_config(config: EncoderConfig) -> Self {
        let version = Self::detect_version(&config.binary_path);

        Self { config, version }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Detect ffmpeg version.
    fn detect_version(path: &str) -> Option<String> {
        process_utils::std_command(path)
            .arg("-version")
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    /// Arguments shared by every invocation, up to and including the input.
    fn input_args(&self, input: &str) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ];
        args.extend(self.config.input_args.iter().cloned());
        args.extend(["-i".to_string(), input.to_string()]);
        args
    }

    /// Build one `(label, args)` pair per process to spawn.
    pub fn build_invocations(&self, definition: &StreamDefinition) -> Result<Vec<(String, Vec<String>)>> {
        let input = definition.parsed_source()?.as_input();
        let format = &self.config.output_format;

        let invocations = match self.config.fanout {
            FanoutMode::PerDestination => definition
                .destinations
                .iter()
                .map(|dest| {
                    let mut args = self.input_args(&input);
                    args.extend(self.config.output_args.iter().cloned());
                    args.extend(["-f".to_string(), format.clone(), dest.clone()]);
                    (dest.clone(), args)
                })
                .collect(),
            FanoutMode::Tee => {
                let targets = definition
                    .destinations
                    .iter()
                    .map(|dest| format!("[f={}:onfail=ignore]{}", format, escape_tee_target(dest)))
                    .collect::<Vec<_>>()
                    .join("|");

                let mut args = self.input_args(&input);
                args.extend(["-map".to_string(), "0".to_string()]);
                args.extend(self.config.output_args.iter().cloned());
                args.extend(["-f".to_string(), "tee".to_string(), targets]);
                vec![(TEE_LABEL.to_string(), args)]
            }
        };

        Ok(invocations)
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape the characters the tee muxer treats as separators.
fn escape_tee_target(target: &str) -> String {
    let mut escaped = String::with_capacity(target.len());
    for c in target.chars() {
        if matches!(c, '\\' | '|' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl StreamEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn launch(&self, stream_id: &str, definition: &StreamDefinition) -> Result<ProcessGroup> {
        let invocations = self.build_invocations(definition)?;

        let commands = invocations
            .into_iter()
            .map(|(label, args)| {
                info!(
                    stream_id = %stream_id,
                    member = %label,
                    "Running: {} {}",
                    self.config.binary_path,
                    args.join(" ")
                );
                let mut command = process_utils::tokio_command(&self.config.binary_path);
                command.args(&args).env("LC_ALL", "C");
                (label, command)
            })
            .collect();

        ProcessGroup::spawn(stream_id, commands).await
    }

    fn is_available(&self) -> bool {
        self.version.is_some()
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(destinations: &[&str]) -> StreamDefinition {
        StreamDefinition::new(
            "test",
            "/tmp/in.mp4",
            destinations.iter().map(|d| d.to_string()).collect(),
            true,
        )
        .with_id("s1")
    }

    #[test]
    fn per_destination_builds_one_invocation_each() {
        let engine = FfmpegEngine::with_config(EncoderConfig {
            binary_path: "/nonexistent/ffmpeg".to_string(),
            ..EncoderConfig::default()
        });
        let invocations = engine
            .build_invocations(&definition(&["rtmp://a/1", "rtmp://b/2"]))
            .unwrap();

        assert_eq!(invocations.len(), 2);
        let (label, args) = &invocations[1];
        assert_eq!(label, "rtmp://b/2");
        let joined = args.join(" ");
        assert!(joined.contains("-re -i /tmp/in.mp4"));
        assert!(joined.ends_with("-c copy -f flv rtmp://b/2"));
    }

    #[test]
    fn tee_builds_a_single_invocation() {
        let engine = FfmpegEngine::with_config(EncoderConfig {
            binary_path: "/nonexistent/ffmpeg".to_string(),
            fanout: FanoutMode::Tee,
            ..EncoderConfig::default()
        });
        let invocations = engine
            .build_invocations(&definition(&["rtmp://a/1", "rtmp://b/2"]))
            .unwrap();

        assert_eq!(invocations.len(), 1);
        let (label, args) = &invocations[0];
        assert_eq!(label, TEE_LABEL);
        assert_eq!(
            args.last().unwrap(),
            "[f=flv:onfail=ignore]rtmp://a/1|[f=flv:onfail=ignore]rtmp://b/2"
        );
        assert!(args.windows(2).any(|w| w == ["-map", "0"]));
    }

    #[test]
    fn tee_targets_are_escaped() {
        assert_eq!(escape_tee_target("rtmp://a/x|y"), "rtmp://a/x\\|y");
        assert_eq!(escape_tee_target("plain"), "plain");
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let engine = FfmpegEngine::with_config(EncoderConfig {
            binary_path: "/nonexistent/ffmpeg".to_string(),
            ..EncoderConfig::default()
        });
        assert!(!engine.is_available());
        assert!(engine.version().is_none());
        assert_eq!(engine.name(), "ffmpeg");
    }

    #[tokio::test]
    async fn launch_with_missing_binary_is_a_spawn_error() {
        let engine = FfmpegEngine::with_config(EncoderConfig {
            binary_path: "/nonexistent/ffmpeg".to_string(),
            ..EncoderConfig::default()
        });
        let err = engine
            .launch("s1", &definition(&["rtmp://a/1"]))
            .await
            .err()
            .expect("launch must fail");
        assert!(matches!(err, crate::Error::Spawn(_)));
    }
}
