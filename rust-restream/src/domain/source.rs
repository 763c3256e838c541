//! Source reference value object.
//!
//! A stream source is stored as an opaque string. At start time it is
//! classified as either a URI with a scheme the encoder can read, or a path
//! on the local filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::{Error, Result};

/// URI schemes accepted as network sources.
pub const RECOGNIZED_SCHEMES: &[&str] = &[
    "http", "https", "rtmp", "rtmps", "rtsp", "rtsps", "srt", "udp", "tcp", "rtp", "hls", "file",
];

/// A classified stream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// A URI with one of [`RECOGNIZED_SCHEMES`].
    ///
    /// `raw` is what the user typed and what the encoder receives; the
    /// parsed form is only used for classification.
    Url { raw: String, url: Url },
    /// Anything else is treated as a local file path.
    LocalPath(PathBuf),
}

impl StreamSource {
    /// Classify a raw source string.
    ///
    /// Fails only for blank input; whether a local path exists is checked
    /// separately by [`StreamSource::check_available`].
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("Source not specified"));
        }

        if let Ok(url) = Url::parse(trimmed)
            && RECOGNIZED_SCHEMES.contains(&url.scheme())
        {
            return Ok(Self::Url {
                raw: trimmed.to_string(),
                url,
            });
        }

        Ok(Self::LocalPath(PathBuf::from(trimmed)))
    }

    /// Check the source can be handed to the encoder.
    ///
    /// Network URLs are accepted as-is. Local paths and `file:` URIs must
    /// point at an existing regular file.
    pub async fn check_available(&self) -> Result<()> {
        match self {
            Self::Url { url, .. } if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| {
                    Error::validation(format!("Invalid file URI: {url}"))
                })?;
                check_regular_file(&path).await
            }
            Self::Url { .. } => Ok(()),
            Self::LocalPath(path) => check_regular_file(path).await,
        }
    }

    /// Whether the source is a network URI.
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url { .. })
    }

    /// The local path, if this is a file source.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::LocalPath(path) => Some(path),
            Self::Url { .. } => None,
        }
    }

    /// The argument passed to the encoder's `-i`.
    pub fn as_input(&self) -> String {
        match self {
            Self::Url { raw, .. } => raw.clone(),
            Self::LocalPath(path) => path.to_string_lossy().into_owned(),
        }
    }
}

async fn check_regular_file(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(Error::validation(format!(
            "Source is not a regular file: {}",
            path.display()
        ))),
        Err(_) => Err(Error::validation(format!(
            "File does not exist: {}",
            path.display()
        ))),
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_input())
    }
}
