//! JSON file backed stream store.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::StreamStore;
use crate::domain::StreamDefinition;
use crate::utils::fs;
use crate::{Error, Result};

/// On-disk layouts accepted when loading.
///
/// New files are always written as a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredStreams {
    List(Vec<StreamDefinition>),
    Map(BTreeMap<String, StreamDefinition>),
}

/// Stores all stream definitions in one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(&self, bytes: &[u8]) -> Option<Vec<StreamDefinition>> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Some(Vec::new());
        }

        let streams = match serde_json::from_slice::<StoredStreams>(bytes) {
            Ok(StoredStreams::List(list)) => list,
            Ok(StoredStreams::Map(map)) => map
                .into_iter()
                .map(|(key, mut def)| {
                    if def.id.is_empty() {
                        def.id = key;
                    }
                    def
                })
                .collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Streams file is corrupt, treating as empty");
                return None;
            }
        };

        let mut seen = HashSet::new();
        Some(
            streams
                .into_iter()
                .filter(|def| {
                    let fresh = seen.insert(def.id.clone());
                    if !fresh {
                        warn!(stream_id = %def.id, "Duplicate stream id in streams file, keeping the first");
                    }
                    fresh
                })
                .collect(),
        )
    }
}

#[async_trait]
impl StreamStore for JsonFileStore {
    async fn load(&self) -> Vec<StreamDefinition> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => self.decode(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Streams file not found, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read streams file, treating as empty");
                Vec::new()
            }
        }
    }

    async fn save(&self, streams: &[StreamDefinition]) -> Result<()> {
        let data = serde_json::to_vec_pretty(streams)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| Error::Other(format!("Streams file writer task failed: {}", e)))?
    }
}

/// Write `data` to a sibling temp file and rename it over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::ensure_dir_all_sync_with_op("creating streams directory", dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| fs::io_error("creating temp file in", dir, e))?;
    tmp.write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| fs::io_error("writing", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| fs::io_error("replacing", path, e.error))?;
    Ok(())
}
