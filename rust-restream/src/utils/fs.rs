//! Directory creation with operation and path in the error.

use std::path::Path;

use crate::{Error, Result};

/// Wrap an IO error with what was being done and to which path.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// `create_dir_all`, async.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) => Err(io_error(op, path, e)),
    }
}

/// `create_dir_all`, for callers outside the runtime.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_all_with_op("creating test directory", &nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn errors_name_the_operation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_dir_all_sync_with_op("creating log directory", &file.join("sub")).unwrap_err();
        assert!(err.to_string().contains("creating log directory"));
    }
}
