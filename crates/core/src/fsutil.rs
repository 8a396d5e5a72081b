//! File system helpers shared across the pipeline
//!
//! All artifact writes go through [`write_atomic`]: content lands in a
//! temporary file in the destination directory and is renamed into place,
//! so a lookup never observes a partially written artifact.

use crate::error::{Result, SkillsmithError};
use std::path::Path;
use tokio::fs;

/// Ensure a directory exists, creating it and its parents if necessary
pub async fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).await.map_err(|e| {
        SkillsmithError::pipeline(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ))
    })
}

/// Write bytes atomically via write-temp-then-rename
///
/// The temporary file lives in the same directory as the destination so
/// the rename stays on one filesystem.
pub async fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = path.parent().ok_or_else(|| {
        SkillsmithError::pipeline(format!("Path {} has no parent directory", path.display()))
    })?;
    fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = dir.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Write a string atomically
pub async fn write_atomic_string<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes()).await
}

/// Serialize a value to pretty JSON and write it atomically
pub async fn write_atomic_json<P: AsRef<Path>, T: serde::Serialize>(
    path: P,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

/// Read a file to string with a path-bearing error
pub async fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).await.map_err(|e| {
        SkillsmithError::pipeline(format!("Failed to read {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");

        write_atomic(&path, b"hello").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_atomic_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        write_atomic_json(&path, &serde_json::json!({"k": 1}))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.json".to_string()]);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deep/out.txt");

        write_atomic_string(&path, "content").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_ensure_dir_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub");

        ensure_dir(&path).await.unwrap();
        ensure_dir(&path).await.unwrap();
        assert!(path.is_dir());
    }
}
