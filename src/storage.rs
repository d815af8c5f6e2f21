//! Best-effort artifact storage for request inputs and outputs.

use anyhow::{Context, Result};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub trait ArtifactStore: Send + Sync {
    fn save<'a>(&'a self, bucket: &'a str, key: &'a str, bytes: &'a [u8])
    -> BoxFuture<'a, Result<()>>;
}

/// Writes `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let dir = self.root.join(bucket);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let path = dir.join(key);
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            debug!("saved artifact {}", path.display());
            Ok(())
        }
        .boxed()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl ArtifactStore for NoopStore {
    fn save<'a>(
        &'a self,
        _bucket: &'a str,
        _key: &'a str,
        _bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<()>> {
        async { Ok(()) }.boxed()
    }
}

/// Saves and logs a failure instead of returning it.
pub async fn save_best_effort(store: &dyn ArtifactStore, bucket: &str, key: &str, bytes: &[u8]) {
    if let Err(err) = store.save(bucket, key, bytes).await {
        warn!("failed to save artifact {}/{}: {:#}", bucket, key, err);
    }
}

/// Seconds since the Unix epoch, shared by the before/after keys of a request.
pub fn request_timestamp() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_under_bucket_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.save("images", "a-before.png", b"png").await.unwrap();
        let written = std::fs::read(dir.path().join("images").join("a-before.png")).unwrap();
        assert_eq!(written, b"png");
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // the bucket path is a regular file, so create_dir_all fails
        let store = FsArtifactStore::new(&blocker);
        assert!(store.save("images", "k", b"v").await.is_err());
        save_best_effort(&store, "images", "k", b"v").await;
    }
}
