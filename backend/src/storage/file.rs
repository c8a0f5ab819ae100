use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::Snapshot;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{SnapshotStore, StoreFailure};

/// Flat-file store: the whole dataset is one pretty-printed JSON
/// document. Writes land in a sibling temp file and are renamed into
/// place, so a crash mid-write never leaves a half document behind.
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-compare-write cycles so a conditional replace
    /// compares against the exact bytes it is about to overwrite.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating data directory {}", parent.display()))?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Snapshot> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "data file {} not found, starting from an empty snapshot",
                    self.path.display()
                );
                return Ok(Snapshot::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading data file {}", self.path.display()));
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            warn!(
                "data file {} is empty, serving the empty snapshot",
                self.path.display()
            );
            return Ok(Snapshot::default());
        }

        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!(
                    "data file {} is not valid JSON ({e}), serving the empty snapshot",
                    self.path.display()
                );
                Ok(Snapshot::default())
            }
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("serializing snapshot")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing temp file {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming {} into place", tmp.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn read_all(&self) -> Result<Snapshot> {
        let _guard = self.write_lock.lock().await;
        self.load().await
    }

    async fn replace_all(
        &self,
        snapshot: &Snapshot,
        expected_revision: Option<&str>,
    ) -> Result<String, StoreFailure> {
        let _guard = self.write_lock.lock().await;

        if let Some(expected) = expected_revision {
            let stored = self.load().await?.revision();
            if stored != expected {
                return Err(StoreFailure::RevisionMismatch {
                    expected: expected.to_string(),
                    stored,
                });
            }
        }

        self.write(snapshot).await?;
        Ok(snapshot.revision())
    }
}
