use anyhow::Result;
use async_trait::async_trait;
use shared::Snapshot;
use thiserror::Error;

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// Why a replace was not applied.
#[derive(Debug, Error)]
pub enum StoreFailure {
    /// The caller's expected revision no longer matches the stored
    /// snapshot. Nothing was written.
    #[error("snapshot revision mismatch: expected {expected}, stored {stored}")]
    RevisionMismatch { expected: String, stored: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Read-all / replace-all access to the persisted dataset. The
/// snapshot is the unit of every read and every write; there is no
/// partial-update primitive.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the full dataset. A missing, empty, or corrupt backing
    /// store recovers to the empty snapshot; only genuine I/O failure
    /// is an error.
    async fn read_all(&self) -> Result<Snapshot>;

    /// Atomically replace the full dataset and return the revision of
    /// what was stored. With `expected_revision` set, the write only
    /// applies while the stored snapshot still has that revision;
    /// `None` keeps the historical last-write-wins behavior.
    async fn replace_all(
        &self,
        snapshot: &Snapshot,
        expected_revision: Option<&str>,
    ) -> Result<String, StoreFailure>;
}
