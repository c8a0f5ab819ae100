use std::time::Duration;

use shared::{Activity, Payment, Process, Snapshot, UserAccount};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::gateway::PersistenceGateway;

/// Where the store sits in its synchronization cycle.
///
/// `Idle → Loading → Ready` on startup; every mutating operation drives
/// `Ready → Saving → Loading → Ready`. A failed save drops back to
/// `Ready` with the error surfaced and the collections still holding
/// the unsynchronized optimistic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Loading,
    Ready,
    Saving,
}

const LOAD_ATTEMPTS: u32 = 3;
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(300);

/// The single source of truth for one session: the four record
/// collections, the logged-in username, and the snapshot revision
/// observed at the last successful synchronization.
///
/// Reads retry transient failures because `read_all` is idempotent.
/// Writes are never retried automatically: a replayed `replace_all`
/// could resurrect data another session deleted in between.
pub struct ClientStore<G> {
    pub(crate) gateway: G,
    pub(crate) data: Snapshot,
    pub(crate) state: SyncState,
    pub(crate) session: Option<String>,
    pub(crate) base_revision: Option<String>,
    loaded: bool,
}

impl<G: PersistenceGateway> ClientStore<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            data: Snapshot::default(),
            state: SyncState::Idle,
            session: None,
            base_revision: None,
            loaded: false,
        }
    }

    pub fn processes(&self) -> &[Process] {
        &self.data.processes
    }

    pub fn payments(&self) -> &[Payment] {
        &self.data.payments
    }

    pub fn users(&self) -> &[UserAccount] {
        &self.data.users
    }

    pub fn activities(&self) -> &[Activity] {
        &self.data.activities
    }

    /// The full optimistic dataset as last mutated or loaded.
    pub fn snapshot(&self) -> &Snapshot {
        &self.data
    }

    pub fn sync_state(&self) -> SyncState {
        self.state
    }

    /// Username of the logged-in session, if any.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Revision of the snapshot observed at the last successful load or
    /// save; sent as the conditional base on every save.
    pub fn base_revision(&self) -> Option<&str> {
        self.base_revision.as_deref()
    }

    /// Account record backing the logged-in session, if it still exists
    /// in the users collection.
    pub fn current_account(&self) -> Option<&UserAccount> {
        let username = self.session.as_deref()?;
        self.data.users.iter().find(|u| u.username == username)
    }

    /// Fetch the snapshot from the gateway and overwrite all four
    /// collections with it (no merge). Optional fields are normalized
    /// here, and only here. Transient failures are retried a few times
    /// with a short backoff; a load that still fails leaves the
    /// collections untouched and surfaces the error.
    pub async fn load(&mut self) -> Result<(), StoreError> {
        self.state = SyncState::Loading;

        let mut attempt = 1;
        let (mut snapshot, revision) = loop {
            match self.gateway.read_all().await {
                Ok(result) => break result,
                Err(err) if err.is_transient() && attempt < LOAD_ATTEMPTS => {
                    warn!("load attempt {attempt} failed, retrying: {err}");
                    tokio::time::sleep(LOAD_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.state = if self.loaded {
                        SyncState::Ready
                    } else {
                        SyncState::Idle
                    };
                    return Err(err);
                }
            }
        };

        // The base revision must be the server's view of these bytes;
        // normalization changes the canonical serialization, so a digest
        // recomputed afterwards would never match the server's.
        self.base_revision = Some(revision.unwrap_or_else(|| snapshot.revision()));
        snapshot.normalize();

        info!(
            "loaded snapshot: {} processes, {} payments, {} users, {} activities",
            snapshot.processes.len(),
            snapshot.payments.len(),
            snapshot.users.len(),
            snapshot.activities.len()
        );
        self.data = snapshot;
        self.loaded = true;
        self.state = SyncState::Ready;
        Ok(())
    }

    /// Send the full four collections to the gateway, conditional on
    /// the remembered base revision. On failure the collections keep
    /// the optimistic value; no rollback is attempted.
    pub async fn save(&mut self) -> Result<(), StoreError> {
        self.state = SyncState::Saving;
        let result = self
            .gateway
            .replace_all(&self.data, self.base_revision.as_deref())
            .await;
        self.state = SyncState::Ready;

        let revision = result?;
        self.base_revision = Some(revision.unwrap_or_else(|| self.data.revision()));
        Ok(())
    }

    /// The universal write path: apply `mutate` to the collections,
    /// save the full snapshot, then reload from the source of truth so
    /// the next render reflects exactly what was persisted. Not atomic
    /// end-to-end; a failure at either step surfaces to the caller with
    /// the optimistic value left in place.
    pub async fn mutate_then_sync<F>(&mut self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot),
    {
        mutate(&mut self.data);
        self.save().await?;
        self.load().await
    }
}
