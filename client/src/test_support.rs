//! In-memory gateway double and seed data shared by the store, ops and
//! policy tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use shared::Snapshot;

use crate::error::StoreError;
use crate::gateway::PersistenceGateway;

/// Gateway double holding the "server side" snapshot in memory. Clones
/// share the same state, so a test keeps one clone as a handle to seed
/// failures and inspect what was persisted.
///
/// Writes are conditional exactly like the real gateway: a
/// `base_revision` that no longer matches the stored snapshot is
/// refused with [`StoreError::Conflict`].
#[derive(Clone)]
pub(crate) struct FakeGateway {
    stored: Arc<Mutex<Snapshot>>,
    read_failures: Arc<AtomicUsize>,
    write_failures: Arc<AtomicUsize>,
    write_calls: Arc<AtomicUsize>,
}

impl FakeGateway {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            stored: Arc::new(Mutex::new(initial)),
            read_failures: Arc::new(AtomicUsize::new(0)),
            write_failures: Arc::new(AtomicUsize::new(0)),
            write_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Snapshot currently held by the fake server.
    pub fn stored(&self) -> Snapshot {
        self.stored.lock().expect("fake store lock").clone()
    }

    /// Replace the fake server's snapshot behind the store's back, as a
    /// concurrent session would.
    pub fn replace_stored(&self, snapshot: Snapshot) {
        *self.stored.lock().expect("fake store lock") = snapshot;
    }

    /// Make the next `count` reads fail with a transient error.
    pub fn fail_reads(&self, count: usize) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail with a transient error.
    pub fn fail_writes(&self, count: usize) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    /// Total `replace_all` invocations observed.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl PersistenceGateway for FakeGateway {
    async fn read_all(&self) -> Result<(Snapshot, Option<String>), StoreError> {
        if Self::take_failure(&self.read_failures) {
            return Err(StoreError::Transient(
                "Falha ao carregar dados do servidor.".to_string(),
            ));
        }
        let stored = self.stored();
        let revision = stored.revision();
        Ok((stored, Some(revision)))
    }

    async fn replace_all(
        &self,
        snapshot: &Snapshot,
        base_revision: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.write_failures) {
            return Err(StoreError::Transient(
                "Falha ao salvar dados no servidor.".to_string(),
            ));
        }

        let mut stored = self.stored.lock().expect("fake store lock");
        if let Some(base) = base_revision {
            if base != stored.revision() {
                return Err(StoreError::Conflict);
            }
        }
        *stored = snapshot.clone();
        Ok(Some(stored.revision()))
    }
}

/// Two processes (the second missing its optional fields on the wire),
/// two payments both referencing the first process, an admin and a
/// member account, and an empty activity log.
pub(crate) fn sample_snapshot() -> Snapshot {
    serde_json::from_value(json!({
        "processes": [
            {
                "id": "a1",
                "processNumber": "2024/001",
                "supplier": "Acme Serviços",
                "paymentType": "Dispensa",
                "description": "Material de escritório",
                "documents": [],
                "locationInfo": "Contabilidade",
                "isImportant": true,
                "createdAt": "2024-03-01T09:00:00.000Z"
            },
            {
                "id": "a2",
                "processNumber": "2024/002",
                "supplier": "Beta Engenharia",
                "paymentType": "Outros",
                "paymentTypeOther": "Convênio 12",
                "locationInfo": "Secretário/Presidente",
                "createdAt": "2024-03-02T09:00:00.000Z"
            }
        ],
        "payments": [
            {
                "id": "b1",
                "processNumber": "2024/001",
                "supplier": "Acme Serviços",
                "value": 1500.0,
                "paymentDate": "2024-03-10",
                "paymentMethod": "Transferência",
                "status": "Pendente de Liquidação/O.P",
                "location": "Contabilidade",
                "createdAt": "2024-03-05T10:00:00.000Z"
            },
            {
                "id": "b2",
                "processNumber": "2024/001",
                "supplier": "Acme Serviços",
                "value": 250.5,
                "paymentDate": "2024-03-15",
                "paymentMethod": "Boleto",
                "status": "Agendado",
                "location": "Contabilidade",
                "createdAt": "2024-03-06T10:00:00.000Z"
            }
        ],
        "users": [
            { "username": "maria", "password": "segredo", "role": "admin" },
            { "username": "joao", "password": "1234" }
        ],
        "activities": []
    }))
    .expect("sample snapshot should deserialize")
}
