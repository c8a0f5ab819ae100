use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{Role, Snapshot, UserAccount};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::warn;

use super::{SnapshotStore, StoreFailure};

/// Relational store: one row per record. Processes, payments and
/// activities keep the identifier in its own column and the rest of
/// the record as a JSON document; users are plain tuples.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub async fn new(url: &str) -> Result<Self> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url)
                .await
                .with_context(|| format!("creating database {url}"))?;
        }

        let pool = SqlitePool::connect(url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        for statement in [
            "CREATE TABLE IF NOT EXISTS processes (id TEXT PRIMARY KEY, data TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS payments (id TEXT PRIMARY KEY, data TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS activities (id TEXT PRIMARY KEY, data TEXT NOT NULL)",
            "CREATE TABLE IF NOT EXISTS users (username TEXT PRIMARY KEY, password TEXT NOT NULL, role TEXT)",
        ] {
            sqlx::query(statement)
                .execute(pool)
                .await
                .context("setting up schema")?;
        }
        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read every table and rejoin rows into records. Rows that no
    /// longer decode fail open: the whole read recovers to the empty
    /// snapshot, matching the flat-file behavior for a corrupt
    /// document. Query failures stay hard errors.
    async fn stored_snapshot(conn: &mut SqliteConnection) -> Result<Snapshot> {
        let process_rows = sqlx::query("SELECT id, data FROM processes ORDER BY rowid")
            .fetch_all(&mut *conn)
            .await
            .context("reading processes")?;
        let payment_rows = sqlx::query("SELECT id, data FROM payments ORDER BY rowid")
            .fetch_all(&mut *conn)
            .await
            .context("reading payments")?;
        let user_rows = sqlx::query("SELECT username, password, role FROM users ORDER BY rowid")
            .fetch_all(&mut *conn)
            .await
            .context("reading users")?;
        let activity_rows = sqlx::query("SELECT id, data FROM activities ORDER BY rowid")
            .fetch_all(&mut *conn)
            .await
            .context("reading activities")?;

        match Self::decode_snapshot(process_rows, payment_rows, user_rows, activity_rows) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!("stored rows do not rejoin into records ({e:#}), serving the empty snapshot");
                Ok(Snapshot::default())
            }
        }
    }

    fn decode_snapshot(
        process_rows: Vec<SqliteRow>,
        payment_rows: Vec<SqliteRow>,
        user_rows: Vec<SqliteRow>,
        activity_rows: Vec<SqliteRow>,
    ) -> Result<Snapshot> {
        let users = user_rows
            .iter()
            .map(|row| UserAccount {
                username: row.get("username"),
                password: row.get("password"),
                role: row
                    .get::<Option<String>, _>("role")
                    .as_deref()
                    .and_then(Role::from_wire),
            })
            .collect();

        Ok(Snapshot {
            processes: Self::decode_records("processes", process_rows)?,
            payments: Self::decode_records("payments", payment_rows)?,
            users,
            activities: Self::decode_records("activities", activity_rows)?,
        })
    }

    /// Rejoin the identifier column and the JSON payload column into
    /// one record.
    fn decode_records<T: DeserializeOwned>(table: &str, rows: Vec<SqliteRow>) -> Result<Vec<T>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let data: String = row.get("data");
            let mut value: serde_json::Value = serde_json::from_str(&data)
                .with_context(|| format!("row {id} in {table} holds invalid JSON"))?;
            let object = value
                .as_object_mut()
                .ok_or_else(|| anyhow!("row {id} in {table} is not a JSON object"))?;
            object.insert("id".to_string(), serde_json::Value::String(id.clone()));
            let record = serde_json::from_value(value)
                .with_context(|| format!("row {id} in {table} does not parse"))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Split a record into its identifier and the remaining fields and
    /// insert it as one row.
    async fn insert_record<T: Serialize>(
        tx: &mut Transaction<'_, Sqlite>,
        table: &str,
        id: &str,
        record: &T,
    ) -> Result<()> {
        let mut value = serde_json::to_value(record)
            .with_context(|| format!("serializing {table} record {id}"))?;
        if let Some(object) = value.as_object_mut() {
            object.remove("id");
        }

        sqlx::query(&format!("INSERT INTO {table} (id, data) VALUES (?, ?)"))
            .bind(id)
            .bind(value.to_string())
            .execute(&mut **tx)
            .await
            .with_context(|| format!("inserting into {table}"))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn read_all(&self) -> Result<Snapshot> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        Self::stored_snapshot(&mut conn).await
    }

    async fn replace_all(
        &self,
        snapshot: &Snapshot,
        expected_revision: Option<&str>,
    ) -> Result<String, StoreFailure> {
        // One transaction covers the conflict check, the deletes and
        // the inserts; any failure below rolls the whole thing back
        // when the transaction drops.
        let mut tx = self.pool.begin().await.context("beginning transaction")?;

        if let Some(expected) = expected_revision {
            let stored = Self::stored_snapshot(&mut tx).await?.revision();
            if stored != expected {
                return Err(StoreFailure::RevisionMismatch {
                    expected: expected.to_string(),
                    stored,
                });
            }
        }

        for table in ["processes", "payments", "users", "activities"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("clearing {table}"))?;
        }

        for process in &snapshot.processes {
            Self::insert_record(&mut tx, "processes", &process.id, process).await?;
        }
        for payment in &snapshot.payments {
            Self::insert_record(&mut tx, "payments", &payment.id, payment).await?;
        }
        for user in &snapshot.users {
            sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, ?)")
                .bind(&user.username)
                .bind(&user.password)
                .bind(user.role.map(|role| role.as_wire()))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("inserting user {}", user.username))?;
        }
        for activity in &snapshot.activities {
            Self::insert_record(&mut tx, "activities", &activity.id, activity).await?;
        }

        tx.commit().await.context("committing replace")?;
        Ok(snapshot.revision())
    }
}
