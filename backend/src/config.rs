use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Which backing store the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    File,
    Sqlite,
}

/// Runtime configuration, resolved once at startup from the
/// environment. The hosting platform injects `PORT`; everything else
/// has a local-development default.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageKind,
    /// Data file for the flat-file store.
    pub data_file: PathBuf,
    /// Connection URL for the SQLite store.
    pub db_url: String,
    /// Directory served as the static front end.
    pub public_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::resolve(|key| env::var(key).ok())
    }

    fn resolve(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid PORT value '{raw}'"))?,
            None => 8000,
        };
        let storage = match get("PROCUREMENT_STORAGE").as_deref() {
            None => StorageKind::File,
            Some("file") => StorageKind::File,
            Some("sqlite") => StorageKind::Sqlite,
            Some(other) => bail!("unknown PROCUREMENT_STORAGE value '{other}' (expected 'file' or 'sqlite')"),
        };
        let data_file = get("PROCUREMENT_DATA_FILE")
            .unwrap_or_else(|| "database.json".to_string())
            .into();
        let db_url = get("PROCUREMENT_DB_URL").unwrap_or_else(|| "sqlite:procurement.db".to_string());
        let public_dir = get("PROCUREMENT_PUBLIC_DIR")
            .unwrap_or_else(|| "public".to_string())
            .into();

        Ok(Self {
            host,
            port,
            storage,
            data_file,
            db_url,
            public_dir,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
