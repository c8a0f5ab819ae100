use std::sync::Arc;

use procurement_tracker_backend::config::{ServerConfig, StorageKind};
use procurement_tracker_backend::rest::{self, AppState};
use procurement_tracker_backend::storage::{FileStore, SnapshotStore, SqliteStore};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = ServerConfig::from_env()?;

    let store: Arc<dyn SnapshotStore> = match config.storage {
        StorageKind::File => {
            info!("Using flat-file storage at {}", config.data_file.display());
            Arc::new(FileStore::new(&config.data_file)?)
        }
        StorageKind::Sqlite => {
            info!("Using SQLite storage at {}", config.db_url);
            Arc::new(SqliteStore::new(&config.db_url).await?)
        }
    };

    let state = AppState::new(store);
    let app = rest::create_router(state, &config.public_dir);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
