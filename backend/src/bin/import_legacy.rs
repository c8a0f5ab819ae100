//! One-shot importer for the pre-system spreadsheet export:
//! `import_legacy <export.json> <database.json>`. Converted processes
//! are appended to whatever the data file already holds.

use anyhow::{bail, Context, Result};
use procurement_tracker_backend::legacy::{merge_into, LegacyExport};
use procurement_tracker_backend::storage::{FileStore, SnapshotStore};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(export_path), Some(data_path)) = (args.next(), args.next()) else {
        bail!("usage: import_legacy <export.json> <database.json>");
    };

    let raw = std::fs::read_to_string(&export_path)
        .with_context(|| format!("reading export file {export_path}"))?;
    let export: LegacyExport = serde_json::from_str(&raw)
        .with_context(|| format!("parsing export file {export_path}"))?;
    info!("Found {} processes to migrate", export.processes.len());

    let store = FileStore::new(data_path.as_str())?;
    let mut snapshot = store.read_all().await?;
    let migrated = merge_into(&mut snapshot, &export.processes);
    store.replace_all(&snapshot, None).await?;

    info!(
        "Wrote {} processes to {} ({} migrated)",
        snapshot.processes.len(),
        data_path,
        migrated
    );
    Ok(())
}
