//! Import of the pre-system spreadsheet export. Rows carry the process
//! number, supplier, procurement modality, modality number and a
//! free-text note; everything else a Process needs gets a default.

use serde::Deserialize;
use shared::{generate_record_id, now_timestamp, PaymentCategory, Process, ProcessLocation, Snapshot};

/// One row of the legacy export.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRow {
    #[serde(default)]
    pub pc: Option<String>,
    #[serde(default)]
    pub fornecedor: Option<String>,
    #[serde(default)]
    pub modalidade: Option<String>,
    #[serde(default, rename = "numMod")]
    pub num_mod: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

/// The export file: a `processes` array of legacy rows.
#[derive(Debug, Deserialize)]
pub struct LegacyExport {
    #[serde(default)]
    pub processes: Vec<LegacyRow>,
}

/// Normalize a free-text modality onto the closed category set.
pub fn map_category(raw: &str) -> PaymentCategory {
    let lowered = raw.trim().to_lowercase();
    if lowered.contains("dispensa") {
        PaymentCategory::Exemption
    } else if lowered.contains("pregão") || lowered.contains("pregao") {
        PaymentCategory::ElectronicAuction
    } else if lowered.contains("inexigibilidade") {
        PaymentCategory::Unenforceability
    } else if lowered.contains("adiantamento") {
        PaymentCategory::Advance
    } else {
        PaymentCategory::Other
    }
}

/// Fold the original modality text and number into the free-text
/// category field. A recognized category keeps only the number; an
/// unrecognized one keeps both. `-` placeholders count as empty.
pub fn category_detail(modalidade: &str, num_mod: &str) -> String {
    if map_category(modalidade) == PaymentCategory::Other && modalidade.trim() != "-" {
        return format!("{} {}", modalidade.trim(), num_mod.trim())
            .trim()
            .to_string();
    }
    let number = num_mod.trim();
    if !number.is_empty() && number != "-" {
        return number.to_string();
    }
    String::new()
}

/// Map one legacy row onto a fresh Process record. Ids are newly
/// generated; migrated processes start in accounting with no
/// documents and the migration instant as their creation time.
pub fn convert_row(row: &LegacyRow) -> Process {
    let modalidade = row.modalidade.as_deref().unwrap_or("");
    let num_mod = row.num_mod.as_deref().unwrap_or("");

    Process {
        id: generate_record_id(),
        process_number: text_or(row.pc.as_deref(), "N/A"),
        supplier: text_or(row.fornecedor.as_deref(), "Não informado"),
        payment_type: map_category(modalidade),
        payment_type_other: Some(category_detail(modalidade, num_mod)),
        description: Some(row.info.as_deref().map(str::trim).unwrap_or("").to_string()),
        documents: Some(Vec::new()),
        location_info: Some(ProcessLocation::Accounting),
        location_other_text: Some(String::new()),
        is_important: None,
        alert: None,
        created_at: Some(now_timestamp()),
    }
}

/// Append converted rows onto an existing snapshot, leaving the other
/// collections untouched. Returns how many processes were added.
pub fn merge_into(snapshot: &mut Snapshot, rows: &[LegacyRow]) -> usize {
    let converted: Vec<Process> = rows.iter().map(convert_row).collect();
    let count = converted.len();
    snapshot.processes.extend(converted);
    count
}

/// Trimmed text, or the fallback when the field is missing or empty.
fn text_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(text) if !text.is_empty() => text.trim().to_string(),
        _ => fallback.to_string(),
    }
}
