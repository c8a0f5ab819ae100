use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A procurement process record.
///
/// Field names serialize in camelCase because the stored JSON documents
/// and every persisted snapshot already use that convention. Optional
/// fields are skipped when absent so a snapshot read back from the
/// gateway carries exactly the fields that were written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: String,
    /// Human-assigned number, unique among processes at creation time.
    pub process_number: String,
    pub supplier: String,
    pub payment_type: PaymentCategory,
    /// Free text describing the category when `payment_type` is `Outros`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type_other: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inline attachments, ordered as uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<DocumentAttachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_info: Option<ProcessLocation>,
    /// Free text describing the location when `location_info` is `Outros`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_other_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<ProcessAlert>,
    /// RFC 3339 timestamp with millisecond precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A payment made (or scheduled) against a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    /// Soft reference to the owning process. Referential integrity is a
    /// caller responsibility, not enforced by storage.
    pub process_number: String,
    pub supplier: String,
    pub value: f64,
    /// Calendar date in `YYYY-MM-DD` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_other: Option<String>,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_proof: Option<DocumentAttachment>,
    /// Denormalized copy of the owning process's location, refreshed on
    /// every payment save and location change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ProcessLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A credential pair. Passwords are stored and compared in plaintext,
/// matching the persisted data this system manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub username: String,
    pub password: String,
    /// Absent means a regular member account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// One entry of the append-at-front activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    /// Type tag, e.g. `Criação de Processo` or `Status: Pago`.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    /// Acting username, or `Sistema` when no session was active.
    pub user: String,
    /// RFC 3339 timestamp with millisecond precision.
    pub timestamp: String,
    /// Arbitrary detail bag; usually `{ "supplier": ... }` or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// An inline file attachment: the content travels in the snapshot as a
/// base64 data URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAttachment {
    pub name: String,
    /// MIME type reported at upload.
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

/// A dated reminder attached to a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAlert {
    /// Calendar date in `YYYY-MM-DD` form.
    pub date: String,
    pub message: String,
}

/// Procurement category of a process. Variants serialize to the exact
/// strings the stored records use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCategory {
    #[serde(rename = "Dispensa")]
    Exemption,
    #[serde(rename = "Pregão Eletrônico")]
    ElectronicAuction,
    #[serde(rename = "Inexigibilidade")]
    Unenforceability,
    #[serde(rename = "Adiantamento")]
    Advance,
    #[serde(rename = "Outros")]
    Other,
}

impl PaymentCategory {
    pub fn as_wire(&self) -> &'static str {
        match self {
            PaymentCategory::Exemption => "Dispensa",
            PaymentCategory::ElectronicAuction => "Pregão Eletrônico",
            PaymentCategory::Unenforceability => "Inexigibilidade",
            PaymentCategory::Advance => "Adiantamento",
            PaymentCategory::Other => "Outros",
        }
    }
}

impl fmt::Display for PaymentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Physical location of a process's paper folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessLocation {
    #[serde(rename = "Contabilidade")]
    Accounting,
    #[serde(rename = "Secretário/Presidente")]
    Secretary,
    #[serde(rename = "Arquivado")]
    Archived,
    #[serde(rename = "Outros")]
    Other,
}

impl ProcessLocation {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ProcessLocation::Accounting => "Contabilidade",
            ProcessLocation::Secretary => "Secretário/Presidente",
            ProcessLocation::Archived => "Arquivado",
            ProcessLocation::Other => "Outros",
        }
    }
}

impl fmt::Display for ProcessLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Settlement state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "Pendente de Liquidação/O.P")]
    PendingSettlement,
    #[serde(rename = "Pendente de Cadastro no Banco")]
    PendingBankRegistration,
    #[serde(rename = "Cadastrado no banco")]
    RegisteredAtBank,
    #[serde(rename = "Agendado")]
    Scheduled,
    #[serde(rename = "Pago")]
    Paid,
}

impl PaymentStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            PaymentStatus::PendingSettlement => "Pendente de Liquidação/O.P",
            PaymentStatus::PendingBankRegistration => "Pendente de Cadastro no Banco",
            PaymentStatus::RegisteredAtBank => "Cadastrado no banco",
            PaymentStatus::Scheduled => "Agendado",
            PaymentStatus::Paid => "Pago",
        }
    }

    /// Both pending variants count as "Pendente" in filters and
    /// dashboard totals.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            PaymentStatus::PendingSettlement | PaymentStatus::PendingBankRegistration
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Capability level of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Parse the stored column value; anything unrecognized reads as
    /// no role (member level).
    pub fn from_wire(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

/// The complete four-collection dataset: the unit of every read and
/// every write. Missing keys deserialize as empty collections so a
/// partial document still yields a usable snapshot; serialization
/// always emits all four keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub users: Vec<UserAccount>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Snapshot {
    /// Content digest of the canonical JSON serialization, used as the
    /// ETag/If-Match revision token for conflict detection. Two
    /// snapshots with equal contents always produce the same revision.
    pub fn revision(&self) -> String {
        // Serializing this model never fails: derived impls over plain
        // data, and serde_json encodes non-finite floats as null rather
        // than erroring. The fallback is unreachable.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        debug_assert!(!bytes.is_empty(), "snapshot serialization failed");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = hasher.finalize();
        format!("{hash:x}")
    }

    /// Fill the optional process fields the UI expects to always be
    /// present: missing `documents` becomes an empty list and missing
    /// `isImportant` becomes `false`. Runs once at the client store's
    /// load boundary; the gateway never normalizes.
    pub fn normalize(&mut self) {
        for process in &mut self.processes {
            if process.documents.is_none() {
                process.documents = Some(Vec::new());
            }
            if process.is_important.is_none() {
                process.is_important = Some(false);
            }
        }
    }
}

const RECORD_ID_SUFFIX_LEN: usize = 9;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a record identifier: the current epoch milliseconds in
/// base 36 followed by nine random base-36 characters. Uniqueness is
/// probabilistic and never verified by the server.
pub fn generate_record_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut id = encode_base36(millis);
    let entropy = *uuid::Uuid::new_v4().as_bytes();
    for byte in entropy.iter().take(RECORD_ID_SUFFIX_LEN) {
        id.push(BASE36_DIGITS[(byte % 36) as usize] as char);
    }
    id
}

/// Recover the creation epoch milliseconds embedded in a record id.
pub fn decode_record_id(id: &str) -> Result<u64, RecordIdError> {
    if id.len() <= RECORD_ID_SUFFIX_LEN {
        return Err(RecordIdError::TooShort);
    }
    let (timestamp_part, _) = id.split_at(id.len() - RECORD_ID_SUFFIX_LEN);
    decode_base36(timestamp_part)
}

fn encode_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    digits.iter().map(|&b| b as char).collect()
}

fn decode_base36(text: &str) -> Result<u64, RecordIdError> {
    if text.is_empty() {
        return Err(RecordIdError::TooShort);
    }
    let mut value: u64 = 0;
    for ch in text.chars() {
        let digit = match ch {
            '0'..='9' => ch as u64 - '0' as u64,
            'a'..='z' => ch as u64 - 'a' as u64 + 10,
            _ => return Err(RecordIdError::InvalidDigit(ch)),
        };
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or(RecordIdError::Overflow)?;
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordIdError {
    #[error("record id is too short")]
    TooShort,
    #[error("invalid base-36 digit '{0}' in record id")]
    InvalidDigit(char),
    #[error("record id timestamp does not fit in 64 bits")]
    Overflow,
}

/// Current instant as an RFC 3339 UTC timestamp with millisecond
/// precision, e.g. `2025-08-25T14:03:07.218Z`. All `created_at` and
/// activity timestamps use this format.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current UTC calendar date as `YYYY-MM-DD`, the format payment dates
/// and alert dates are compared against.
pub fn today_date_string() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}
