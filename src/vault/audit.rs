// Audit Logger - append-only record of vault operations
// Identifiers are hashed and truncated before they enter a record;
// raw values and PII never do

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Store,
    Retrieve,
    Delete,
    Expire,
    ProfileSave,
    ProfileDelete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub subject_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    pub token_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit trail. Multi-writer; each append is atomic.
#[derive(Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_store(&self, session_id: &str, token_count: usize, ip: Option<&str>) {
        self.append(AuditAction::Store, session_id, token_count, ip);
    }

    pub fn log_retrieve(&self, session_id: &str, token_count: usize, ip: Option<&str>) {
        self.append(AuditAction::Retrieve, session_id, token_count, ip);
    }

    pub fn log_delete(&self, session_id: &str, ip: Option<&str>) {
        self.append(AuditAction::Delete, session_id, 0, ip);
    }

    pub fn log_expire(&self, session_id: &str) {
        self.append(AuditAction::Expire, session_id, 0, None);
    }

    pub fn log_profile_save(&self, user_id: &str, ip: Option<&str>) {
        self.append(AuditAction::ProfileSave, user_id, 0, ip);
    }

    pub fn log_profile_delete(&self, user_id: &str, ip: Option<&str>) {
        self.append(AuditAction::ProfileDelete, user_id, 0, ip);
    }

    /// The most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let skip = records.len().saturating_sub(limit);
        records[skip..].to_vec()
    }

    fn append(&self, action: AuditAction, subject: &str, token_count: usize, ip: Option<&str>) {
        let record = AuditRecord {
            action,
            subject_hash: truncated_hash(subject),
            ip_hash: ip.map(truncated_hash),
            token_count,
            timestamp: Utc::now(),
        };
        info!(
            action = ?record.action,
            subject = %record.subject_hash,
            tokens = record.token_count,
            "audit"
        );
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
    }
}

/// First 16 hex chars of SHA-256.
fn truncated_hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))[..16].to_string()
}
