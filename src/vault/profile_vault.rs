// Persistent encrypted profile vault (Locker 2)
// ONE encrypted profile per user: { name, college, email }, consent-gated.
// Decrypted only in RAM to recreate a session's initial mappings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, VaultError};
use crate::masking::entity::EntityType;
use crate::masking::tokenizer::{SessionMappings, TokenMapping};
use crate::vault::encryption::VaultCipher;

// Profile fields in schema order; the position (1-based) fixes the token
// index used when recreating session mappings
const PROFILE_SCHEMA: &[(&str, EntityType)] = &[
    ("name", EntityType::User),
    ("college", EntityType::College),
    ("email", EntityType::Email),
];

/// The three optional profile fields. Encrypted as one blob at rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub college: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    /// Trim every field; empty strings become None.
    pub fn normalize(&self) -> UserProfile {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        UserProfile {
            name: clean(&self.name),
            college: clean(&self.college),
            email: clean(&self.email),
        }
    }

    fn field(&self, key: &str) -> Option<&str> {
        match key {
            "name" => self.name.as_deref(),
            "college" => self.college.as_deref(),
            "email" => self.email.as_deref(),
            _ => None,
        }
    }

    fn field_mut(&mut self, key: &str) -> &mut Option<String> {
        match key {
            "name" => &mut self.name,
            "college" => &mut self.college,
            "email" => &mut self.email,
            _ => unreachable!("unknown profile field"),
        }
    }
}

/// Consent flags stored next to the blob, readable without decrypting it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFlags {
    pub remember_me: bool,
    pub sync_across_devices: bool,
}

impl ConsentFlags {
    pub fn any(&self) -> bool {
        self.remember_me || self.sync_across_devices
    }
}

/// One stored record per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub encrypted_blob: Option<String>,
    pub consent_remember: bool,
    pub consent_sync: bool,
    pub updated_at: DateTime<Utc>,
}

/// Document-store contract: find/upsert/delete one record by user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError>;
    async fn upsert(&self, user_id: &str, record: ProfileRecord) -> Result<(), StoreError>;
    async fn delete(&self, user_id: &str) -> Result<bool, StoreError>;
}

/// In-memory profile store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryProfileStore {
    records: Mutex<HashMap<String, ProfileRecord>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError("profile store lock poisoned".into()))?;
        Ok(records.get(user_id).cloned())
    }

    async fn upsert(&self, user_id: &str, record: ProfileRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError("profile store lock poisoned".into()))?;
        records.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError("profile store lock poisoned".into()))?;
        Ok(records.remove(user_id).is_some())
    }
}

/// Persistent vault for ONE user profile (Locker 2).
pub struct ProfileVault {
    store: Arc<dyn ProfileStore>,
    cipher: Arc<VaultCipher>,
}

impl ProfileVault {
    pub fn new(store: Arc<dyn ProfileStore>, cipher: Arc<VaultCipher>) -> Self {
        Self { store, cipher }
    }

    /// Encrypt and store the profile. Only valid when the user has given at
    /// least one consent.
    pub async fn store_profile(
        &self,
        user_id: &str,
        profile: &UserProfile,
        consent: ConsentFlags,
    ) -> Result<(), VaultError> {
        if !consent.any() {
            return Err(VaultError::ConsentMissing);
        }

        let normalized = profile.normalize();
        let encrypted_blob = self.cipher.encrypt_json(&normalized)?;
        self.store
            .upsert(
                user_id,
                ProfileRecord {
                    encrypted_blob: Some(encrypted_blob),
                    consent_remember: consent.remember_me,
                    consent_sync: consent.sync_across_devices,
                    updated_at: Utc::now(),
                },
            )
            .await
            .map_err(unavailable)?;
        info!(user = %hash_tag(user_id), "stored encrypted profile");
        Ok(())
    }

    /// Decrypt the profile into RAM. The caller must not persist the
    /// plaintext; it exists only to recreate session mappings.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, VaultError> {
        let record = self.store.find(user_id).await.map_err(unavailable)?;
        let Some(blob) = record.and_then(|r| r.encrypted_blob) else {
            return Ok(None);
        };
        let profile: UserProfile = self
            .cipher
            .decrypt_json(&blob)
            .map_err(|e| VaultError::Corrupt(e.to_string()))?;
        Ok(Some(profile.normalize()))
    }

    /// Read consent flags without touching the blob.
    pub async fn get_consent(&self, user_id: &str) -> Result<ConsentFlags, VaultError> {
        let record = self.store.find(user_id).await.map_err(unavailable)?;
        Ok(record
            .map(|r| ConsentFlags {
                remember_me: r.consent_remember,
                sync_across_devices: r.consent_sync,
            })
            .unwrap_or_default())
    }

    /// Patch consent flags only; the encrypted blob is carried over
    /// untouched.
    pub async fn update_consent(
        &self,
        user_id: &str,
        remember_me: Option<bool>,
        sync_across_devices: Option<bool>,
    ) -> Result<ConsentFlags, VaultError> {
        let existing = self.store.find(user_id).await.map_err(unavailable)?;
        let mut record = existing.unwrap_or(ProfileRecord {
            encrypted_blob: None,
            consent_remember: false,
            consent_sync: false,
            updated_at: Utc::now(),
        });
        if let Some(v) = remember_me {
            record.consent_remember = v;
        }
        if let Some(v) = sync_across_devices {
            record.consent_sync = v;
        }
        record.updated_at = Utc::now();
        let flags = ConsentFlags {
            remember_me: record.consent_remember,
            sync_across_devices: record.consent_sync,
        };
        self.store
            .upsert(user_id, record)
            .await
            .map_err(unavailable)?;
        Ok(flags)
    }

    /// Permanently delete the persistent profile ("forget me").
    pub async fn delete_profile(&self, user_id: &str) -> Result<bool, VaultError> {
        let deleted = self.store.delete(user_id).await.map_err(unavailable)?;
        if deleted {
            info!(user = %hash_tag(user_id), "deleted persistent profile");
        } else {
            warn!(user = %hash_tag(user_id), "delete requested for absent profile");
        }
        Ok(deleted)
    }

    /// True when the user has a stored profile with encrypted data, not
    /// just consent flags.
    pub async fn has_profile(&self, user_id: &str) -> Result<bool, VaultError> {
        let record = self.store.find(user_id).await.map_err(unavailable)?;
        Ok(record.is_some_and(|r| r.encrypted_blob.is_some()))
    }
}

/// Convert a profile into session-mapping form so the pipeline can load it.
/// Token indices are fixed by schema order: [USER_1], [COLLEGE_2], [EMAIL_3].
pub fn profile_to_session_mappings(profile: &UserProfile) -> SessionMappings {
    let mut mappings = SessionMappings::new();
    for (idx, (key, entity_type)) in PROFILE_SCHEMA.iter().enumerate() {
        let Some(value) = profile.field(key).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let token = format!("[{}_{}]", entity_type.prefix(), idx + 1);
        mappings.insert(
            token,
            TokenMapping {
                original: value.to_string(),
                entity_type: *entity_type,
                positions: Vec::new(),
            },
        );
    }
    mappings
}

/// Extract a single profile from session mappings: first USER becomes the
/// name, first COLLEGE the college, first EMAIL the email.
pub fn session_mappings_to_profile(mappings: &SessionMappings) -> UserProfile {
    let mut profile = UserProfile::default();
    for mapping in mappings.values() {
        let original = mapping.original.trim();
        if original.is_empty() {
            continue;
        }
        for (key, entity_type) in PROFILE_SCHEMA {
            if mapping.entity_type == *entity_type {
                let slot = profile.field_mut(key);
                if slot.is_none() {
                    *slot = Some(original.to_string());
                }
            }
        }
    }
    profile
}

fn unavailable(err: StoreError) -> VaultError {
    VaultError::Unavailable(err.to_string())
}

// Short non-reversible tag for log lines
fn hash_tag(id: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(id.as_bytes()))[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> ProfileVault {
        ProfileVault::new(
            Arc::new(MemoryProfileStore::new()),
            Arc::new(VaultCipher::new("profile-test-secret").unwrap()),
        )
    }

    fn bob() -> UserProfile {
        UserProfile {
            name: Some("Bob".to_string()),
            college: Some("MIT".to_string()),
            email: Some("bob@mit.edu".to_string()),
        }
    }

    fn consent() -> ConsentFlags {
        ConsentFlags {
            remember_me: true,
            sync_across_devices: false,
        }
    }

    #[tokio::test]
    async fn test_store_requires_consent() {
        let vault = vault();
        let err = vault
            .store_profile("u1", &bob(), ConsentFlags::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::ConsentMissing));
        assert!(!vault.has_profile("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_get_roundtrip_normalizes() {
        let vault = vault();
        let profile = UserProfile {
            name: Some("  Bob ".to_string()),
            college: Some("".to_string()),
            email: Some("bob@mit.edu".to_string()),
        };
        vault.store_profile("u1", &profile, consent()).await.unwrap();
        let loaded = vault.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("Bob"));
        assert_eq!(loaded.college, None);
        assert_eq!(loaded.email.as_deref(), Some("bob@mit.edu"));
    }

    #[tokio::test]
    async fn test_consent_patch_keeps_blob() {
        let vault = vault();
        vault.store_profile("u1", &bob(), consent()).await.unwrap();
        let flags = vault
            .update_consent("u1", None, Some(true))
            .await
            .unwrap();
        assert!(flags.remember_me);
        assert!(flags.sync_across_devices);
        // Blob untouched by the patch
        let loaded = vault.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded, bob());
    }

    #[tokio::test]
    async fn test_delete_profile() {
        let vault = vault();
        vault.store_profile("u1", &bob(), consent()).await.unwrap();
        assert!(vault.delete_profile("u1").await.unwrap());
        assert!(!vault.has_profile("u1").await.unwrap());
        assert_eq!(vault.get_consent("u1").await.unwrap(), ConsentFlags::default());
        assert!(!vault.delete_profile("u1").await.unwrap());
    }

    #[test]
    fn test_profile_to_session_mappings_indices() {
        let mappings = profile_to_session_mappings(&bob());
        assert_eq!(mappings["[USER_1]"].original, "Bob");
        assert_eq!(mappings["[COLLEGE_2]"].original, "MIT");
        assert_eq!(mappings["[EMAIL_3]"].original, "bob@mit.edu");
    }

    #[test]
    fn test_missing_fields_skip_tokens() {
        let profile = UserProfile {
            name: None,
            college: Some("MIT".to_string()),
            email: None,
        };
        let mappings = profile_to_session_mappings(&profile);
        assert_eq!(mappings.len(), 1);
        assert!(mappings.contains_key("[COLLEGE_2]"));
    }

    #[test]
    fn test_session_mappings_to_profile_takes_first() {
        let mut mappings = profile_to_session_mappings(&bob());
        mappings.insert(
            "[USER_2]".to_string(),
            TokenMapping {
                original: "Carol".to_string(),
                entity_type: EntityType::User,
                positions: Vec::new(),
            },
        );
        let profile = session_mappings_to_profile(&mappings);
        // BTreeMap order: [USER_1] comes before [USER_2]
        assert_eq!(profile.name.as_deref(), Some("Bob"));
        assert_eq!(profile.college.as_deref(), Some("MIT"));
        assert_eq!(profile.email.as_deref(), Some("bob@mit.edu"));
    }
}
