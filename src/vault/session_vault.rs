// Ephemeral vault (Locker 1) - encrypted, TTL-bound session token mappings
// AES-256-GCM at rest, auto-deletion when the TTL elapses

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{StoreError, VaultError};
use crate::masking::tokenizer::SessionMappings;
use crate::vault::encryption::VaultCipher;
use crate::vault::kv::KeyValueStore;

const PREFIX_MAPPINGS: &str = "pg:mappings";

/// Short-TTL store of session token mappings, encrypted via the vault
/// cipher and kept in an external key-value store.
pub struct SessionVault {
    kv: Arc<dyn KeyValueStore>,
    cipher: Arc<VaultCipher>,
    ttl: Duration,
}

impl SessionVault {
    pub fn new(kv: Arc<dyn KeyValueStore>, cipher: Arc<VaultCipher>, ttl: Duration) -> Self {
        info!(ttl_seconds = ttl.as_secs(), "session vault initialized");
        Self { kv, cipher, ttl }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    fn mapping_key(session_id: &str) -> String {
        format!("{}:{}", PREFIX_MAPPINGS, session_id)
    }

    /// Encrypt and store the session's mapping table. Writing refreshes
    /// the TTL.
    pub async fn store(
        &self,
        session_id: &str,
        mappings: &SessionMappings,
    ) -> Result<(), VaultError> {
        let encrypted = self.cipher.encrypt_json(mappings)?;
        self.kv
            .setex(&Self::mapping_key(session_id), self.ttl, &encrypted)
            .await
            .map_err(unavailable)?;
        debug!(tokens = mappings.len(), "stored session mappings");
        Ok(())
    }

    /// Fetch and decrypt the session's mapping table. A missing or expired
    /// key is absent, not an error; a present value that fails to decrypt
    /// is corrupt and propagates.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionMappings>, VaultError> {
        let encrypted = self
            .kv
            .get(&Self::mapping_key(session_id))
            .await
            .map_err(unavailable)?;

        match encrypted {
            None => Ok(None),
            Some(blob) => {
                let mappings: SessionMappings = self
                    .cipher
                    .decrypt_json(&blob)
                    .map_err(|e| VaultError::Corrupt(e.to_string()))?;
                debug!(tokens = mappings.len(), "retrieved session mappings");
                Ok(Some(mappings))
            }
        }
    }

    /// Remove the session's entry. Idempotent.
    pub async fn delete(&self, session_id: &str) -> Result<bool, VaultError> {
        let deleted = self
            .kv
            .del(&Self::mapping_key(session_id))
            .await
            .map_err(unavailable)?;
        if deleted {
            info!("deleted session mappings");
        }
        Ok(deleted)
    }

    /// Remaining lifetime in seconds; -1 if the key has no expiry, -2 if
    /// the key is absent.
    pub async fn get_ttl(&self, session_id: &str) -> Result<i64, VaultError> {
        self.kv
            .ttl(&Self::mapping_key(session_id))
            .await
            .map_err(unavailable)
    }

    /// Reset the TTL to the configured default if the key still exists.
    pub async fn refresh_ttl(&self, session_id: &str) -> Result<bool, VaultError> {
        self.kv
            .expire(&Self::mapping_key(session_id), self.ttl)
            .await
            .map_err(unavailable)
    }

    /// Liveness probe against the backing store.
    pub async fn ping(&self) -> Result<(), VaultError> {
        self.kv.ping().await.map_err(unavailable)
    }
}

fn unavailable(err: StoreError) -> VaultError {
    VaultError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::entity::EntityType;
    use crate::masking::tokenizer::TokenMapping;
    use crate::vault::kv::MemoryKvStore;

    fn vault(ttl: Duration) -> SessionVault {
        SessionVault::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(VaultCipher::new("vault-test-secret").unwrap()),
            ttl,
        )
    }

    fn sample_mappings() -> SessionMappings {
        let mut mappings = SessionMappings::new();
        mappings.insert(
            "[USER_1]".to_string(),
            TokenMapping {
                original: "Alice".to_string(),
                entity_type: EntityType::User,
                positions: vec![(8, 13)],
            },
        );
        mappings
    }

    #[tokio::test]
    async fn test_store_get_roundtrip() {
        let vault = vault(Duration::from_secs(60));
        vault.store("s1", &sample_mappings()).await.unwrap();
        let loaded = vault.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded["[USER_1]"].original, "Alice");
        assert_eq!(loaded["[USER_1]"].entity_type, EntityType::User);
    }

    #[tokio::test]
    async fn test_missing_session_is_absent_not_error() {
        let vault = vault(Duration::from_secs(60));
        assert!(vault.get("nope").await.unwrap().is_none());
        assert_eq!(vault.get_ttl("nope").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_expiry_bound() {
        let vault = vault(Duration::from_millis(30));
        vault.store("s1", &sample_mappings()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(vault.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_value_propagates() {
        let kv = Arc::new(MemoryKvStore::new());
        let vault = SessionVault::new(
            kv.clone(),
            Arc::new(VaultCipher::new("vault-test-secret").unwrap()),
            Duration::from_secs(60),
        );
        kv.setex(
            "pg:mappings:s1",
            Duration::from_secs(60),
            "not-a-valid-blob",
        )
        .await
        .unwrap();
        assert!(matches!(vault.get("s1").await, Err(VaultError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let vault = vault(Duration::from_secs(60));
        vault.store("s1", &sample_mappings()).await.unwrap();
        assert!(vault.delete("s1").await.unwrap());
        assert!(!vault.delete("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_ttl() {
        let vault = vault(Duration::from_secs(60));
        assert!(!vault.refresh_ttl("s1").await.unwrap());
        vault.store("s1", &sample_mappings()).await.unwrap();
        assert!(vault.refresh_ttl("s1").await.unwrap());
        let ttl = vault.get_ttl("s1").await.unwrap();
        assert!((50..=60).contains(&ttl));
    }
}
