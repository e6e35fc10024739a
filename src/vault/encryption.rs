// AES-256-GCM authenticated encryption for vault data
// Key derived from the master secret with PBKDF2-HMAC-SHA256

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::Hmac;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CryptoError;

/// Nonce size for AES-GCM (12 bytes recommended).
const NONCE_SIZE: usize = 12;
/// GCM authentication tag size.
const TAG_SIZE: usize = 16;
/// Salt size for key derivation.
const SALT_SIZE: usize = 16;
/// PBKDF2 iteration count.
const ITERATIONS: u32 = 100_000;

/// Seals and opens vault blobs. The wire format is
/// Base64(nonce ‖ ciphertext ‖ tag).
pub struct VaultCipher {
    cipher: Aes256Gcm,
}

impl VaultCipher {
    /// Derive the encryption key from the master secret. The salt is the
    /// first 16 bytes of SHA-256(master secret) so the same secret always
    /// derives the same key.
    pub fn new(master_secret: &str) -> Result<Self, CryptoError> {
        if master_secret.is_empty() {
            return Err(CryptoError::KeyDerivation);
        }

        let digest = Sha256::digest(master_secret.as_bytes());
        let salt = &digest[..SALT_SIZE];

        let mut key = [0u8; 32];
        pbkdf2::pbkdf2::<Hmac<Sha256>>(master_secret.as_bytes(), salt, ITERATIONS, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivation)?;
        debug!("vault cipher initialized");
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext string. A fresh random nonce makes every call
    /// produce a different blob for the same input.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Decrypt a blob produced by `encrypt`. Fails on malformed Base64,
    /// truncated input, or any bit flip in ciphertext or tag.
    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let combined = STANDARD
            .decode(blob)
            .map_err(|_| CryptoError::Decrypt("malformed base64"))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decrypt("input too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decrypt("authentication failed"))?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt("invalid utf-8"))
    }

    /// Encrypt any serializable value as JSON.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        let json = serde_json::to_string(value)?;
        self.encrypt(&json)
    }

    /// Decrypt and deserialize a JSON value.
    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &str) -> Result<T, CryptoError> {
        let json = self.decrypt(blob)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cipher() -> VaultCipher {
        VaultCipher::new("unit-test-master-secret").unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let c = cipher();
        let blob = c.encrypt("hello vault").unwrap();
        assert_eq!(c.decrypt(&blob).unwrap(), "hello vault");
    }

    #[test]
    fn test_fresh_nonce_per_encrypt() {
        let c = cipher();
        let a = c.encrypt("same plaintext").unwrap();
        let b = c.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), c.decrypt(&b).unwrap());
    }

    #[test]
    fn test_tamper_detection() {
        let c = cipher();
        let blob = c.encrypt("sensitive").unwrap();
        let mut raw = STANDARD.decode(&blob).unwrap();
        // Flip one bit in every byte position in turn; all must fail
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let tampered = STANDARD.encode(&raw);
            assert!(c.decrypt(&tampered).is_err(), "bit flip at {} accepted", i);
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn test_malformed_inputs() {
        let c = cipher();
        assert!(matches!(
            c.decrypt("!!!not-base64!!!"),
            Err(CryptoError::Decrypt("malformed base64"))
        ));
        let short = STANDARD.encode([0u8; 8]);
        assert!(matches!(
            c.decrypt(&short),
            Err(CryptoError::Decrypt("input too short"))
        ));
    }

    #[test]
    fn test_same_secret_same_key() {
        let a = VaultCipher::new("shared-secret").unwrap();
        let b = VaultCipher::new("shared-secret").unwrap();
        let blob = a.encrypt("cross-instance").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap(), "cross-instance");
    }

    #[test]
    fn test_wrong_secret_fails() {
        let a = VaultCipher::new("secret-a").unwrap();
        let b = VaultCipher::new("secret-b").unwrap();
        let blob = a.encrypt("content").unwrap();
        assert!(b.decrypt(&blob).is_err());
    }

    #[test]
    fn test_json_helpers() {
        let c = cipher();
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), "v".to_string());
        let blob = c.encrypt_json(&map).unwrap();
        let back: BTreeMap<String, String> = c.decrypt_json(&blob).unwrap();
        assert_eq!(back, map);
    }
}
