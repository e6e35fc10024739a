// Error types for the privacy core
// One enum per concern; messages never carry PII values

use thiserror::Error;

/// Sealing/opening failures in the authenticated-encryption layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: {0}")]
    Decrypt(&'static str),
    #[error("payload serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A single detection engine failing. Always recovered locally: the
/// engine contributes nothing to that mask call.
#[derive(Debug, Error)]
#[error("detection engine error: {0}")]
pub struct DetectionError(pub String);

/// Failures in either locker.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault unavailable: {0}")]
    Unavailable(String),
    #[error("vault value corrupt: {0}")]
    Corrupt(String),
    #[error("consent required before storing a profile")]
    ConsentMissing,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Failures in the external key-value / document collaborators.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// LLM call failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm provider error: {0}")]
    Provider(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Configuration loading/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option {0}")]
    Missing(&'static str),
    #[error("invalid value for {option}: {reason}")]
    Invalid {
        option: &'static str,
        reason: String,
    },
    #[error("unrecognized option {0}")]
    Unrecognized(String),
}

/// Per-turn failures surfaced by the chat orchestrator.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("privacy pipeline failure: {0}")]
    Privacy(#[from] VaultError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("history store failure: {0}")]
    History(#[from] StoreError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("message {0} not found")]
    MessageNotFound(String),
}
