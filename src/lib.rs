// Privacy middleware core
// Guarantees that no PII crosses the trust boundary to the LLM provider:
// outbound text is masked into stable opaque tokens, only tokenized text is
// sent, and original values are restored before display. Token mappings
// live in an encrypted, TTL-bound vault; plaintext PII is never persisted.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod masking;
pub mod vault;

pub use chat::{
    ChatOrchestrator, ChatTurn, ForgetOutcome, HistoryStore, MaskedExchange, MemoryHistoryStore,
    StoredMessage, StreamUnmasker, TokenInfo,
};
pub use config::Config;
pub use error::{
    ChatError, ConfigError, CryptoError, DetectionError, LlmError, StoreError, VaultError,
};
pub use llm::{ChatMessage, GroqBackend, LlmBackend, PromptShield, ResponseValidator};
pub use masking::{
    DetectedEntity, DetectionSource, Engines, EntityType, MaskingPipeline, MaskingResult,
    ScoredEntity, SessionMappings, TokenMapping, Tokenizer,
};
pub use vault::{
    AuditAction, AuditLog, AuditRecord, ConsentFlags, KeyValueStore, MemoryKvStore,
    MemoryProfileStore, ProfileStore, ProfileVault, SessionVault, UserProfile, VaultCipher,
};
