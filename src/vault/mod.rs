// Vault layer - two lockers plus the crypto and audit plumbing
// Locker 1: ephemeral TTL-bound session mappings. Locker 2: one encrypted
// profile per user, consent-gated.

pub mod audit;
pub mod encryption;
pub mod kv;
pub mod profile_vault;
pub mod session_vault;

pub use audit::{AuditAction, AuditLog, AuditRecord};
pub use encryption::VaultCipher;
pub use kv::{KeyValueStore, MemoryKvStore};
pub use profile_vault::{
    profile_to_session_mappings, session_mappings_to_profile, ConsentFlags, MemoryProfileStore,
    ProfileRecord, ProfileStore, ProfileVault, UserProfile,
};
pub use session_vault::SessionVault;
