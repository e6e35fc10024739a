// Tokenizer - deterministic token minting and bidirectional mapping
// [USER_1], [ORG_1], [EMAIL_1], ... consistent within one session

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::masking::entity::{EntityType, ScoredEntity};

/// Bidirectional mapping between a token and its original value. This is the
/// language-neutral record the vault persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMapping {
    pub original: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub positions: Vec<(usize, usize)>,
}

/// Full mapping table for a session, keyed by token.
pub type SessionMappings = BTreeMap<String, TokenMapping>;

/// Result of restoring tokens in a piece of text. Unmasking is total:
/// tokens with no mapping are left in place.
#[derive(Debug, Clone)]
pub struct UnmaskingResult {
    pub masked_text: String,
    pub unmasked_text: String,
    pub tokens_replaced: usize,
}

/// Per-session deterministic tokenizer. One normalized value maps to exactly
/// one token; one token maps to exactly one value; per-prefix counters are
/// contiguous from 1 in first-seen order.
pub struct Tokenizer {
    session_id: String,
    counters: HashMap<String, u32>,
    value_to_token: HashMap<String, String>,
    token_to_value: SessionMappings,
}

impl Tokenizer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            counters: HashMap::new(),
            value_to_token: HashMap::new(),
            token_to_value: BTreeMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Mint a token for a value, or return the existing one. The first-seen
    /// casing of the value is the one that survives.
    pub fn mint(&mut self, entity_type: EntityType, value: &str) -> String {
        let normalized = value.trim().to_lowercase();
        if let Some(token) = self.value_to_token.get(&normalized) {
            return token.clone();
        }

        let prefix = entity_type.prefix();
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        let token = format!("[{}_{}]", prefix, counter);

        self.value_to_token.insert(normalized, token.clone());
        self.token_to_value.insert(
            token.clone(),
            TokenMapping {
                original: value.trim().to_string(),
                entity_type,
                positions: Vec::new(),
            },
        );

        debug!(%entity_type, token = %token, "minted token");
        token
    }

    /// Splice tokens over the given entities (which must be non-overlapping
    /// and sorted, as the merger emits them). Returns the rewritten text and
    /// the mappings actually touched by this call.
    pub fn mask_text(&mut self, text: &str, entities: &[ScoredEntity]) -> (String, SessionMappings) {
        if entities.is_empty() {
            return (text.to_string(), SessionMappings::new());
        }

        let mut masked = text.to_string();
        let mut used = SessionMappings::new();

        // Replace back-to-front so earlier offsets stay valid
        for entity in entities.iter().rev() {
            let token = self.mint(entity.entity_type, &entity.text);
            masked.replace_range(entity.start..entity.end, &token);
            if let Some(mapping) = self.token_to_value.get_mut(&token) {
                mapping.positions.push((entity.start, entity.end));
                used.insert(token, mapping.clone());
            }
        }

        debug!(entities = entities.len(), "masked text");
        (masked, used)
    }

    /// Replace every known token with its original value. Longest tokens go
    /// first so no token that is a prefix of another is clobbered.
    pub fn unmask_text(&self, masked_text: &str) -> UnmaskingResult {
        let mut tokens: Vec<&String> = self.token_to_value.keys().collect();
        tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

        let mut unmasked = masked_text.to_string();
        let mut tokens_replaced = 0;
        for token in tokens {
            if unmasked.contains(token.as_str()) {
                let mapping = &self.token_to_value[token];
                unmasked = unmasked.replace(token.as_str(), &mapping.original);
                tokens_replaced += 1;
            }
        }

        UnmaskingResult {
            masked_text: masked_text.to_string(),
            unmasked_text: unmasked,
            tokens_replaced,
        }
    }

    pub fn token_for_value(&self, value: &str) -> Option<&str> {
        let normalized = value.trim().to_lowercase();
        self.value_to_token.get(&normalized).map(String::as_str)
    }

    pub fn value_for_token(&self, token: &str) -> Option<&str> {
        self.token_to_value.get(token).map(|m| m.original.as_str())
    }

    pub fn mappings(&self) -> &SessionMappings {
        &self.token_to_value
    }

    pub fn token_count(&self) -> usize {
        self.token_to_value.len()
    }

    /// Serialize the mapping table for vault storage.
    pub fn export_mappings(&self) -> SessionMappings {
        self.token_to_value.clone()
    }

    /// Rebuild state from a stored mapping table. Counters are bumped to the
    /// maximum N seen per prefix so future mints stay unique.
    pub fn load_mappings(&mut self, mappings: SessionMappings) {
        let count = mappings.len();
        for (token, mapping) in mappings {
            let normalized = mapping.original.trim().to_lowercase();
            self.value_to_token.insert(normalized, token.clone());

            if let Some((prefix, n)) = parse_token(&token) {
                let counter = self.counters.entry(prefix.to_string()).or_insert(0);
                *counter = (*counter).max(n);
            }
            self.token_to_value.insert(token, mapping);
        }
        debug!(count, "loaded token mappings");
    }
}

/// Split `[PREFIX_N]` into its prefix and counter.
fn parse_token(token: &str) -> Option<(&str, u32)> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    let (prefix, n) = inner.rsplit_once('_')?;
    let n: u32 = n.parse().ok()?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((prefix, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::entity::DetectionSource;

    fn scored(text: &str, entity_type: EntityType, start: usize) -> ScoredEntity {
        ScoredEntity {
            text: text.to_string(),
            entity_type,
            start,
            end: start + text.len(),
            confidence: 0.9,
            sources: vec![DetectionSource::Regex],
            priority: entity_type.priority(),
        }
    }

    #[test]
    fn test_mint_is_idempotent_per_normalized_value() {
        let mut tk = Tokenizer::new("s1");
        let t1 = tk.mint(EntityType::User, "Alice");
        let t2 = tk.mint(EntityType::User, "  alice ");
        assert_eq!(t1, t2);
        assert_eq!(t1, "[USER_1]");
        // First-seen casing survives
        assert_eq!(tk.value_for_token("[USER_1]"), Some("Alice"));
    }

    #[test]
    fn test_counters_contiguous_per_prefix() {
        let mut tk = Tokenizer::new("s1");
        assert_eq!(tk.mint(EntityType::User, "Alice"), "[USER_1]");
        assert_eq!(tk.mint(EntityType::Email, "a@x.io"), "[EMAIL_1]");
        assert_eq!(tk.mint(EntityType::User, "Bob"), "[USER_2]");
        assert_eq!(tk.mint(EntityType::User, "Carol"), "[USER_3]");
    }

    #[test]
    fn test_mask_unmask_is_identity() {
        let mut tk = Tokenizer::new("s1");
        let text = "Alice emailed alice@x.io";
        let entities = vec![
            scored("Alice", EntityType::User, 0),
            scored("alice@x.io", EntityType::Email, 14),
        ];
        let (masked, used) = tk.mask_text(text, &entities);
        assert_eq!(masked, "[USER_1] emailed [EMAIL_1]");
        assert_eq!(used.len(), 2);

        let restored = tk.unmask_text(&masked);
        assert_eq!(restored.unmasked_text, text);
        assert_eq!(restored.tokens_replaced, 2);
    }

    #[test]
    fn test_unmask_longest_token_first() {
        let mut tk = Tokenizer::new("s1");
        for i in 0..12 {
            tk.mint(EntityType::User, &format!("person{}", i));
        }
        // [USER_1] is a prefix of [USER_10]..[USER_12]; it must not clobber them
        let restored = tk.unmask_text("[USER_12] and [USER_1]");
        assert_eq!(restored.unmasked_text, "person11 and person0");
    }

    #[test]
    fn test_unknown_tokens_left_in_place() {
        let tk = Tokenizer::new("s1");
        let restored = tk.unmask_text("hello [USER_9]");
        assert_eq!(restored.unmasked_text, "hello [USER_9]");
        assert_eq!(restored.tokens_replaced, 0);
    }

    #[test]
    fn test_export_load_roundtrip_bumps_counters() {
        let mut tk = Tokenizer::new("s1");
        tk.mint(EntityType::User, "Alice");
        tk.mint(EntityType::User, "Bob");
        tk.mint(EntityType::College, "MIT");
        let exported = tk.export_mappings();

        let mut fresh = Tokenizer::new("s2");
        fresh.load_mappings(exported);
        assert_eq!(fresh.token_for_value("alice"), Some("[USER_1]"));
        // Counter resumes after the loaded maximum
        assert_eq!(fresh.mint(EntityType::User, "Carol"), "[USER_3]");
        assert_eq!(fresh.mint(EntityType::College, "CBIT"), "[COLLEGE_2]");
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("[USER_12]"), Some(("USER", 12)));
        assert_eq!(parse_token("[CARD_1]"), Some(("CARD", 1)));
        assert_eq!(parse_token("[user_1]"), None);
        assert_eq!(parse_token("USER_1"), None);
        assert_eq!(parse_token("[USER]"), None);
    }
}
