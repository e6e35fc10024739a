// Response Validator - PII-leak detection and rewriting on LLM output
// The model should only ever echo tokens; anything else gets put back

use regex::Regex;
use tracing::warn;

use crate::masking::tokenizer::SessionMappings;

// Patterns that indicate raw PII in a response that should carry tokens only
const PII_PATTERNS: &[&str] = &[
    // Email
    r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    // Phones
    r"(?:\+91[-.\s]?)?[6-9]\d{9}",
    r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}",
    // Aadhaar
    r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}\b",
    // PAN
    r"\b[A-Z]{5}\d{4}[A-Z]\b",
    // Credit card (basic)
    r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b",
    // SSN
    r"\b\d{3}-\d{2}-\d{4}\b",
];

// Original values shorter than this are too ambiguous to scan for
const MIN_VALUE_LEN: usize = 3;

/// Result of validating one LLM response.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub sanitized: String,
    pub leaks: Vec<String>,
}

pub struct ResponseValidator {
    patterns: Vec<Regex>,
    token_shape: Regex,
}

impl ResponseValidator {
    pub fn new() -> Self {
        let patterns = PII_PATTERNS
            .iter()
            .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid PII pattern {p:?}: {e}")))
            .collect();
        Self {
            patterns,
            token_shape: Regex::new(r"\[[A-Z]+_\d+\]").unwrap(),
        }
    }

    /// Collect every leak in the response: PII-shaped pattern hits plus any
    /// original session value echoed back (case-insensitive).
    pub fn detect_leaks(&self, response: &str, mappings: &SessionMappings) -> Vec<String> {
        let mut leaks = Vec::new();

        for pattern in &self.patterns {
            for m in pattern.find_iter(response) {
                leaks.push(m.as_str().to_string());
            }
        }

        let lower = response.to_lowercase();
        for mapping in mappings.values() {
            let original = mapping.original.trim();
            if original.len() >= MIN_VALUE_LEN && lower.contains(&original.to_lowercase()) {
                leaks.push(original.to_string());
            }
        }

        if !leaks.is_empty() {
            warn!(count = leaks.len(), "PII leakage detected in response");
        }
        leaks
    }

    /// Rewrite every leak back into token form. Known session values become
    /// their token (longest value first so substrings cannot shadow a longer
    /// leak); PII-shaped matches with no mapping become `[REDACTED]`.
    pub fn sanitize(&self, response: &str, mappings: &SessionMappings) -> ValidationOutcome {
        let leaks = self.detect_leaks(response, mappings);
        if leaks.is_empty() {
            return ValidationOutcome {
                sanitized: response.to_string(),
                leaks,
            };
        }

        let mut sanitized = response.to_string();

        let mut by_length: Vec<(&String, &str)> = mappings
            .iter()
            .map(|(token, mapping)| (token, mapping.original.trim()))
            .filter(|(_, original)| original.len() >= MIN_VALUE_LEN)
            .collect();
        by_length.sort_by_key(|(_, original)| std::cmp::Reverse(original.len()));

        for (token, original) in by_length {
            let pattern = Regex::new(&format!("(?i){}", regex::escape(original)))
                .expect("escaped literal is always a valid pattern");
            sanitized = pattern.replace_all(&sanitized, token.as_str()).into_owned();
        }

        // Whatever still matches a PII shape has no token; blank it out
        for pattern in &self.patterns {
            sanitized = pattern.replace_all(&sanitized, "[REDACTED]").into_owned();
        }

        ValidationOutcome { sanitized, leaks }
    }

    /// Every `[TYPE_N]` substring in the response must belong to the
    /// session. Returns the unknown ones.
    pub fn check_token_consistency(
        &self,
        response: &str,
        mappings: &SessionMappings,
    ) -> Vec<String> {
        let unknown: Vec<String> = self
            .token_shape
            .find_iter(response)
            .map(|m| m.as_str().to_string())
            .filter(|t| !mappings.contains_key(t))
            .collect();
        if !unknown.is_empty() {
            warn!(count = unknown.len(), "unknown tokens in response");
        }
        unknown
    }
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::entity::EntityType;
    use crate::masking::tokenizer::TokenMapping;

    fn mappings() -> SessionMappings {
        let mut m = SessionMappings::new();
        m.insert(
            "[USER_1]".to_string(),
            TokenMapping {
                original: "Alice".to_string(),
                entity_type: EntityType::User,
                positions: Vec::new(),
            },
        );
        m.insert(
            "[ORG_1]".to_string(),
            TokenMapping {
                original: "Google".to_string(),
                entity_type: EntityType::Org,
                positions: Vec::new(),
            },
        );
        m
    }

    #[test]
    fn test_leaked_values_rewritten_to_tokens() {
        let v = ResponseValidator::new();
        let outcome = v.sanitize("Hello Alice! Glad you work at Google.", &mappings());
        assert_eq!(outcome.sanitized, "Hello [USER_1]! Glad you work at [ORG_1].");
        assert!(outcome.leaks.contains(&"Alice".to_string()));
        assert!(outcome.leaks.contains(&"Google".to_string()));
    }

    #[test]
    fn test_case_insensitive_rewrite() {
        let v = ResponseValidator::new();
        let outcome = v.sanitize("hi ALICE, hello alice", &mappings());
        assert_eq!(outcome.sanitized, "hi [USER_1], hello [USER_1]");
    }

    #[test]
    fn test_pattern_leak_without_mapping_redacted() {
        let v = ResponseValidator::new();
        let outcome = v.sanitize("write to stranger@example.org", &mappings());
        assert_eq!(outcome.sanitized, "write to [REDACTED]");
        assert_eq!(outcome.leaks, vec!["stranger@example.org".to_string()]);
    }

    #[test]
    fn test_clean_response_passes_through() {
        let v = ResponseValidator::new();
        let outcome = v.sanitize("Hello [USER_1], nice day!", &mappings());
        assert_eq!(outcome.sanitized, "Hello [USER_1], nice day!");
        assert!(outcome.leaks.is_empty());
    }

    #[test]
    fn test_token_consistency() {
        let v = ResponseValidator::new();
        let unknown = v.check_token_consistency("[USER_1] met [USER_9] at [ORG_1]", &mappings());
        assert_eq!(unknown, vec!["[USER_9]".to_string()]);
    }

    #[test]
    fn test_short_values_not_scanned() {
        let mut m = SessionMappings::new();
        m.insert(
            "[OTHER_1]".to_string(),
            TokenMapping {
                original: "ab".to_string(),
                entity_type: EntityType::Other,
                positions: Vec::new(),
            },
        );
        let v = ResponseValidator::new();
        let outcome = v.sanitize("absolutely fine about this", &m);
        assert!(outcome.leaks.is_empty());
        assert_eq!(outcome.sanitized, "absolutely fine about this");
    }
}
