// Masking Pipeline - orchestrates all detection engines for one session
// Text -> detect -> merge -> score -> tokenize -> masked text

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::DetectionError;
use crate::masking::confidence::ConfidenceMerger;
use crate::masking::entity::{DetectedEntity, EntityType, ScoredEntity};
use crate::masking::fuzzy_engine::FuzzyEngine;
use crate::masking::ner_engine::NerEngine;
use crate::masking::regex_engine::RegexEngine;
use crate::masking::tokenizer::{SessionMappings, Tokenizer, UnmaskingResult};

/// Detection engines and merger, built once at startup and shared across
/// sessions. Configuration never changes after construction.
pub struct Engines {
    pub regex: RegexEngine,
    pub ner: NerEngine,
    pub fuzzy: FuzzyEngine,
    pub merger: ConfidenceMerger,
}

impl Engines {
    pub fn from_config(config: &Config) -> Result<Self, DetectionError> {
        Ok(Self {
            regex: RegexEngine::new(),
            ner: NerEngine::new(&config.ner_model)?,
            fuzzy: FuzzyEngine::new(config.fuzzy_threshold),
            merger: ConfidenceMerger::new(config.min_confidence),
        })
    }
}

/// Result of one mask call.
#[derive(Debug, Clone)]
pub struct MaskingResult {
    pub original_text: String,
    pub masked_text: String,
    pub tokens: SessionMappings,
    pub entities_detected: usize,
    pub entity_breakdown: HashMap<EntityType, usize>,
}

/// Per-session masking pipeline: shared engines plus this session's
/// tokenizer state.
pub struct MaskingPipeline {
    engines: Arc<Engines>,
    tokenizer: Tokenizer,
}

impl MaskingPipeline {
    pub fn new(session_id: impl Into<String>, engines: Arc<Engines>) -> Self {
        Self {
            engines,
            tokenizer: Tokenizer::new(session_id),
        }
    }

    pub fn session_id(&self) -> &str {
        self.tokenizer.session_id()
    }

    /// Run the full pipeline. Detection and splicing both operate on the
    /// whitespace-collapsed text, and that collapsed form is what comes back
    /// as `original_text`.
    pub fn mask(&mut self, text: &str) -> MaskingResult {
        if text.trim().is_empty() {
            return MaskingResult {
                original_text: text.to_string(),
                masked_text: text.to_string(),
                tokens: SessionMappings::new(),
                entities_detected: 0,
                entity_breakdown: HashMap::new(),
            };
        }

        let cleaned = collapse_whitespace(text);

        let mut all = Vec::new();
        all.extend(run_engine("regex", self.engines.regex.detect(&cleaned)));
        all.extend(run_engine("ner", self.engines.ner.detect(&cleaned)));
        all.extend(run_engine("fuzzy", self.engines.fuzzy.detect(&cleaned)));

        let scored = self.engines.merger.merge_and_score(all);
        let breakdown = breakdown(&scored);
        let (masked_text, tokens) = self.tokenizer.mask_text(&cleaned, &scored);

        MaskingResult {
            original_text: cleaned,
            masked_text,
            tokens,
            entities_detected: scored.len(),
            entity_breakdown: breakdown,
        }
    }

    /// Restore tokens in text. Total: unknown tokens stay in place.
    pub fn unmask(&self, masked_text: &str) -> UnmaskingResult {
        self.tokenizer.unmask_text(masked_text)
    }

    pub fn token_count(&self) -> usize {
        self.tokenizer.token_count()
    }

    /// Direct access to the session tokenizer (streaming unmasker needs it).
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn mappings(&self) -> &SessionMappings {
        self.tokenizer.mappings()
    }

    /// Export the session mapping table for vault storage.
    pub fn export_session_mappings(&self) -> SessionMappings {
        self.tokenizer.export_mappings()
    }

    /// Load previously stored mappings (from the vault, or recreated from a
    /// profile) into this session's tokenizer.
    pub fn load_session_mappings(&mut self, mappings: SessionMappings) {
        self.tokenizer.load_mappings(mappings);
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// One failing engine contributes nothing; the others still run.
fn run_engine(
    name: &str,
    result: Result<Vec<DetectedEntity>, DetectionError>,
) -> Vec<DetectedEntity> {
    match result {
        Ok(entities) => entities,
        Err(err) => {
            warn!(engine = name, error = %err, "detection engine failed");
            Vec::new()
        }
    }
}

fn breakdown(entities: &[ScoredEntity]) -> HashMap<EntityType, usize> {
    let mut map = HashMap::new();
    for entity in entities {
        *map.entry(entity.entity_type).or_insert(0) += 1;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engines() -> Arc<Engines> {
        let config = Config::from_pairs(vec![(
            "MASTER_SECRET".to_string(),
            "test-secret".to_string(),
        )])
        .unwrap();
        Arc::new(Engines::from_config(&config).unwrap())
    }

    #[test]
    fn test_full_pipeline_scenario() {
        let mut pipeline = MaskingPipeline::new("s1", engines());
        let result = pipeline.mask("Hi, I'm Alice and I work at Google. Email me at alice@x.io.");

        assert_eq!(
            result.masked_text,
            "Hi, I'm [USER_1] and I work at [ORG_1]. Email me at [EMAIL_1]."
        );
        assert_eq!(result.entities_detected, 3);
        assert_eq!(result.entity_breakdown[&EntityType::User], 1);
        assert_eq!(result.entity_breakdown[&EntityType::Org], 1);
        assert_eq!(result.entity_breakdown[&EntityType::Email], 1);

        // Same sentence again: identical tokens
        let again = pipeline.mask("Hi, I'm Alice and I work at Google. Email me at alice@x.io.");
        assert_eq!(again.masked_text, result.masked_text);

        // Unmasking the masked text restores the original
        let restored = pipeline.unmask(&result.masked_text);
        assert_eq!(restored.unmasked_text, result.original_text);
    }

    #[test]
    fn test_aadhaar_preferred_over_number_guess() {
        let mut pipeline = MaskingPipeline::new("s2", engines());
        let result = pipeline.mask("Aadhaar 1234 5678 9012");
        assert_eq!(result.masked_text, "Aadhaar [AADHAAR_1]");
        assert_eq!(result.entity_breakdown[&EntityType::Aadhaar], 1);
    }

    #[test]
    fn test_whitespace_collapsed_before_detection() {
        let mut pipeline = MaskingPipeline::new("s3", engines());
        let result = pipeline.mask("I'm   Alice \n  from  Google");
        assert_eq!(result.original_text, "I'm Alice from Google");
        assert!(result.masked_text.contains("[USER_1]"));
    }

    #[test]
    fn test_empty_input_passthrough() {
        let mut pipeline = MaskingPipeline::new("s4", engines());
        let result = pipeline.mask("   ");
        assert_eq!(result.masked_text, "   ");
        assert_eq!(result.entities_detected, 0);
    }
}
