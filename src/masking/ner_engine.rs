// NER Engine - statistical named-entity detection with false-positive filters
// Wraps a NerModel backend; runs locally, no text leaves the process

use std::collections::HashSet;

use tracing::debug;

use crate::error::DetectionError;
use crate::masking::entity::{DetectedEntity, DetectionSource, EntityType};
use crate::masking::ner_model::{load_model, NerLabel, NerModel, NerSpan};

// Terms the model may flag that must never be masked
const EXCLUDED_TERMS: &[&str] = &[
    // Common abbreviations
    "ip", "ssn", "dob", "pan", "id", "aadhaar", "aadhar", "email", "phone", "mobile",
    "address", "name", "age",
    // Common tech terms
    "ai", "ml", "api", "url", "http", "https", "www",
    // Common words
    "hello", "hi", "hey", "thanks", "thank", "please", "help", "python", "java",
    "javascript", "code", "programming",
    // Days and months
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december",
    // Seasons and time periods
    "summer", "winter", "spring", "fall", "autumn", "season", "seasons", "morning",
    "afternoon", "evening", "night", "today", "tomorrow", "yesterday",
    // Generic location/org terms
    "college", "school", "university", "company", "office", "home", "city", "state",
    "country", "place", "location",
    // Common verbs/adjectives the model sometimes flags
    "related", "associated", "connected", "based", "located",
    // Generic nouns
    "fruits", "vegetables", "food", "drink", "water", "book", "movie", "song", "music",
    "art",
    // Question words
    "what", "when", "where", "who", "why", "how",
];

/// Entity types that matter most for privacy; they get the higher base.
const PRIORITY_TYPES: &[EntityType] = &[
    EntityType::User,
    EntityType::Org,
    EntityType::Location,
    EntityType::Date,
];

pub struct NerEngine {
    model: Box<dyn NerModel>,
    excluded: HashSet<&'static str>,
}

impl NerEngine {
    /// Build with the backend selected by the configured model id.
    pub fn new(model_id: &str) -> Result<Self, DetectionError> {
        Ok(Self::with_model(load_model(model_id)?))
    }

    pub fn with_model(model: Box<dyn NerModel>) -> Self {
        Self {
            model,
            excluded: EXCLUDED_TERMS.iter().copied().collect(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.id()
    }

    pub fn detect(&self, text: &str) -> Result<Vec<DetectedEntity>, DetectionError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut entities = Vec::new();
        for span in self.model.predict(text)? {
            let lower = span.text.to_lowercase();
            if self.excluded.contains(lower.as_str()) {
                continue;
            }
            if span.text.len() < 2 {
                continue;
            }
            // A multi-word phrase made entirely of excluded words is generic
            let words: Vec<&str> = lower.split_whitespace().collect();
            if words.len() > 1 && words.iter().all(|w| self.excluded.contains(w)) {
                debug!("skipping generic phrase");
                continue;
            }
            if !self.is_valid(&span, &lower) {
                continue;
            }

            let entity_type = translate(span.label);
            let confidence = self.confidence(&span, entity_type);
            entities.push(DetectedEntity {
                text: span.text,
                entity_type,
                start: span.start,
                end: span.end,
                confidence,
                source: DetectionSource::Ner,
            });
        }

        debug!(count = entities.len(), "ner detection done");
        Ok(entities)
    }

    // Per-label validity rules rejecting common false positives
    fn is_valid(&self, span: &NerSpan, lower: &str) -> bool {
        match span.label {
            // A name with no uppercase letter is probably not a name
            NerLabel::Person => span.text.chars().any(|c| c.is_uppercase()),
            NerLabel::Org | NerLabel::Gpe => !self.excluded.contains(lower),
            _ => span.text.len() >= 3,
        }
    }

    fn confidence(&self, span: &NerSpan, entity_type: EntityType) -> f64 {
        let mut confidence: f64 = if PRIORITY_TYPES.contains(&entity_type) {
            0.85
        } else {
            0.70
        };
        // Longer surface forms are usually more reliable
        if span.text.len() > 5 {
            confidence += 0.05;
        }
        if entity_type == EntityType::User
            && span.text.chars().next().is_some_and(|c| c.is_uppercase())
        {
            confidence += 0.05;
        }
        confidence.min(0.99)
    }
}

fn translate(label: NerLabel) -> EntityType {
    match label {
        NerLabel::Person => EntityType::User,
        NerLabel::Org => EntityType::Org,
        NerLabel::Gpe | NerLabel::Loc => EntityType::Location,
        NerLabel::Date => EntityType::Date,
        NerLabel::Money => EntityType::Money,
        NerLabel::Norp => EntityType::Group,
        NerLabel::Fac => EntityType::Facility,
        NerLabel::Product => EntityType::Product,
        NerLabel::Event => EntityType::Event,
        NerLabel::WorkOfArt => EntityType::Work,
        NerLabel::Law => EntityType::Law,
        NerLabel::Language => EntityType::Language,
        NerLabel::Time => EntityType::Time,
        NerLabel::Percent => EntityType::Percent,
        NerLabel::Quantity => EntityType::Quantity,
        NerLabel::Cardinal => EntityType::Number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> NerEngine {
        NerEngine::new("en-small").unwrap()
    }

    #[test]
    fn test_person_and_org_detected() {
        let found = engine().detect("Hi, I'm Alice and I work at Google.").unwrap();
        let alice = found
            .iter()
            .find(|e| e.entity_type == EntityType::User)
            .unwrap();
        assert_eq!(alice.text, "Alice");
        // USER priority base 0.85 + uppercase-initial bump
        assert!((alice.confidence - 0.90).abs() < 1e-9);
        let google = found
            .iter()
            .find(|e| e.entity_type == EntityType::Org)
            .unwrap();
        assert_eq!(google.text, "Google");
        // ORG priority base 0.85 + length > 5 bump
        assert!((google.confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_excluded_terms_skipped() {
        let found = engine().detect("Tomorrow in summer we visit College").unwrap();
        assert!(found.iter().all(|e| e.text.to_lowercase() != "summer"));
        assert!(found.iter().all(|e| e.text.to_lowercase() != "college"));
        assert!(found.iter().all(|e| e.text.to_lowercase() != "tomorrow"));
    }

    #[test]
    fn test_number_confidence_base() {
        let found = engine().detect("the code is 12345 67890").unwrap();
        let num = found
            .iter()
            .find(|e| e.entity_type == EntityType::Number)
            .unwrap();
        // non-priority base 0.70 + length > 5 bump
        assert!((num.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(engine().detect("  ").unwrap().is_empty());
    }
}
