// Fuzzy Engine - approximate matching to catch typos and variations
// "Alicee" -> Alice, "Gogle" -> Google

use std::collections::HashMap;

use tracing::debug;

use crate::error::DetectionError;
use crate::masking::entity::{DetectedEntity, DetectionSource, EntityType};

const KNOWN_COMPANIES: &[&str] = &[
    "Google", "Microsoft", "Apple", "Amazon", "Facebook", "Meta", "Netflix", "Twitter",
    "LinkedIn", "Instagram", "WhatsApp", "TCS", "Infosys", "Wipro", "HCL", "Tech Mahindra",
    "Cognizant", "Accenture", "Deloitte", "KPMG", "EY", "PwC", "IBM", "Oracle", "SAP",
    "Salesforce", "Adobe", "Intel", "Nvidia", "Tesla", "SpaceX", "Uber", "Lyft", "Airbnb",
    "Stripe", "Shopify",
];

const KNOWN_COLLEGES: &[&str] = &[
    "MIT", "Stanford", "Harvard", "Yale", "Princeton", "Columbia", "IIT", "IIM", "BITS",
    "NIT", "IIIT", "VIT", "SRM", "Manipal", "CBIT", "JNTU", "Osmania", "Anna University",
    "Delhi University", "Oxford", "Cambridge", "Berkeley", "UCLA", "Caltech",
];

const COMMON_NAMES: &[&str] = &[
    "John", "Jane", "Alice", "Bob", "Charlie", "David", "Emma", "James", "Mary", "Robert",
    "Patricia", "Michael", "Jennifer", "William", "Linda", "Richard", "Elizabeth", "Joseph",
    "Barbara", "Rahul", "Priya", "Amit", "Anita", "Raj", "Pooja", "Vikram", "Sneha",
    "Arjun", "Kavya", "Rohan", "Neha", "Arun", "Sanjay",
];

const STRIP_PUNCT: &[char] = &[
    '.', ',', '!', '?', ';', ':', '\'', '"', '(', ')', '[', ']', '{', '}',
];

struct FuzzyMatch {
    entity_type: EntityType,
    ratio: u32,
}

/// Dictionary-backed approximate matcher. Keys are lowercased known-entity
/// strings; the dictionary is extensible at runtime.
pub struct FuzzyEngine {
    known_entities: HashMap<String, EntityType>,
    threshold: u32,
}

impl FuzzyEngine {
    /// `threshold` is the minimum similarity ratio (0-100) to accept a match.
    pub fn new(threshold: u32) -> Self {
        let mut known_entities = HashMap::new();
        for name in COMMON_NAMES {
            known_entities.insert(name.to_lowercase(), EntityType::User);
        }
        for company in KNOWN_COMPANIES {
            known_entities.insert(company.to_lowercase(), EntityType::Org);
        }
        for college in KNOWN_COLLEGES {
            known_entities.insert(college.to_lowercase(), EntityType::College);
        }
        Self {
            known_entities,
            threshold,
        }
    }

    /// Teach the matcher a new known entity (e.g. from a stored profile).
    pub fn add_known_entity(&mut self, entity: &str, entity_type: EntityType) {
        self.known_entities.insert(entity.to_lowercase(), entity_type);
    }

    pub fn detect(&self, text: &str) -> Result<Vec<DetectedEntity>, DetectionError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut entities = Vec::new();
        let mut cursor = 0;
        for raw in text.split_whitespace() {
            let word_start = cursor + text[cursor..].find(raw).unwrap_or(0);
            cursor = word_start + raw.len();

            if raw.len() < 3 {
                continue;
            }
            let clean = raw.trim_matches(STRIP_PUNCT);
            if clean.len() < 3 {
                continue;
            }
            let lead = raw.len() - raw.trim_start_matches(STRIP_PUNCT).len();
            let start = word_start + lead;

            if let Some(m) = self.best_match(clean) {
                entities.push(DetectedEntity {
                    text: clean.to_string(),
                    entity_type: m.entity_type,
                    start,
                    end: start + clean.len(),
                    confidence: f64::from(m.ratio) / 100.0,
                    source: DetectionSource::Fuzzy,
                });
            }
        }

        debug!(count = entities.len(), "fuzzy detection done");
        Ok(entities)
    }

    fn best_match(&self, word: &str) -> Option<FuzzyMatch> {
        let lower = word.to_lowercase();

        if let Some(entity_type) = self.known_entities.get(&lower) {
            return Some(FuzzyMatch {
                entity_type: *entity_type,
                ratio: 100,
            });
        }

        let mut best: Option<FuzzyMatch> = None;
        for (known, entity_type) in &self.known_entities {
            let ratio = (strsim::sorensen_dice(&lower, known) * 100.0).round() as u32;
            if ratio >= self.threshold && best.as_ref().map_or(true, |b| ratio > b.ratio) {
                best = Some(FuzzyMatch {
                    entity_type: *entity_type,
                    ratio,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FuzzyEngine {
        FuzzyEngine::new(85)
    }

    #[test]
    fn test_exact_hit_is_full_ratio() {
        let found = engine().detect("ask Alice about it").unwrap();
        let alice = &found[0];
        assert_eq!(alice.entity_type, EntityType::User);
        assert!((alice.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_typo_matches_company() {
        let found = engine().detect("I joined Gogle last year").unwrap();
        assert!(found
            .iter()
            .any(|e| e.entity_type == EntityType::Org && e.text == "Gogle"));
    }

    #[test]
    fn test_punctuation_stripped_from_span() {
        let text = "met Alice, yesterday";
        let found = engine().detect(text).unwrap();
        let alice = &found[0];
        assert_eq!(alice.text, "Alice");
        assert_eq!(&text[alice.start..alice.end], "Alice");
    }

    #[test]
    fn test_short_words_skipped() {
        assert!(engine().detect("he is ok").unwrap().is_empty());
    }

    #[test]
    fn test_unrelated_word_below_threshold() {
        let found = engine().detect("completely unrelated sentence").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_dynamic_entity_added() {
        let mut e = engine();
        e.add_known_entity("Panther Corp", EntityType::Org);
        // single-token scan still catches the distinctive first word via ratio
        let found = e.detect("I work at Acme").unwrap();
        assert!(found.is_empty());
        let found = e.detect("met Sanjay there").unwrap();
        assert_eq!(found[0].entity_type, EntityType::User);
    }

    #[test]
    fn test_college_detection() {
        let found = engine().detect("studied at Stanford").unwrap();
        assert!(found
            .iter()
            .any(|e| e.entity_type == EntityType::College && e.text == "Stanford"));
    }
}
