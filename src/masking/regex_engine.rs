// Regex Engine - Pattern-based PII detection
// High precision for structured data: emails, phones, Aadhaar, PAN, cards, IPs, ...

use regex::Regex;
use tracing::debug;

use crate::error::DetectionError;
use crate::masking::entity::{DetectedEntity, DetectionSource, EntityType};

struct PatternSpec {
    entity_type: EntityType,
    regex: Regex,
    confidence: f64,
    // Checks the regex crate cannot express (it has no look-around)
    validate: Option<fn(&str) -> bool>,
}

/// Pattern-based detector. Patterns are compiled once at construction.
pub struct RegexEngine {
    patterns: Vec<PatternSpec>,
}

impl RegexEngine {
    pub fn new() -> Self {
        let mut patterns = Vec::new();
        let mut add = |entity_type: EntityType,
                       pattern: &str,
                       confidence: f64,
                       validate: Option<fn(&str) -> bool>| {
            let regex = Regex::new(pattern)
                .unwrap_or_else(|e| panic!("invalid {} pattern: {e}", entity_type));
            patterns.push(PatternSpec {
                entity_type,
                regex,
                confidence,
                validate,
            });
        };

        add(
            EntityType::Email,
            r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            0.98,
            None,
        );
        // Indian (+91 optional, starts 6-9), US ((555) 123-4567), international (+CC ...)
        add(
            EntityType::Phone,
            r"(?x)
                (?:\+91[-.\s]?)?[6-9]\d{9}
                |
                (?:\+1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}
                |
                \+\d{1,3}[-.\s]?\d{1,4}[-.\s]?\d{1,4}[-.\s]?\d{1,9}
            ",
            0.95,
            None,
        );
        add(
            EntityType::Aadhaar,
            r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}\b",
            0.97,
            None,
        );
        // 5 letters, 4 digits, 1 letter
        add(EntityType::Pan, r"\b[A-Z]{5}\d{4}[A-Z]\b", 0.98, None);
        // Visa / MasterCard / Amex prefixes; Luhn deliberately not required
        add(
            EntityType::CreditCard,
            r"(?x)
                \b(?:
                    4\d{3}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}
                    |
                    5[1-5]\d{2}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}
                    |
                    3[47]\d{2}[-\s]?\d{6}[-\s]?\d{5}
                )\b
            ",
            0.96,
            Some(card_digit_count_ok),
        );
        add(
            EntityType::Ssn,
            r"\b\d{3}[-\s]?\d{2}[-\s]?\d{4}\b",
            0.95,
            Some(ssn_exclusions_ok),
        );
        add(
            EntityType::IpAddress,
            r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d{1,2})\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d{1,2})\b",
            0.99,
            None,
        );
        add(
            EntityType::Dob,
            r"(?xi)
                \b(?:
                    (?:0?[1-9]|[12]\d|3[01])[/-](?:0?[1-9]|1[0-2])[/-](?:19|20)\d{2}
                    |
                    (?:19|20)\d{2}[/-](?:0?[1-9]|1[0-2])[/-](?:0?[1-9]|[12]\d|3[01])
                    |
                    (?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?
                     |Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?
                     |Dec(?:ember)?)\s+\d{1,2},?\s+\d{4}
                )\b
            ",
            0.90,
            None,
        );
        add(EntityType::Passport, r"\b[A-Z]{1,2}\d{6,9}\b", 0.75, None);
        add(
            EntityType::VehicleReg,
            r"\b[A-Z]{2}\s?\d{1,2}\s?[A-Z]{1,3}\s?\d{4}\b",
            0.92,
            None,
        );
        // IFSC code
        add(
            EntityType::BankAccount,
            r"\b[A-Z]{4}0[A-Z0-9]{6}\b",
            0.88,
            None,
        );
        add(
            EntityType::Url,
            r"(?i)https?://(?:[-\w.]|(?:%[\da-fA-F]{2}))+(?:/[^\s]*)?",
            0.85,
            None,
        );
        add(
            EntityType::Address,
            r"(?i)\b\d{1,5}\s+[\w\s]{1,50}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Court|Ct|Way|Place|Pl)\.?\b",
            0.70,
            None,
        );
        add(
            EntityType::RollNumber,
            r"\b(?:\d{2}[A-Z]{2,4}\d{3,5}|[A-Z]{2,4}\d{4,8})\b",
            0.80,
            None,
        );
        add(
            EntityType::EmployeeId,
            r"(?i)\b(?:EMP|ID|EMPLOYEE)[-_]?\d{4,10}\b",
            0.85,
            None,
        );

        debug!(patterns = patterns.len(), "regex engine compiled");
        Self { patterns }
    }

    /// Detect PII patterns in the text. Overlaps between different patterns
    /// are left for the confidence merger to resolve.
    pub fn detect(&self, text: &str) -> Result<Vec<DetectedEntity>, DetectionError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut entities = Vec::new();
        for spec in &self.patterns {
            for mat in spec.regex.find_iter(text) {
                if let Some(validate) = spec.validate {
                    if !validate(mat.as_str()) {
                        continue;
                    }
                }
                entities.push(DetectedEntity {
                    text: mat.as_str().to_string(),
                    entity_type: spec.entity_type,
                    start: mat.start(),
                    end: mat.end(),
                    confidence: spec.confidence,
                    source: DetectionSource::Regex,
                });
            }
        }

        debug!(count = entities.len(), "regex detection done");
        Ok(entities)
    }

    pub fn supported_types(&self) -> Vec<EntityType> {
        self.patterns.iter().map(|p| p.entity_type).collect()
    }
}

impl Default for RegexEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn card_digit_count_ok(matched: &str) -> bool {
    let digits = matched.chars().filter(|c| c.is_ascii_digit()).count();
    (13..=19).contains(&digits)
}

// US SSN: area not 000/666/9xx, group not 00, serial not 0000
fn ssn_exclusions_ok(matched: &str) -> bool {
    let digits: String = matched.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 {
        return false;
    }
    let area = &digits[0..3];
    let group = &digits[3..5];
    let serial = &digits[5..9];
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<DetectedEntity> {
        RegexEngine::new().detect(text).unwrap()
    }

    fn types(text: &str) -> Vec<EntityType> {
        detect(text).into_iter().map(|e| e.entity_type).collect()
    }

    #[test]
    fn test_email_detection() {
        let found = detect("reach me at john.doe@example.com please");
        assert!(found
            .iter()
            .any(|e| e.entity_type == EntityType::Email && e.text == "john.doe@example.com"));
    }

    #[test]
    fn test_phone_detection() {
        assert!(types("call +91-9876543210 now").contains(&EntityType::Phone));
        assert!(types("call (555) 123-4567 now").contains(&EntityType::Phone));
    }

    #[test]
    fn test_aadhaar_detection() {
        let found = detect("Aadhaar 1234 5678 9012");
        let aadhaar = found
            .iter()
            .find(|e| e.entity_type == EntityType::Aadhaar)
            .unwrap();
        assert_eq!(aadhaar.text, "1234 5678 9012");
        assert!((aadhaar.confidence - 0.97).abs() < 1e-9);
    }

    #[test]
    fn test_pan_is_case_sensitive() {
        assert!(types("PAN is ABCDE1234F").contains(&EntityType::Pan));
        assert!(!types("pan is abcde1234f").contains(&EntityType::Pan));
    }

    #[test]
    fn test_ssn_zero_prefix_exclusions() {
        assert!(types("ssn 123-45-6789").contains(&EntityType::Ssn));
        assert!(!types("ssn 000-45-6789").contains(&EntityType::Ssn));
        assert!(!types("ssn 666-45-6789").contains(&EntityType::Ssn));
        assert!(!types("ssn 912-45-6789").contains(&EntityType::Ssn));
        assert!(!types("ssn 123-00-6789").contains(&EntityType::Ssn));
        assert!(!types("ssn 123-45-0000").contains(&EntityType::Ssn));
    }

    #[test]
    fn test_credit_card_prefixes() {
        assert!(types("card 4111 1111 1111 1111").contains(&EntityType::CreditCard));
        assert!(types("card 5500-0000-0000-0004").contains(&EntityType::CreditCard));
        // 6xxx is not a supported prefix
        assert!(!types("card 6011 0000 0000 0004").contains(&EntityType::CreditCard));
    }

    #[test]
    fn test_ipv4_bounds() {
        assert!(types("host 192.168.1.10").contains(&EntityType::IpAddress));
        assert!(!types("host 999.999.999.999").contains(&EntityType::IpAddress));
    }

    #[test]
    fn test_empty_input() {
        assert!(detect("").is_empty());
        assert!(detect("   \t ").is_empty());
    }
}
