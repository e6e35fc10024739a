// Configuration for the privacy core
// Every option is enumerated; anything else is rejected

use std::env;

use crate::error::ConfigError;

/// Default ephemeral-vault TTL: 30 minutes.
pub const DEFAULT_VAULT_TTL_SECONDS: u64 = 1800;
/// Default minimum confidence for an entity to survive the merger.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
/// Default fuzzy-match acceptance ratio on the 0-100 scale.
pub const DEFAULT_FUZZY_THRESHOLD: u32 = 85;
/// Default NER backend: the bundled small English model.
pub const DEFAULT_NER_MODEL: &str = "en-small";
/// Default LLM request deadline.
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 30_000;

const RECOGNIZED_OPTIONS: &[&str] = &[
    "MASTER_SECRET",
    "VAULT_TTL_SECONDS",
    "MIN_CONFIDENCE",
    "FUZZY_THRESHOLD",
    "NER_MODEL",
    "LLM_MODEL",
    "LLM_API_KEY",
    "LLM_TIMEOUT_MS",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub master_secret: String,
    pub vault_ttl_seconds: u64,
    pub min_confidence: f64,
    pub fuzzy_threshold: u32,
    pub ner_model: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub llm_timeout_ms: u64,
}

impl Config {
    /// Load from process environment. Only the enumerated options are read.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pairs = RECOGNIZED_OPTIONS
            .iter()
            .filter_map(|name| env::var(name).ok().map(|v| (name.to_string(), v)));
        Self::from_pairs(pairs)
    }

    /// Build from explicit key/value pairs. Unknown keys are rejected.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cfg = Config {
            master_secret: String::new(),
            vault_ttl_seconds: DEFAULT_VAULT_TTL_SECONDS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            ner_model: DEFAULT_NER_MODEL.to_string(),
            llm_model: String::new(),
            llm_api_key: String::new(),
            llm_timeout_ms: DEFAULT_LLM_TIMEOUT_MS,
        };

        for (key, value) in pairs {
            match key.as_str() {
                "MASTER_SECRET" => cfg.master_secret = value,
                "VAULT_TTL_SECONDS" => {
                    cfg.vault_ttl_seconds = parse_u64("VAULT_TTL_SECONDS", &value)?;
                }
                "MIN_CONFIDENCE" => {
                    let v: f64 = value.parse().map_err(|_| ConfigError::Invalid {
                        option: "MIN_CONFIDENCE",
                        reason: "not a number".into(),
                    })?;
                    if !(0.0..=1.0).contains(&v) {
                        return Err(ConfigError::Invalid {
                            option: "MIN_CONFIDENCE",
                            reason: "must be within [0, 1]".into(),
                        });
                    }
                    cfg.min_confidence = v;
                }
                "FUZZY_THRESHOLD" => {
                    let v = parse_u64("FUZZY_THRESHOLD", &value)?;
                    if v > 100 {
                        return Err(ConfigError::Invalid {
                            option: "FUZZY_THRESHOLD",
                            reason: "must be within [0, 100]".into(),
                        });
                    }
                    cfg.fuzzy_threshold = v as u32;
                }
                "NER_MODEL" => cfg.ner_model = value,
                "LLM_MODEL" => cfg.llm_model = value,
                "LLM_API_KEY" => cfg.llm_api_key = value,
                "LLM_TIMEOUT_MS" => cfg.llm_timeout_ms = parse_u64("LLM_TIMEOUT_MS", &value)?,
                _ => return Err(ConfigError::Unrecognized(key)),
            }
        }

        if cfg.master_secret.is_empty() {
            return Err(ConfigError::Missing("MASTER_SECRET"));
        }

        Ok(cfg)
    }
}

fn parse_u64(option: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        option,
        reason: "not a non-negative integer".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(kv: &[(&str, &str)]) -> Vec<(String, String)> {
        kv.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::from_pairs(pairs(&[("MASTER_SECRET", "s3cret")])).unwrap();
        assert_eq!(cfg.vault_ttl_seconds, 1800);
        assert_eq!(cfg.fuzzy_threshold, 85);
        assert_eq!(cfg.ner_model, "en-small");
        assert!((cfg.min_confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_master_secret_required() {
        let err = Config::from_pairs(pairs(&[("LLM_MODEL", "llama")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MASTER_SECRET")));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = Config::from_pairs(pairs(&[
            ("MASTER_SECRET", "s"),
            ("VAULT_TTL_HOURS", "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Unrecognized(k) if k == "VAULT_TTL_HOURS"));
    }

    #[test]
    fn test_range_validation() {
        assert!(Config::from_pairs(pairs(&[
            ("MASTER_SECRET", "s"),
            ("MIN_CONFIDENCE", "1.5"),
        ]))
        .is_err());
        assert!(Config::from_pairs(pairs(&[
            ("MASTER_SECRET", "s"),
            ("FUZZY_THRESHOLD", "101"),
        ]))
        .is_err());
    }
}
