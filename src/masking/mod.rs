// Masking layer - multi-engine PII detection, merging and tokenization

pub mod confidence;
pub mod entity;
pub mod fuzzy_engine;
pub mod ner_engine;
pub mod ner_model;
pub mod pipeline;
pub mod regex_engine;
pub mod tokenizer;

pub use confidence::ConfidenceMerger;
pub use entity::{DetectedEntity, DetectionSource, EntityType, ScoredEntity};
pub use fuzzy_engine::FuzzyEngine;
pub use ner_engine::NerEngine;
pub use ner_model::{LexiconModel, NerLabel, NerModel, NerSpan};
pub use pipeline::{Engines, MaskingPipeline, MaskingResult};
pub use regex_engine::RegexEngine;
pub use tokenizer::{SessionMappings, TokenMapping, Tokenizer, UnmaskingResult};
