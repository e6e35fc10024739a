// LLM guard layer - backend adapters, prompt shield and response validator

pub mod backend;
pub mod prompt_shield;
pub mod validator;

pub use backend::{ChunkSink, GroqBackend, LlmBackend};
pub use prompt_shield::{ChatMessage, PromptShield};
pub use validator::{ResponseValidator, ValidationOutcome};
