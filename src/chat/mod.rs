// Chat orchestrator - ties the whole privacy pipeline together
// mask -> vault store -> shielded LLM call -> leak check -> unmask -> history

pub mod history;
pub mod stream;

pub use history::{HistoryStore, MemoryHistoryStore, StoredMessage};
pub use stream::StreamUnmasker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ChatError, LlmError, VaultError};
use crate::llm::backend::LlmBackend;
use crate::llm::prompt_shield::{ChatMessage, PromptShield};
use crate::llm::validator::ResponseValidator;
use crate::masking::entity::EntityType;
use crate::masking::pipeline::{Engines, MaskingPipeline};
use crate::vault::audit::AuditLog;
use crate::vault::encryption::VaultCipher;
use crate::vault::kv::KeyValueStore;
use crate::vault::profile_vault::{
    profile_to_session_mappings, session_mappings_to_profile, ProfileStore, ProfileVault,
    UserProfile,
};
use crate::vault::session_vault::SessionVault;

const LLM_TEMPERATURE: f64 = 0.7;
const LLM_MAX_TOKENS: u32 = 1024;
const HISTORY_WINDOW: usize = 10;

/// Everything the caller gets back from one chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub session_id: String,
    /// Unmasked reply for display.
    pub reply: String,
    /// The masked form that was persisted.
    pub masked_reply: String,
    /// The masked prompt that went to the LLM.
    pub masked_prompt: String,
    pub tokens_used: Vec<String>,
    pub entities_detected: usize,
    pub leaks_repaired: usize,
    pub token_count: usize,
    pub ttl_remaining: i64,
    /// True when the turn was refused before any LLM call.
    pub refused: bool,
}

/// Transparency view of one stored exchange.
#[derive(Debug, Clone)]
pub struct MaskedExchange {
    pub original_message: String,
    pub masked_message: String,
    pub tokens: Vec<TokenInfo>,
    pub ai_masked_response: String,
    pub ai_unmasked_response: String,
    pub ttl_remaining: i64,
}

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token: String,
    pub entity_type: EntityType,
    /// Obscured rendering for UI lists; never the value itself.
    pub display: String,
    pub original_value: Option<String>,
}

/// Outcome of a "forget me" request.
#[derive(Debug, Clone)]
pub struct ForgetOutcome {
    pub profile_deleted: bool,
    pub sessions_cleared: usize,
}

/// Per-turn orchestrator. All collaborators are explicit handles created at
/// startup; sessions are serialized through one async lock each.
pub struct ChatOrchestrator {
    engines: Arc<Engines>,
    vault: SessionVault,
    profiles: ProfileVault,
    audit: Arc<AuditLog>,
    shield: PromptShield,
    validator: ResponseValidator,
    llm: Arc<dyn LlmBackend>,
    history: Arc<dyn HistoryStore>,
    llm_timeout: Duration,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<MaskingPipeline>>>>,
}

impl ChatOrchestrator {
    pub fn new(
        config: &Config,
        llm: Arc<dyn LlmBackend>,
        kv: Arc<dyn KeyValueStore>,
        profile_store: Arc<dyn ProfileStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self, ChatError> {
        let engines = Arc::new(Engines::from_config(config)?);
        let cipher = Arc::new(
            VaultCipher::new(&config.master_secret).map_err(VaultError::Crypto)?,
        );
        let vault = SessionVault::new(
            kv,
            cipher.clone(),
            Duration::from_secs(config.vault_ttl_seconds),
        );
        let profiles = ProfileVault::new(profile_store, cipher);

        Ok(Self {
            engines,
            vault,
            profiles,
            audit: Arc::new(AuditLog::new()),
            shield: PromptShield::new(),
            validator: ResponseValidator::new(),
            llm,
            history,
            llm_timeout: Duration::from_millis(config.llm_timeout_ms),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn vault(&self) -> &SessionVault {
        &self.vault
    }

    pub fn profiles(&self) -> &ProfileVault {
        &self.profiles
    }

    /// Main chat turn. Session-isolating: mappings come from this session's
    /// ephemeral vault entry only, never from the persistent profile.
    pub async fn chat(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        ip: Option<&str>,
    ) -> Result<ChatTurn, ChatError> {
        let pipeline = self.session_pipeline(session_id);
        let mut pipeline = pipeline.lock().await;

        self.history.bind_session(session_id, user_id).await?;

        // Jailbreak attempts never reach the vault or the LLM
        if self.shield.is_jailbreak_attempt(message).is_some() {
            return Ok(self.refusal_turn(session_id));
        }

        if let Some(mappings) = self.vault.get(session_id).await? {
            self.audit.log_retrieve(session_id, mappings.len(), ip);
            pipeline.load_session_mappings(mappings);
        }

        self.run_turn(&mut pipeline, session_id, message, ip).await
    }

    /// Streaming chat turn. Two lockers: ephemeral first; when it is empty
    /// and the user has consented, the session is recreated from the
    /// persistent profile. Unmasked fragments flow through `on_fragment`.
    pub async fn chat_stream(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        ip: Option<&str>,
        mut on_fragment: Box<dyn FnMut(&str) + Send + '_>,
    ) -> Result<ChatTurn, ChatError> {
        let pipeline = self.session_pipeline(session_id);
        let mut pipeline = pipeline.lock().await;

        self.history.bind_session(session_id, user_id).await?;

        if self.shield.is_jailbreak_attempt(message).is_some() {
            let turn = self.refusal_turn(session_id);
            on_fragment(&turn.reply);
            return Ok(turn);
        }

        self.load_or_recreate(&mut pipeline, session_id, user_id, ip)
            .await?;

        let mask_result = pipeline.mask(message);
        self.vault
            .store(session_id, &pipeline.export_session_mappings())
            .await?;
        self.audit.log_store(session_id, pipeline.token_count(), ip);

        let (sanitized_input, _) = self.shield.sanitize_input(&mask_result.masked_text);
        let messages = self.shield.wrap_message(&sanitized_input);

        let user_row = StoredMessage::new(
            session_id,
            "user",
            &mask_result.masked_text,
            mask_result.tokens.keys().cloned().collect(),
        );
        let user_row_id = user_row.id.clone();
        self.history.append(user_row).await?;

        let mut unmasker = StreamUnmasker::new();
        let masked_response = {
            let tokenizer_view = &*pipeline;
            let sink: crate::llm::backend::ChunkSink<'_> = Box::new(|fragment: &str| {
                let emitted = unmasker.feed(fragment, tokenizer_view.tokenizer());
                if !emitted.is_empty() {
                    on_fragment(&emitted);
                }
            });
            match tokio::time::timeout(
                self.llm_timeout,
                self.llm
                    .stream(&messages, LLM_TEMPERATURE, LLM_MAX_TOKENS, sink),
            )
            .await
            {
                Err(_) => {
                    self.history.remove(&user_row_id).await?;
                    return Err(LlmError::Timeout.into());
                }
                Ok(Err(err)) => {
                    self.history.remove(&user_row_id).await?;
                    return Err(err.into());
                }
                Ok(Ok(text)) => text,
            }
        };
        let tail = unmasker.finish(pipeline.tokenizer());
        if !tail.is_empty() {
            on_fragment(&tail);
        }

        self.finish_turn(&mut pipeline, session_id, mask_result, masked_response)
            .await
    }

    /// Save the user's {name, college, email} extracted from a session (with
    /// optional explicit overrides) into the persistent profile. Consent is
    /// checked first.
    pub async fn remember_me(
        &self,
        user_id: &str,
        session_id: &str,
        overrides: Option<UserProfile>,
        ip: Option<&str>,
    ) -> Result<UserProfile, ChatError> {
        let consent = self.profiles.get_consent(user_id).await?;
        if !consent.any() {
            return Err(VaultError::ConsentMissing.into());
        }

        let pipeline = self.session_pipeline(session_id);
        let mut pipeline = pipeline.lock().await;
        if let Some(mappings) = self.vault.get(session_id).await? {
            pipeline.load_session_mappings(mappings);
        }

        let mut profile = session_mappings_to_profile(pipeline.mappings());
        if let Some(overrides) = overrides {
            let overrides = overrides.normalize();
            if overrides.name.is_some() {
                profile.name = overrides.name;
            }
            if overrides.college.is_some() {
                profile.college = overrides.college;
            }
            if overrides.email.is_some() {
                profile.email = overrides.email;
            }
        }

        self.profiles
            .store_profile(user_id, &profile, consent)
            .await?;
        self.audit.log_profile_save(user_id, ip);
        Ok(profile.normalize())
    }

    /// Forget me: delete the persistent profile and clear every ephemeral
    /// vault entry (and in-memory pipeline) owned by the user.
    pub async fn forget_me(&self, user_id: &str, ip: Option<&str>) -> Result<ForgetOutcome, ChatError> {
        let profile_deleted = self.profiles.delete_profile(user_id).await?;

        let mut sessions_cleared = 0;
        for session_id in self.history.sessions_for(user_id).await? {
            if self.vault.delete(&session_id).await? {
                sessions_cleared += 1;
            }
            let mut registry = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            registry.remove(&session_id);
        }

        self.audit.log_profile_delete(user_id, ip);
        info!(sessions = sessions_cleared, "forget-me completed");
        Ok(ForgetOutcome {
            profile_deleted,
            sessions_cleared,
        })
    }

    /// Message-level transparency: the original and masked prompt of one
    /// exchange, the tokens involved, and both forms of the reply. Ephemeral
    /// mappings first; recreated from the profile when the vault is empty.
    pub async fn masked_exchange(
        &self,
        session_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<MaskedExchange, ChatError> {
        let pipeline = self.session_pipeline(session_id);
        let mut pipeline = pipeline.lock().await;

        self.load_or_recreate(&mut pipeline, session_id, user_id, None)
            .await?;

        let anchor = self
            .history
            .find(message_id)
            .await?
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;

        // Resolve the user/assistant pair around the anchor message
        let messages = self.history.recent(session_id, 100).await?;
        let idx = messages.iter().position(|m| m.id == anchor.id);
        let (user_msg, assistant_msg) = match idx {
            Some(i) if messages[i].role == "assistant" => {
                let prev = i
                    .checked_sub(1)
                    .map(|p| &messages[p])
                    .filter(|m| m.role == "user");
                (prev.cloned(), Some(messages[i].clone()))
            }
            Some(i) => {
                let next = messages.get(i + 1).filter(|m| m.role == "assistant");
                (Some(messages[i].clone()), next.cloned())
            }
            None => (None, None),
        };

        let mut token_names: Vec<String> = user_msg
            .iter()
            .chain(assistant_msg.iter())
            .flat_map(|m| m.tokens_used.iter().cloned())
            .collect();
        token_names.sort();
        token_names.dedup();

        let mappings = pipeline.mappings();
        let tokens = token_names
            .into_iter()
            .map(|token| match mappings.get(&token) {
                Some(mapping) => TokenInfo {
                    token,
                    entity_type: mapping.entity_type,
                    display: "●".repeat(mapping.original.chars().count().min(10)),
                    original_value: Some(mapping.original.clone()),
                },
                None => TokenInfo {
                    token,
                    entity_type: EntityType::Other,
                    display: "●●●●●".to_string(),
                    original_value: None,
                },
            })
            .collect();

        let masked_message = user_msg
            .as_ref()
            .map(|m| m.masked_content.clone())
            .unwrap_or_default();
        let original_message = if masked_message.is_empty() {
            String::new()
        } else {
            pipeline.unmask(&masked_message).unmasked_text
        };

        let ai_masked_response = assistant_msg
            .as_ref()
            .map(|m| m.masked_content.clone())
            .unwrap_or_default();
        let ai_unmasked_response = if ai_masked_response.is_empty() {
            String::new()
        } else {
            pipeline.unmask(&ai_masked_response).unmasked_text
        };

        Ok(MaskedExchange {
            original_message,
            masked_message,
            tokens,
            ai_masked_response,
            ai_unmasked_response,
            ttl_remaining: self.vault.get_ttl(session_id).await?,
        })
    }

    // ---- internals ----

    fn session_pipeline(&self, session_id: &str) -> Arc<tokio::sync::Mutex<MaskingPipeline>> {
        let mut registry = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(MaskingPipeline::new(
                    session_id,
                    self.engines.clone(),
                )))
            })
            .clone()
    }

    fn refusal_turn(&self, session_id: &str) -> ChatTurn {
        let reply = self.shield.blocked_response().to_string();
        ChatTurn {
            session_id: session_id.to_string(),
            masked_reply: reply.clone(),
            masked_prompt: String::new(),
            reply,
            tokens_used: Vec::new(),
            entities_detected: 0,
            leaks_repaired: 0,
            token_count: 0,
            ttl_remaining: -2,
            refused: true,
        }
    }

    async fn load_or_recreate(
        &self,
        pipeline: &mut MaskingPipeline,
        session_id: &str,
        user_id: &str,
        ip: Option<&str>,
    ) -> Result<(), ChatError> {
        if let Some(mappings) = self.vault.get(session_id).await? {
            self.audit.log_retrieve(session_id, mappings.len(), ip);
            pipeline.load_session_mappings(mappings);
            return Ok(());
        }

        let consent = self.profiles.get_consent(user_id).await?;
        if !consent.any() {
            return Ok(());
        }
        let Some(profile) = self.profiles.get_profile(user_id).await? else {
            return Ok(());
        };
        let recreated = profile_to_session_mappings(&profile);
        if recreated.is_empty() {
            return Ok(());
        }
        info!(tokens = recreated.len(), "recreated session from profile");
        pipeline.load_session_mappings(recreated);
        self.vault
            .store(session_id, &pipeline.export_session_mappings())
            .await?;
        Ok(())
    }

    // The shared tail of a turn: prompt shield, LLM call with deadline and
    // rollback, leak check, unmask, history append.
    async fn run_turn(
        &self,
        pipeline: &mut MaskingPipeline,
        session_id: &str,
        message: &str,
        ip: Option<&str>,
    ) -> Result<ChatTurn, ChatError> {
        let mask_result = pipeline.mask(message);
        self.vault
            .store(session_id, &pipeline.export_session_mappings())
            .await?;
        self.audit.log_store(session_id, pipeline.token_count(), ip);

        let history_messages: Vec<ChatMessage> = self
            .history
            .recent(session_id, HISTORY_WINDOW)
            .await?
            .iter()
            .map(|m| ChatMessage {
                role: m.role.clone(),
                content: m.masked_content.clone(),
            })
            .collect();

        let (sanitized_input, _) = self.shield.sanitize_input(&mask_result.masked_text);
        let messages = self
            .shield
            .build_conversation(&history_messages, &sanitized_input);

        let user_row = StoredMessage::new(
            session_id,
            "user",
            &mask_result.masked_text,
            mask_result.tokens.keys().cloned().collect(),
        );
        let user_row_id = user_row.id.clone();
        self.history.append(user_row).await?;

        let llm_result = tokio::time::timeout(
            self.llm_timeout,
            self.llm.complete(&messages, LLM_TEMPERATURE, LLM_MAX_TOKENS),
        )
        .await;

        let masked_response = match llm_result {
            Err(_) => {
                // No history survives an aborted LLM call
                self.history.remove(&user_row_id).await?;
                return Err(LlmError::Timeout.into());
            }
            Ok(Err(err)) => {
                self.history.remove(&user_row_id).await?;
                return Err(err.into());
            }
            Ok(Ok(text)) => text,
        };

        self.finish_turn(pipeline, session_id, mask_result, masked_response)
            .await
    }

    async fn finish_turn(
        &self,
        pipeline: &mut MaskingPipeline,
        session_id: &str,
        mask_result: crate::masking::pipeline::MaskingResult,
        masked_response: String,
    ) -> Result<ChatTurn, ChatError> {
        // Leak check is non-fatal: rewrite and continue
        let outcome = self
            .validator
            .sanitize(&masked_response, pipeline.mappings());
        if !outcome.leaks.is_empty() {
            warn!(leaks = outcome.leaks.len(), "response rewritten after leak check");
        }
        let masked_reply = outcome.sanitized;

        // Unmasking is total; it cannot fail
        let reply = pipeline.unmask(&masked_reply).unmasked_text;

        self.history
            .append(StoredMessage::new(
                session_id,
                "assistant",
                &masked_reply,
                mask_result.tokens.keys().cloned().collect(),
            ))
            .await?;

        let ttl_remaining = self.vault.get_ttl(session_id).await?;
        Ok(ChatTurn {
            session_id: session_id.to_string(),
            reply,
            masked_reply,
            masked_prompt: mask_result.masked_text,
            tokens_used: mask_result.tokens.keys().cloned().collect(),
            entities_detected: mask_result.entities_detected,
            leaks_repaired: outcome.leaks.len(),
            token_count: pipeline.token_count(),
            ttl_remaining,
            refused: false,
        })
    }
}
