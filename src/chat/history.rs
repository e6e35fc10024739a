// Chat history collaborator
// Only masked content ever crosses this boundary; the real store is
// external (document database), this trait is its contract

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub role: String, // "user" | "assistant"
    pub masked_content: String,
    pub tokens_used: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(
        session_id: &str,
        role: &str,
        masked_content: &str,
        tokens_used: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: role.to_string(),
            masked_content: masked_content.to_string(),
            tokens_used,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record which user owns a session.
    async fn bind_session(&self, session_id: &str, user_id: &str) -> Result<(), StoreError>;
    /// All sessions bound to a user.
    async fn sessions_for(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
    async fn append(&self, message: StoredMessage) -> Result<(), StoreError>;
    /// Remove one message by id (turn rollback).
    async fn remove(&self, message_id: &str) -> Result<bool, StoreError>;
    async fn find(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError>;
    /// The last `limit` messages of a session, oldest first.
    async fn recent(&self, session_id: &str, limit: usize)
        -> Result<Vec<StoredMessage>, StoreError>;
}

#[derive(Default)]
struct HistoryInner {
    messages: Vec<StoredMessage>,
    session_owner: HashMap<String, String>,
}

/// In-memory history store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<HistoryInner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HistoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError("history store lock poisoned".into()))
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn bind_session(&self, session_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner
            .session_owner
            .insert(session_id.to_string(), user_id.to_string());
        Ok(())
    }

    async fn sessions_for(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock()?;
        let mut sessions: Vec<String> = inner
            .session_owner
            .iter()
            .filter(|(_, owner)| owner.as_str() == user_id)
            .map(|(session, _)| session.clone())
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    async fn append(&self, message: StoredMessage) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.messages.push(message);
        Ok(())
    }

    async fn remove(&self, message_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.messages.len();
        inner.messages.retain(|m| m.id != message_id);
        Ok(inner.messages.len() < before)
    }

    async fn find(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.lock()?;
        let matching: Vec<StoredMessage> = inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching[skip..].to_vec())
    }
}
