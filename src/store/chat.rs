use crate::error::{StoreError, StoreResult};
use crate::models::{ChatMessage, ChatSession, ChatUser, SessionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence layer for assistant conversations
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The user's most recently used active session
    async fn active_session(&self, user: &ChatUser) -> StoreResult<Option<ChatSession>>;

    async fn create_session(&self, session: &ChatSession) -> StoreResult<()>;

    async fn touch_session(&self, session_id: SessionId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Append to the message's session, returning it with its assigned
    /// `message_index`
    async fn append_message(&self, message: &ChatMessage) -> StoreResult<ChatMessage>;

    /// Messages of a session in index order, at most `limit` of them
    async fn messages(
        &self,
        session_id: SessionId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<ChatMessage>>;

    /// Delete every session of `user` and their messages, returning how many
    /// messages were removed
    async fn clear_user(&self, user: &ChatUser) -> StoreResult<usize>;
}

#[derive(Debug, Default)]
struct Conversations {
    sessions: Vec<ChatSession>,
    messages: HashMap<SessionId, Vec<ChatMessage>>,
}

/// Process-local conversation store
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    conversations: RwLock<Conversations>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.conversations.read().await.sessions.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn active_session(&self, user: &ChatUser) -> StoreResult<Option<ChatSession>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .sessions
            .iter()
            .filter(|s| s.is_active && &s.user == user)
            .max_by_key(|s| s.last_used_at)
            .cloned())
    }

    async fn create_session(&self, session: &ChatSession) -> StoreResult<()> {
        let mut conversations = self.conversations.write().await;
        conversations.sessions.push(session.clone());
        conversations.messages.entry(session.session_id).or_default();
        Ok(())
    }

    async fn touch_session(&self, session_id: SessionId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut conversations = self.conversations.write().await;
        let session = conversations
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        session.last_used_at = at;
        Ok(())
    }

    async fn append_message(&self, message: &ChatMessage) -> StoreResult<ChatMessage> {
        let mut conversations = self.conversations.write().await;
        let messages = conversations
            .messages
            .get_mut(&message.session_id)
            .ok_or(StoreError::SessionNotFound(message.session_id))?;

        let mut stored = message.clone();
        stored.message_index = messages.len() as u32 + 1;
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn messages(
        &self,
        session_id: SessionId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<ChatMessage>> {
        let conversations = self.conversations.read().await;
        let messages = conversations
            .messages
            .get(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        let take = limit.unwrap_or(messages.len());
        Ok(messages.iter().take(take).cloned().collect())
    }

    async fn clear_user(&self, user: &ChatUser) -> StoreResult<usize> {
        let mut conversations = self.conversations.write().await;
        let Conversations { sessions, messages } = &mut *conversations;

        let mut removed = 0;
        sessions.retain(|session| {
            if &session.user != user {
                return true;
            }
            removed += messages
                .remove(&session.session_id)
                .map_or(0, |m| m.len());
            false
        });
        Ok(removed)
    }
}
