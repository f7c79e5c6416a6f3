//! Conversation sessions between users and the healthcare assistant.
//!
//! One active session per user. Each exchange stores the user's question and
//! the assistant's answer; when the model call fails a fixed apology is
//! stored in place of the answer.

use crate::assistant::context::UserContext;
use crate::assistant::prompt::{healthcare_prompt, serialize_context};
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{ChatMessage, ChatSession, ChatUser, SessionId};
use crate::store::ChatStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const FALLBACK_REPLY: &str =
    "I'm having trouble processing your request right now. Please try again in a few moments.";

#[derive(Debug, Clone, Serialize)]
pub struct ConversationHistory {
    /// `None` when the user has no active session
    pub session_id: Option<SessionId>,
    pub user: ChatUser,
    pub messages: Vec<ChatMessage>,
}

/// A stored question and its rendered prompt, waiting for the model's answer
#[derive(Debug, Clone)]
pub struct PendingExchange {
    pub session_id: SessionId,
    pub prompt: String,
    pub question: ChatMessage,
    asked_at: DateTime<Utc>,
}

/// Session bookkeeping around the external language model
#[derive(Clone)]
pub struct ChatSessions {
    store: Arc<dyn ChatStore>,
    clock: Arc<dyn Clock>,
}

impl ChatSessions {
    pub fn new(store: Arc<dyn ChatStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The user's active session, opening one with a snapshot of `context`
    /// if there is none
    pub async fn session_for(&self, user: &ChatUser, context: &UserContext) -> Result<ChatSession> {
        if let Some(session) = self.store.active_session(user).await? {
            return Ok(session);
        }

        let session = ChatSession::open(user.clone(), serialize_context(context)?, self.clock.now());
        self.store.create_session(&session).await?;
        info!(%user, session_id = %session.session_id, "Opened chat session");
        Ok(session)
    }

    /// Store the user's message and render the prompt to send to the model
    pub async fn ask(
        &self,
        user: &ChatUser,
        context: &UserContext,
        message: &str,
    ) -> Result<PendingExchange> {
        let session = self.session_for(user, context).await?;
        let asked_at = self.clock.now();

        let question = self
            .store
            .append_message(&ChatMessage::user(session.session_id, message, asked_at))
            .await?;
        debug!(%user, index = question.message_index, "Stored user message");

        Ok(PendingExchange {
            session_id: session.session_id,
            prompt: healthcare_prompt(context, message),
            question,
            asked_at,
        })
    }

    /// Store the model's reply to `pending`, or [`FALLBACK_REPLY`] when the
    /// model produced none
    pub async fn answer(&self, pending: &PendingExchange, reply: Option<&str>) -> Result<ChatMessage> {
        let now = self.clock.now();

        let Some(reply) = reply else {
            warn!(session_id = %pending.session_id, "No assistant reply, storing fallback");
            let fallback = ChatMessage::assistant(pending.session_id, FALLBACK_REPLY, now);
            return Ok(self.store.append_message(&fallback).await?);
        };

        let mut message = ChatMessage::assistant(pending.session_id, reply, now);
        message.response_time = (now - pending.asked_at).num_milliseconds().max(0) as u64;
        // Rough estimate, four characters per token
        message.tokens_used = (reply.len() / 4) as u32;

        let stored = self.store.append_message(&message).await?;
        self.store.touch_session(pending.session_id, now).await?;
        Ok(stored)
    }

    /// Messages of the user's active session in order, at most `limit`
    pub async fn history(&self, user: &ChatUser, limit: Option<usize>) -> Result<ConversationHistory> {
        let Some(session) = self.store.active_session(user).await? else {
            return Ok(ConversationHistory {
                session_id: None,
                user: user.clone(),
                messages: Vec::new(),
            });
        };

        let messages = self.store.messages(session.session_id, limit).await?;
        Ok(ConversationHistory {
            session_id: Some(session.session_id),
            user: user.clone(),
            messages,
        })
    }

    /// Delete all of the user's sessions and messages. Returns how many
    /// messages were removed.
    pub async fn clear(&self, user: &ChatUser) -> Result<usize> {
        let removed = self.store.clear_user(user).await?;
        info!(%user, messages = removed, "Cleared conversation");
        Ok(removed)
    }
}
