use crate::models::PatientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Who is talking to the assistant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChatUser {
    Patient(PatientId),
    /// Household admin, by username
    Caregiver(String),
}

impl ChatUser {
    pub fn session_type(&self) -> &'static str {
        match self {
            ChatUser::Patient(_) => "patient",
            ChatUser::Caregiver(_) => "caregiver",
        }
    }
}

impl fmt::Display for ChatUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatUser::Patient(id) => write!(f, "patient:{}", id),
            ChatUser::Caregiver(name) => write!(f, "caregiver:{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A conversation between one user and the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: SessionId,
    pub user: ChatUser,
    pub session_type: String,
    /// JSON snapshot of the user's context when the session was opened
    pub context_data: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn open(user: ChatUser, context_data: String, at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            session_type: user.session_type().to_string(),
            user,
            context_data,
            is_active: true,
            created_at: at,
            last_used_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: SessionId,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub tokens_used: u32,
    /// Milliseconds
    #[serde(default)]
    pub response_time: u64,
    /// 1-based position in the session, assigned by the store
    #[serde(default)]
    pub message_index: u32,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(session_id: SessionId, content: &str, at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            role: ChatRole::User,
            content: content.to_string(),
            tokens_used: 0,
            response_time: 0,
            message_index: 0,
            timestamp: at,
        }
    }

    pub fn assistant(session_id: SessionId, content: &str, at: DateTime<Utc>) -> Self {
        Self {
            role: ChatRole::Assistant,
            ..Self::user(session_id, content, at)
        }
    }

    pub fn is_user_message(&self) -> bool {
        self.role == ChatRole::User
    }

    pub fn is_assistant_message(&self) -> bool {
        self.role == ChatRole::Assistant
    }
}
