//! Conversation types and transcript management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display format for message timestamps
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Wall-clock time of creation, for display only
    pub fn display_time(&self) -> String {
        self.timestamp.format(TIME_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Ordered, append-only record of one session's exchanges.
///
/// Messages can only be pushed or cleared all at once. User and assistant
/// turns alternate; the session is responsible for pushing them in pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, content: &str) -> &Message {
        self.push(Message::user(content))
    }

    pub fn add_assistant(&mut self, content: &str) -> &Message {
        self.push(Message::assistant(content))
    }

    fn push(&mut self, message: Message) -> &Message {
        debug_assert!(
            self.messages.last().map(|m| m.role) != Some(message.role),
            "transcript roles must alternate"
        );
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Remove every message, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let count = self.messages.len();
        self.messages.clear();
        count
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
