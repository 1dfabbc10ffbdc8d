//! Conversation history kept on the client.
//!
//! The backend is stateless per message; the client keeps the list of
//! conversations. A fresh conversation stays a draft until its first message
//! is sent, at which point it moves to the front of the history and takes its
//! title from that message.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClientError;

/// Longest title kept verbatim; longer first messages are cut and suffixed.
pub const TITLE_MAX_CHARS: usize = 30;

const DRAFT_TITLE: &str = "New chat";
const PROCESSING_APOLOGY: &str = "Sorry, there was an error processing your request.";
const CONNECTION_APOLOGY: &str = "Sorry, there was an error connecting to the service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One chat message as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    fn draft() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DRAFT_TITLE.to_string(),
            messages: Vec::new(),
        }
    }
}

/// Title for a conversation started with `text`.
#[must_use]
pub fn derive_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() > TITLE_MAX_CHARS {
        let cut: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Conversation list, newest first, plus the unsent draft.
#[derive(Debug, Default)]
pub struct ChatLog {
    history: Vec<Conversation>,
    draft: Option<Conversation>,
    active: Option<Uuid>,
}

impl ChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh draft and makes it active. An existing empty draft is
    /// reused.
    pub fn start_conversation(&mut self) -> Uuid {
        let draft = self.draft.get_or_insert_with(Conversation::draft);
        self.active = Some(draft.id);
        draft.id
    }

    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.history
    }

    #[must_use]
    pub fn active(&self) -> Option<&Conversation> {
        let id = self.active?;
        match &self.draft {
            Some(draft) if draft.id == id => Some(draft),
            _ => self.history.iter().find(|c| c.id == id),
        }
    }

    /// Makes a conversation from history active. Returns `false` for an
    /// unknown id.
    pub fn select(&mut self, id: Uuid) -> bool {
        if self.history.iter().any(|c| c.id == id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn rename(&mut self, id: Uuid, title: impl Into<String>) -> bool {
        match self.history.iter_mut().find(|c| c.id == id) {
            Some(conv) => {
                conv.title = title.into();
                true
            }
            None => false,
        }
    }

    /// Removes a conversation. Deleting the active one leaves nothing active.
    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.history.len();
        self.history.retain(|c| c.id != id);
        if self.active == Some(id) {
            self.active = None;
        }
        self.history.len() != before
    }

    /// Records an outgoing message in the active conversation, promoting the
    /// draft into history if needed. Starts a draft when nothing is active.
    pub fn push_user_message(&mut self, text: &str) -> ChatMessage {
        let message = ChatMessage::user(text);
        let active = match self.active {
            Some(id) => id,
            None => self.start_conversation(),
        };

        match self.draft.take() {
            Some(mut draft) if draft.id == active => {
                draft.title = derive_title(text);
                draft.messages.push(message.clone());
                self.history.insert(0, draft);
            }
            other => {
                self.draft = other;
                if let Some(conv) = self.history.iter_mut().find(|c| c.id == active) {
                    conv.messages.push(message.clone());
                }
            }
        }
        message
    }

    /// Records the backend's answer, or an apology when the request failed.
    pub fn push_reply(&mut self, reply: Result<ChatMessage, &ClientError>) -> ChatMessage {
        let message = match reply {
            Ok(message) => message,
            Err(ClientError::Network { .. }) => ChatMessage::assistant(CONNECTION_APOLOGY),
            Err(_) => ChatMessage::assistant(PROCESSING_APOLOGY),
        };
        if let Some(id) = self.active
            && let Some(conv) = self.history.iter_mut().find(|c| c.id == id)
        {
            conv.messages.push(message.clone());
        }
        message
    }
}
