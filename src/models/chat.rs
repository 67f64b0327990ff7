use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GenerationParams;

/// Title given to a chat until auto-titling replaces it.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

pub type ChatId = String;
pub type MessageId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat.
///
/// Assistant messages store the batch-extracted final answer in `content`
/// and the extracted reasoning separately in `thinking`; the raw markup is
/// never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl Message {
    pub fn user(content: String, attachments: Vec<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content,
            timestamp: Utc::now(),
            attachments,
            thinking: None,
        }
    }

    pub fn assistant(content: String, thinking: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content,
            timestamp: Utc::now(),
            attachments: Vec::new(),
            thinking,
        }
    }
}

/// A conversation with the model.
///
/// `context` is the opaque conversation-memory token list returned by the
/// server after each response; it is passed back verbatim on the next send.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    /// Per-chat override of the global generation parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_override: Option<GenerationParams>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(model: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_CHAT_TITLE.to_string(),
            model,
            messages: Vec::new(),
            context: None,
            params_override: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.updated_at = Utc::now();
    }

    pub fn set_context(&mut self, context: Option<Vec<i64>>) {
        if context.is_some() {
            self.context = context;
            self.updated_at = Utc::now();
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CHAT_TITLE
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// First user message, used to seed title generation.
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }

    /// Most recent assistant message.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chat_has_default_title() {
        let chat = Chat::new("llama3.2".into());
        assert!(chat.has_default_title());
        assert!(chat.messages.is_empty());
        assert!(chat.context.is_none());
    }

    #[test]
    fn test_push_message_touches_updated_at() {
        let mut chat = Chat::new("llama3.2".into());
        let before = chat.updated_at;
        chat.push_message(Message::user("hi".into(), Vec::new()));
        assert!(chat.updated_at >= before);
        assert_eq!(chat.message_count(), 1);
    }

    #[test]
    fn test_first_and_last_message_lookup() {
        let mut chat = Chat::new("llama3.2".into());
        chat.push_message(Message::user("question".into(), Vec::new()));
        chat.push_message(Message::assistant("first answer".into(), None));
        chat.push_message(Message::user("follow-up".into(), Vec::new()));
        chat.push_message(Message::assistant("second answer".into(), Some("hm".into())));

        assert_eq!(chat.first_user_message().unwrap().content, "question");
        assert_eq!(chat.last_assistant_message().unwrap().content, "second answer");
    }

    #[test]
    fn test_set_context_ignores_none() {
        let mut chat = Chat::new("llama3.2".into());
        chat.set_context(Some(vec![1, 2, 3]));
        chat.set_context(None);
        assert_eq!(chat.context, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_message_roundtrip_through_json() {
        let message = Message::assistant("answer".into(), Some("reasoning".into()));
        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "answer");
        assert_eq!(back.thinking.as_deref(), Some("reasoning"));
        assert_eq!(back.role, Role::Assistant);
    }
}
