use std::collections::HashMap;

use super::chat::{Chat, ChatId};

/// In-memory collection of chats plus the active-chat pointer.
///
/// The active chat is what the UI observes; it is unrelated to which chat
/// (if any) is generating.
#[derive(Default)]
pub struct ChatStore {
    chats: HashMap<ChatId, Chat>,
    active_chat_id: Option<ChatId>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chat; the first chat added becomes active.
    pub fn add(&mut self, chat: Chat) {
        let id = chat.id.clone();
        self.chats.insert(id.clone(), chat);
        if self.active_chat_id.is_none() {
            self.active_chat_id = Some(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Chat> {
        self.chats.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Chat> {
        self.chats.get_mut(id)
    }

    /// Remove a chat. If it was active, another chat (if any) takes over.
    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.chats.remove(id).is_some();
        if self.active_chat_id.as_deref() == Some(id) {
            self.active_chat_id = self
                .list()
                .first()
                .map(|chat| chat.id.clone());
        }
        removed
    }

    pub fn set_active(&mut self, id: &str) -> bool {
        if self.chats.contains_key(id) {
            self.active_chat_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_id(&self) -> Option<&ChatId> {
        self.active_chat_id.as_ref()
    }

    pub fn active(&self) -> Option<&Chat> {
        self.active_chat_id.as_deref().and_then(|id| self.chats.get(id))
    }

    /// All chats, most recently updated first.
    pub fn list(&self) -> Vec<&Chat> {
        let mut chats: Vec<&Chat> = self.chats.values().collect();
        chats.sort_by_key(|chat| std::cmp::Reverse(chat.updated_at));
        chats
    }

    pub fn count(&self) -> usize {
        self.chats.len()
    }
}
