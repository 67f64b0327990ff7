use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::chat_repository::{BoxFuture, ChatRepository};
use super::error::RepositoryResult;
use crate::models::chat::Chat;

/// In-memory repository for chats.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryChatRepository {
    chats: Arc<Mutex<HashMap<String, Chat>>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.chats.lock().len()
    }

    pub fn get(&self, id: &str) -> Option<Chat> {
        self.chats.lock().get(id).cloned()
    }
}

impl ChatRepository for InMemoryChatRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>> {
        let chats = self.chats.clone();

        Box::pin(async move {
            let mut result: Vec<Chat> = chats.lock().values().cloned().collect();
            result.sort_by_key(|chat| std::cmp::Reverse(chat.updated_at));
            Ok(result)
        })
    }

    fn save(&self, chat: Chat) -> BoxFuture<'static, RepositoryResult<()>> {
        let chats = self.chats.clone();

        Box::pin(async move {
            chats.lock().insert(chat.id.clone(), chat);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let chats = self.chats.clone();
        let id = id.to_string();

        Box::pin(async move {
            chats.lock().remove(&id);
            Ok(())
        })
    }
}
