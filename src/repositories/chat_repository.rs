use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;
use crate::models::chat::Chat;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence boundary for chats. The storage format is the
/// implementation's business; the core hands over whole `Chat` values.
pub trait ChatRepository: Send + Sync + 'static {
    /// Load every stored chat, most recently updated first.
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>>;

    /// Save (insert or replace) a chat.
    fn save(&self, chat: Chat) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Delete a chat. Deleting an unknown id is not an error.
    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>>;
}
