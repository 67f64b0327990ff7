pub mod chat_repository;
pub mod error;
pub mod in_memory;
pub mod json_repository;

pub use chat_repository::{BoxFuture, ChatRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use in_memory::InMemoryChatRepository;
pub use json_repository::JsonChatRepository;
