pub mod cancellation;
pub mod chat;
pub mod chat_store;
pub mod operation_state;

pub use cancellation::{CancelCheck, CancellationToken};
pub use chat::{Chat, ChatId, Message, MessageId, Role, DEFAULT_CHAT_TITLE};
pub use chat_store::ChatStore;
pub use operation_state::{
    ChatOperationState, StreamingState, ThinkingState, TitleGenerationState,
};
