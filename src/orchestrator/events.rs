use crate::error::ErrorReport;
use crate::models::chat::ChatId;
use crate::services::files::FileProgress;

/// Change notifications emitted by the orchestrator.
///
/// Each variant that concerns a chat is tagged with its id so subscribers
/// can filter; payloads stay small; subscribers read the current
/// operation-state snapshot for the full picture.
#[derive(Clone, Debug)]
pub enum ChatEvent {
    /// A chat was created, deleted, renamed, or (re)loaded.
    ChatListChanged,
    ActiveChatChanged {
        chat_id: Option<ChatId>,
        /// Set when switching into a chat that already has messages.
        scroll_to_bottom: bool,
    },
    SendStarted {
        chat_id: ChatId,
    },
    FileProgressUpdated {
        chat_id: ChatId,
        progress: FileProgress,
    },
    /// A message (user or assistant) was appended and persisted.
    MessageAppended {
        chat_id: ChatId,
    },
    GenerationStarted {
        chat_id: ChatId,
    },
    /// New streamed content folded into the operation state.
    StreamUpdated {
        chat_id: ChatId,
    },
    GenerationCompleted {
        chat_id: ChatId,
    },
    GenerationCancelled {
        chat_id: ChatId,
    },
    GenerationFailed {
        chat_id: ChatId,
        report: ErrorReport,
    },
    /// A transient failure will be retried shortly.
    RetryScheduled {
        operation: String,
        attempt: u32,
    },
    TitleGenerationStarted {
        chat_id: ChatId,
    },
    TitleUpdated {
        chat_id: ChatId,
        title: String,
    },
}
