//! Generation orchestration core for a local-LLM chat client.
//!
//! `banter` sits between a UI and the network/storage layers: it drives
//! the request/stream/cancel lifecycle per chat, separates model
//! "thinking" markup from the answer while the response is still
//! arriving, and keeps one aggregate operation state consistent across
//! overlapping sends, file processing, and title generation.
//!
//! The entry point is [`orchestrator::ChatOrchestrator`]; UIs subscribe
//! to its event channel and read state snapshots on each notification.

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod repositories;
pub mod services;

pub use config::{GenerationParams, Settings, SettingsProvider, StaticSettings};
pub use error::{ChatError, ChatResult, ErrorKind, ErrorReport, RetryPolicy};
pub use models::{CancellationToken, Chat, ChatId, ChatOperationState, Message, Role};
pub use orchestrator::{ChatEvent, ChatOrchestrator};
pub use repositories::{ChatRepository, InMemoryChatRepository, JsonChatRepository};
pub use services::{GenerationService, OllamaClient, PlainTextProcessor};
