//! The coordinator between the UI, the model server, and storage.
//!
//! One `ChatOrchestrator` drives the whole send/stream/cancel lifecycle
//! over a single [`ChatOperationState`]. At most one chat generates at a
//! time; which one is tracked by the state's `current_generating_chat`,
//! independent of the chat the UI is looking at.

pub mod events;

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SettingsProvider;
use crate::error::{self, ChatError, ChatResult, ErrorReport, RetryPolicy};
use crate::models::cancellation::CancellationToken;
use crate::models::chat::{Chat, ChatId, Message, MessageId};
use crate::models::chat_store::ChatStore;
use crate::models::operation_state::ChatOperationState;
use crate::repositories::ChatRepository;
use crate::services::files::{FileContentProcessor, ProcessedFile, ProgressCallback};
use crate::services::generation::{GenerationRequest, GenerationService};
use crate::services::thinking::{extract_thinking_content, filter_streaming_content};
use crate::services::title::generate_chat_title;

pub use events::ChatEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Inner {
    store: Mutex<ChatStore>,
    state: Mutex<ChatOperationState>,
    /// Token for the in-flight operation. Replaced (never reset) on cancel.
    cancel: Mutex<CancellationToken>,
    last_error: Mutex<Option<ErrorReport>>,
    events: broadcast::Sender<ChatEvent>,
    repository: Arc<dyn ChatRepository>,
    generation: Arc<dyn GenerationService>,
    files: Arc<dyn FileContentProcessor>,
    settings: Arc<dyn SettingsProvider>,
    retry: RetryPolicy,
}

/// Cheaply cloneable handle; clones share all state.
#[derive(Clone)]
pub struct ChatOrchestrator {
    inner: Arc<Inner>,
}

impl ChatOrchestrator {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        generation: Arc<dyn GenerationService>,
        files: Arc<dyn FileContentProcessor>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self::with_retry_policy(repository, generation, files, settings, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        repository: Arc<dyn ChatRepository>,
        generation: Arc<dyn GenerationService>,
        files: Arc<dyn FileContentProcessor>,
        settings: Arc<dyn SettingsProvider>,
        retry: RetryPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(ChatStore::new()),
                state: Mutex::new(ChatOperationState::new()),
                cancel: Mutex::new(CancellationToken::new()),
                last_error: Mutex::new(None),
                events,
                repository,
                generation,
                files,
                settings,
                retry,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: ChatEvent) {
        // A send only fails when nobody is subscribed, which is fine.
        let _ = self.inner.events.send(event);
    }

    /// Snapshot of the aggregate operation state.
    pub fn operation_state(&self) -> ChatOperationState {
        self.inner.state.lock().clone()
    }

    pub fn last_error(&self) -> Option<ErrorReport> {
        self.inner.last_error.lock().clone()
    }

    /// Whether this specific chat has the in-flight generation.
    pub fn is_generating_for(&self, chat_id: &str) -> bool {
        self.inner.state.lock().current_generating_chat.as_deref() == Some(chat_id)
    }

    pub fn active_chat(&self) -> Option<Chat> {
        self.inner.store.lock().active().cloned()
    }

    pub fn chat(&self, id: &str) -> Option<Chat> {
        self.inner.store.lock().get(id).cloned()
    }

    /// All chats, most recently updated first.
    pub fn list_chats(&self) -> Vec<Chat> {
        self.inner.store.lock().list().into_iter().cloned().collect()
    }

    /// Populate the store from the repository. Called once at startup.
    pub async fn load_chats(&self) -> ChatResult<()> {
        let chats = self.inner.repository.load_all().await.map_err(ChatError::from)?;
        info!(count = chats.len(), "chats loaded");

        {
            let mut store = self.inner.store.lock();
            // load_all is sorted most-recent-first, so the first add
            // becomes the active chat.
            for chat in chats {
                store.add(chat);
            }
        }
        self.emit(ChatEvent::ChatListChanged);
        Ok(())
    }

    pub async fn create_chat(&self, model: &str) -> ChatResult<ChatId> {
        let chat = Chat::new(model.to_string());
        let id = chat.id.clone();

        self.inner
            .repository
            .save(chat.clone())
            .await
            .map_err(ChatError::from)?;

        {
            let mut store = self.inner.store.lock();
            store.add(chat);
            store.set_active(&id);
        }
        debug!(chat_id = %id, model = model, "chat created");

        self.emit(ChatEvent::ChatListChanged);
        self.emit(ChatEvent::ActiveChatChanged {
            chat_id: Some(id.clone()),
            scroll_to_bottom: false,
        });
        Ok(id)
    }

    pub async fn rename_chat(&self, id: &str, title: &str) -> ChatResult<()> {
        let chat = {
            let mut store = self.inner.store.lock();
            let chat = store.get_mut(id).ok_or_else(|| ChatError::Validation {
                message: format!("unknown chat: {}", id),
            })?;
            chat.set_title(title.to_string());
            chat.clone()
        };

        self.inner.repository.save(chat).await.map_err(ChatError::from)?;
        self.emit(ChatEvent::ChatListChanged);
        Ok(())
    }

    /// Switch which chat the UI observes. Never touches an in-flight
    /// generation; that belongs to `current_generating_chat`.
    pub fn set_active_chat(&self, id: &str) -> ChatResult<()> {
        let scroll_to_bottom = {
            let mut store = self.inner.store.lock();
            if !store.set_active(id) {
                return Err(ChatError::Validation {
                    message: format!("unknown chat: {}", id),
                });
            }
            store.get(id).map(|chat| chat.message_count() > 0).unwrap_or(false)
        };

        self.emit(ChatEvent::ActiveChatChanged {
            chat_id: Some(id.to_string()),
            scroll_to_bottom,
        });
        Ok(())
    }

    /// Delete a chat. When it is the one generating, cancellation is
    /// forced first so no assistant message lands in a dead chat.
    pub async fn delete_chat(&self, id: &str) -> ChatResult<()> {
        let was_generating = self.is_generating_for(id);
        if was_generating {
            debug!(chat_id = %id, "deleting the generating chat, cancelling first");
            self.cancel_generation();
        }

        let (removed, new_active) = {
            let mut store = self.inner.store.lock();
            let removed = store.remove(id);
            (removed, store.active_id().cloned())
        };

        if !removed {
            return Ok(());
        }

        self.inner.repository.delete(id).await.map_err(ChatError::from)?;
        info!(chat_id = %id, "chat deleted");

        self.emit(ChatEvent::ChatListChanged);
        self.emit(ChatEvent::ActiveChatChanged {
            chat_id: new_active,
            scroll_to_bottom: false,
        });
        Ok(())
    }

    /// Cancel whatever is in flight and reset all generation, streaming,
    /// thinking, and file-processing sub-state immediately.
    ///
    /// The old token stays cancelled forever; a fresh one takes its place
    /// for the next operation. The stream loop observes the old token at
    /// its next suspension point and discards any further chunks.
    pub fn cancel_generation(&self) {
        let cancelled_chat = {
            let mut state = self.inner.state.lock();
            let cancelled_chat = state.current_generating_chat.clone();

            {
                let mut token = self.inner.cancel.lock();
                token.cancel();
                *token = CancellationToken::new();
            }

            *state = state.reset_generation();
            cancelled_chat
        };

        if let Some(chat_id) = cancelled_chat {
            debug!(chat_id = %chat_id, "generation cancelled");
            self.emit(ChatEvent::GenerationCancelled { chat_id });
        }
    }

    /// Flip the persisted expanded/collapsed preference for one message's
    /// thinking bubble.
    pub fn toggle_thinking_bubble(&self, message_id: MessageId) {
        let mut state = self.inner.state.lock();
        *state = state.toggle_expanded_bubble(message_id);
    }

    /// Send a user message on the active chat and drive the full
    /// response lifecycle.
    ///
    /// Rejects when no chat is active or another send is in flight.
    /// Cancellation mid-flight is not an error: state has already been
    /// reset and `Ok(())` is returned. Transport failures clear the
    /// generation state, leave the user message in place, and surface as
    /// both the returned error and a `GenerationFailed` event.
    pub async fn send_message(
        &self,
        content: &str,
        attached_files: Vec<PathBuf>,
    ) -> ChatResult<()> {
        let content = content.trim().to_string();
        if content.is_empty() && attached_files.is_empty() {
            return Err(ChatError::Validation {
                message: "message is empty".to_string(),
            });
        }

        // Claim the send slot and capture the originating chat plus the
        // token for this attempt.
        let (chat_id, token) = {
            let mut state = self.inner.state.lock();
            if state.is_sending_message {
                return Err(ChatError::State {
                    message: "a message is already being sent".to_string(),
                });
            }
            if state.is_generating {
                return Err(ChatError::State {
                    message: "a response is already being generated".to_string(),
                });
            }
            let chat_id = {
                let store = self.inner.store.lock();
                match store.active_id() {
                    Some(id) => id.clone(),
                    None => {
                        return Err(ChatError::State {
                            message: "no active chat".to_string(),
                        });
                    }
                }
            };
            *state = state.start_send();
            (chat_id, self.inner.cancel.lock().clone())
        };

        self.emit(ChatEvent::SendStarted {
            chat_id: chat_id.clone(),
        });

        let result = self
            .run_send(chat_id.clone(), content, attached_files, token.clone())
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(ChatError::Cancelled) => {
                // cancel_generation already reset everything; stay quiet.
                debug!(chat_id = %chat_id, "send ended by cancellation");
                Ok(())
            }
            Err(err) if token.is_cancelled() => {
                // The failure raced a cancellation; the cancel wins.
                debug!(chat_id = %chat_id, error = %err, "error after cancellation, discarded");
                Ok(())
            }
            Err(err) => {
                let report = error::report("send_message", &err);
                {
                    let mut state = self.inner.state.lock();
                    *state = state.reset_generation();
                }
                *self.inner.last_error.lock() = Some(report.clone());
                self.emit(ChatEvent::GenerationFailed {
                    chat_id,
                    report,
                });
                Err(err)
            }
        }
    }

    async fn run_send(
        &self,
        chat_id: ChatId,
        content: String,
        attached_files: Vec<PathBuf>,
        token: CancellationToken,
    ) -> ChatResult<()> {
        let settings = self.inner.settings.snapshot();

        // Phase 1: attachment processing.
        let processed = if attached_files.is_empty() {
            Vec::new()
        } else {
            self.process_attachments(&chat_id, attached_files.clone(), &token)
                .await?
        };

        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        // Phase 2: append and persist the user message.
        let (request, user_chat) = {
            let mut store = self.inner.store.lock();
            let chat = store.get_mut(&chat_id).ok_or_else(|| ChatError::State {
                message: "the sending chat no longer exists".to_string(),
            })?;
            chat.push_message(Message::user(content.clone(), attached_files));

            let request = GenerationRequest {
                model: chat.model.clone(),
                prompt: compose_prompt(&content, &processed),
                system: if settings.system_prompt.is_empty() {
                    None
                } else {
                    Some(settings.system_prompt.clone())
                },
                context: chat.context.clone(),
                history: chat.messages.clone(),
                processed_files: processed,
                params: chat
                    .params_override
                    .clone()
                    .unwrap_or_else(|| settings.params.clone()),
                context_length: settings.context_length,
            };
            (request, chat.clone())
        };
        self.inner
            .repository
            .save(user_chat)
            .await
            .map_err(ChatError::from)?;
        self.emit(ChatEvent::MessageAppended {
            chat_id: chat_id.clone(),
        });

        // Phase 3: enter the generating state for the chat that initiated
        // the send, not whichever chat is active by the time we get here.
        {
            let mut state = self.inner.state.lock();
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            *state = state.start_generation(chat_id.clone());
        }
        self.emit(ChatEvent::GenerationStarted {
            chat_id: chat_id.clone(),
        });

        // Phase 4: consume the response.
        let (raw, final_context) = if settings.show_live_response {
            self.consume_stream(&chat_id, request, &token).await?
        } else {
            self.generate_blocking(&chat_id, request, &token).await?
        };

        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        // Phase 5: batch extraction for persistence. The live filter was
        // display-only; what gets stored is re-derived from the full text.
        let extraction = extract_thinking_content(&raw);
        let assistant = Message::assistant(
            extraction.final_answer.trim().to_string(),
            extraction.thinking,
        );

        // Phase 6: append to the chat that was generating, looked up from
        // the state, never the currently active chat.
        let generating_chat = self
            .inner
            .state
            .lock()
            .current_generating_chat
            .clone()
            .ok_or(ChatError::Cancelled)?;

        let finished_chat = {
            let mut store = self.inner.store.lock();
            let chat = store
                .get_mut(&generating_chat)
                .ok_or_else(|| ChatError::State {
                    message: "the generating chat no longer exists".to_string(),
                })?;
            chat.push_message(assistant);
            chat.set_context(final_context);
            chat.clone()
        };
        self.inner
            .repository
            .save(finished_chat.clone())
            .await
            .map_err(ChatError::from)?;
        self.emit(ChatEvent::MessageAppended {
            chat_id: generating_chat.clone(),
        });

        // Phase 7: clear all generation sub-state.
        {
            let mut state = self.inner.state.lock();
            *state = state.stop_generation().finish_send();
        }
        self.emit(ChatEvent::GenerationCompleted {
            chat_id: generating_chat,
        });

        // Phase 8: fire-and-forget auto-title.
        if finished_chat.has_default_title() {
            self.spawn_title_generation(finished_chat);
        }

        Ok(())
    }

    async fn process_attachments(
        &self,
        chat_id: &str,
        paths: Vec<PathBuf>,
        token: &CancellationToken,
    ) -> ChatResult<Vec<ProcessedFile>> {
        {
            let mut state = self.inner.state.lock();
            *state = state.start_file_processing();
        }

        let progress_cb: ProgressCallback = {
            let this = self.clone();
            let chat_id = chat_id.to_string();
            Arc::new(move |progress| {
                {
                    let mut state = this.inner.state.lock();
                    // A cancel may already have cleared file state; late
                    // callbacks from the processor must not resurrect it.
                    if !state.is_processing_files {
                        return;
                    }
                    *state = state.update_file_progress(progress.clone());
                }
                this.emit(ChatEvent::FileProgressUpdated {
                    chat_id: chat_id.clone(),
                    progress,
                });
            })
        };

        let result = self
            .inner
            .files
            .process_files(paths, progress_cb, token.checker())
            .await;

        {
            let mut state = self.inner.state.lock();
            *state = state.stop_file_processing();
        }

        result
    }

    async fn consume_stream(
        &self,
        chat_id: &str,
        request: GenerationRequest,
        token: &CancellationToken,
    ) -> ChatResult<(String, Option<Vec<i64>>)> {
        let generation = self.inner.generation.clone();
        let this = self.clone();

        let mut stream = self
            .inner
            .retry
            .run(
                "generate_stream",
                token,
                |err| err.is_retryable(),
                |attempt, _err| {
                    this.emit(ChatEvent::RetryScheduled {
                        operation: "generate_stream".to_string(),
                        attempt,
                    });
                },
                || generation.generate_stream(request.clone()),
            )
            .await?;

        let mut raw = String::new();
        let mut final_context = None;

        while let Some(item) = stream.next().await {
            // Stop consuming as soon as cancellation is observed; chunks
            // still in flight are silently discarded.
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            let chunk = item?;

            if !chunk.delta.is_empty() {
                raw.push_str(&chunk.delta);
                let outcome = filter_streaming_content(&raw);
                {
                    let mut state = self.inner.state.lock();
                    if token.is_cancelled() {
                        return Err(ChatError::Cancelled);
                    }
                    *state = state.apply_stream_update(raw.clone(), &outcome);
                }
                self.emit(ChatEvent::StreamUpdated {
                    chat_id: chat_id.to_string(),
                });
            }

            if chunk.context.is_some() {
                final_context = chunk.context;
            }
            if chunk.done {
                break;
            }
        }

        Ok((raw, final_context))
    }

    async fn generate_blocking(
        &self,
        chat_id: &str,
        request: GenerationRequest,
        token: &CancellationToken,
    ) -> ChatResult<(String, Option<Vec<i64>>)> {
        let generation = self.inner.generation.clone();
        let this = self.clone();

        let response = self
            .inner
            .retry
            .run(
                "generate",
                token,
                |err| err.is_retryable(),
                |attempt, _err| {
                    this.emit(ChatEvent::RetryScheduled {
                        operation: "generate".to_string(),
                        attempt,
                    });
                },
                || generation.generate(request.clone(), token.checker()),
            )
            .await?;

        // One filter pass so the state still reflects the full response
        // before finalization, exactly as the streaming path leaves it.
        let outcome = filter_streaming_content(&response.text);
        {
            let mut state = self.inner.state.lock();
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            *state = state.apply_stream_update(response.text.clone(), &outcome);
        }
        self.emit(ChatEvent::StreamUpdated {
            chat_id: chat_id.to_string(),
        });

        Ok((response.text, response.context))
    }

    /// Title follow-up after the first exchange. Runs detached: nothing
    /// here may surface as a user-visible error, and the orchestrator is
    /// free to start the next send meanwhile.
    fn spawn_title_generation(&self, chat: Chat) {
        let this = self.clone();

        tokio::spawn(async move {
            let chat_id = chat.id.clone();
            {
                let mut state = this.inner.state.lock();
                *state = state.start_title_generation(chat_id.clone());
            }
            this.emit(ChatEvent::TitleGenerationStarted {
                chat_id: chat_id.clone(),
            });

            let user_text = chat
                .first_user_message()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            // Persisted assistant content is already thinking-filtered.
            let assistant_text = chat
                .last_assistant_message()
                .map(|m| m.content.clone())
                .unwrap_or_default();

            let title_token = CancellationToken::new();
            let title = generate_chat_title(
                this.inner.generation.as_ref(),
                &chat.model,
                &user_text,
                &assistant_text,
                title_token.checker(),
            )
            .await;

            // The chat may have been deleted or renamed while we waited.
            let renamed = {
                let mut store = this.inner.store.lock();
                match store.get_mut(&chat_id) {
                    Some(chat) if chat.has_default_title() => {
                        chat.set_title(title.clone());
                        Some(chat.clone())
                    }
                    _ => None,
                }
            };

            if let Some(chat) = renamed {
                if let Err(err) = this.inner.repository.save(chat).await {
                    warn!(chat_id = %chat_id, error = %err, "could not persist generated title");
                }
                this.emit(ChatEvent::TitleUpdated {
                    chat_id: chat_id.clone(),
                    title,
                });
                this.emit(ChatEvent::ChatListChanged);
            }

            {
                let mut state = this.inner.state.lock();
                *state = state.stop_title_generation(&chat_id);
            }
        });
    }
}

fn compose_prompt(content: &str, files: &[ProcessedFile]) -> String {
    if files.is_empty() {
        return content.to_string();
    }

    let mut prompt = String::from(content);
    for file in files {
        prompt.push_str("\n\n[Attached file: ");
        prompt.push_str(&file.file_name);
        prompt.push_str("]\n");
        prompt.push_str(&file.content);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt_without_files_is_passthrough() {
        assert_eq!(compose_prompt("hello", &[]), "hello");
    }

    #[test]
    fn test_compose_prompt_appends_file_sections() {
        let files = vec![ProcessedFile {
            path: PathBuf::from("/tmp/notes.txt"),
            file_name: "notes.txt".into(),
            content: "remember the milk".into(),
        }];
        let prompt = compose_prompt("summarize this", &files);
        assert!(prompt.starts_with("summarize this"));
        assert!(prompt.contains("[Attached file: notes.txt]"));
        assert!(prompt.contains("remember the milk"));
    }
}
