use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use super::chat::{ChatId, MessageId};
use crate::services::files::FileProgress;
use crate::services::thinking::FilterOutcome;

/// Live streaming buffers for the response currently being generated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingState {
    /// Everything received from the server so far, markup included.
    pub raw_response: String,
    /// Filtered text shown to the user.
    pub display_response: String,
    pub is_streaming: bool,
}

/// Thinking-bubble state for the response currently being generated.
/// `expanded_bubbles` is a per-message UI preference and survives
/// generation resets; everything else resets every generation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThinkingState {
    pub current_thinking_content: String,
    pub has_active_thinking_bubble: bool,
    pub is_inside_thinking_block: bool,
    pub is_thinking_phase: bool,
    pub expanded_bubbles: HashMap<MessageId, bool>,
}

/// Which chats have a title-generation request in flight.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleGenerationState {
    pub is_generating_title: bool,
    pub chats_generating_title: HashSet<ChatId>,
}

/// Aggregate operation state for one orchestrator.
///
/// Mutated only through the named transition methods below; every
/// transition returns a fresh snapshot that has passed `assert_valid`.
/// An invariant violation is a bug in the transition logic, not a
/// recoverable condition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOperationState {
    pub is_generating: bool,
    pub is_sending_message: bool,
    pub is_processing_files: bool,
    /// The chat that initiated the in-flight generation. Independent of
    /// which chat the UI is currently observing.
    pub current_generating_chat: Option<ChatId>,
    pub streaming: StreamingState,
    pub thinking: ThinkingState,
    pub titles: TitleGenerationState,
    pub file_progress: HashMap<PathBuf, FileProgress>,
}

impl ChatOperationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics when any aggregate invariant is broken.
    pub fn assert_valid(&self) {
        assert_eq!(
            self.is_generating,
            self.current_generating_chat.is_some(),
            "is_generating must mirror current_generating_chat"
        );
        if !self.streaming.is_streaming {
            assert_eq!(
                self.streaming.raw_response, self.streaming.display_response,
                "raw and display must agree when not streaming"
            );
        }
        assert!(
            self.streaming.display_response.len() <= self.streaming.raw_response.len(),
            "filtering may only remove content"
        );
        if self.thinking.has_active_thinking_bubble {
            assert!(
                !self.thinking.current_thinking_content.is_empty(),
                "an active bubble requires thinking content"
            );
            assert!(
                self.thinking.is_thinking_phase,
                "an active bubble requires the thinking phase"
            );
        }
        if self.thinking.is_inside_thinking_block {
            assert!(
                self.thinking.is_thinking_phase,
                "an open block implies the thinking phase"
            );
        }
        assert_eq!(
            self.titles.is_generating_title,
            !self.titles.chats_generating_title.is_empty(),
            "title flag must mirror the generating set"
        );
    }

    fn validated(self) -> Self {
        self.assert_valid();
        self
    }

    #[must_use]
    pub fn start_send(&self) -> Self {
        let mut next = self.clone();
        next.is_sending_message = true;
        next.validated()
    }

    #[must_use]
    pub fn finish_send(&self) -> Self {
        let mut next = self.clone();
        next.is_sending_message = false;
        next.validated()
    }

    #[must_use]
    pub fn start_file_processing(&self) -> Self {
        let mut next = self.clone();
        next.is_processing_files = true;
        next.validated()
    }

    #[must_use]
    pub fn update_file_progress(&self, progress: FileProgress) -> Self {
        let mut next = self.clone();
        next.file_progress.insert(progress.path.clone(), progress);
        next.validated()
    }

    #[must_use]
    pub fn remove_file_progress(&self, path: &PathBuf) -> Self {
        let mut next = self.clone();
        next.file_progress.remove(path);
        next.validated()
    }

    #[must_use]
    pub fn stop_file_processing(&self) -> Self {
        let mut next = self.clone();
        next.is_processing_files = false;
        next.file_progress.clear();
        next.validated()
    }

    /// Enter the generating state for `chat_id`. The thinking phase starts
    /// true: until visible answer content arrives the UI shows a thinking
    /// indicator rather than an empty message.
    #[must_use]
    pub fn start_generation(&self, chat_id: ChatId) -> Self {
        let mut next = self.clone();
        next.is_generating = true;
        next.current_generating_chat = Some(chat_id);
        next.streaming = StreamingState {
            raw_response: String::new(),
            display_response: String::new(),
            is_streaming: true,
        };
        next.thinking.current_thinking_content = String::new();
        next.thinking.has_active_thinking_bubble = false;
        next.thinking.is_inside_thinking_block = false;
        next.thinking.is_thinking_phase = true;
        next.validated()
    }

    /// Fold one filter pass over the accumulated raw text into the state.
    ///
    /// The thinking phase holds while no visible display content exists or
    /// the stream sits inside an open block; it ends (and the live bubble
    /// with it) as soon as answer text is flowing outside any block.
    #[must_use]
    pub fn apply_stream_update(&self, raw: String, outcome: &FilterOutcome) -> Self {
        let mut next = self.clone();

        let has_visible = !outcome.display.trim().is_empty();
        let thinking_phase = outcome.inside_open_block || !has_visible;

        next.streaming.raw_response = raw;
        next.streaming.display_response = outcome.display.clone();
        next.thinking.current_thinking_content = outcome.thinking.clone();
        next.thinking.is_inside_thinking_block = outcome.inside_open_block;
        next.thinking.is_thinking_phase = thinking_phase;
        next.thinking.has_active_thinking_bubble = thinking_phase && !outcome.thinking.is_empty();
        next.validated()
    }

    /// Leave the generating state, discarding all per-generation sub-state.
    /// `expanded_bubbles` and title-generation tracking survive.
    #[must_use]
    pub fn stop_generation(&self) -> Self {
        let mut next = self.clone();
        next.is_generating = false;
        next.current_generating_chat = None;
        next.streaming = StreamingState::default();
        let expanded = std::mem::take(&mut next.thinking.expanded_bubbles);
        next.thinking = ThinkingState {
            expanded_bubbles: expanded,
            ..ThinkingState::default()
        };
        next.validated()
    }

    /// Wholesale reset used on cancellation and on deletion of the
    /// generating chat: generation, streaming, thinking, sending, and
    /// file-processing sub-state all return to initial.
    #[must_use]
    pub fn reset_generation(&self) -> Self {
        let mut next = self.stop_generation();
        next.is_sending_message = false;
        next.is_processing_files = false;
        next.file_progress.clear();
        next.validated()
    }

    #[must_use]
    pub fn start_title_generation(&self, chat_id: ChatId) -> Self {
        let mut next = self.clone();
        next.titles.chats_generating_title.insert(chat_id);
        next.titles.is_generating_title = true;
        next.validated()
    }

    #[must_use]
    pub fn stop_title_generation(&self, chat_id: &str) -> Self {
        let mut next = self.clone();
        next.titles.chats_generating_title.remove(chat_id);
        next.titles.is_generating_title = !next.titles.chats_generating_title.is_empty();
        next.validated()
    }

    #[must_use]
    pub fn toggle_expanded_bubble(&self, message_id: MessageId) -> Self {
        let mut next = self.clone();
        let expanded = next
            .thinking
            .expanded_bubbles
            .entry(message_id)
            .or_insert(false);
        *expanded = !*expanded;
        next.validated()
    }

    pub fn is_bubble_expanded(&self, message_id: &str) -> bool {
        self.thinking
            .expanded_bubbles
            .get(message_id)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_generating_title_for(&self, chat_id: &str) -> bool {
        self.titles.chats_generating_title.contains(chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::thinking::filter_streaming_content;

    #[test]
    fn test_initial_state_is_valid_and_idle() {
        let state = ChatOperationState::new();
        state.assert_valid();
        assert!(!state.is_generating);
        assert!(state.current_generating_chat.is_none());
    }

    #[test]
    fn test_generation_flag_mirrors_chat_id() {
        let state = ChatOperationState::new().start_generation("chat-1".into());
        assert!(state.is_generating);
        assert_eq!(state.current_generating_chat.as_deref(), Some("chat-1"));
        assert!(state.streaming.is_streaming);

        let state = state.stop_generation();
        assert!(!state.is_generating);
        assert!(state.current_generating_chat.is_none());
        assert_eq!(state.streaming, StreamingState::default());
    }

    #[test]
    fn test_stream_update_during_thinking_phase() {
        let raw = "<think>working on it";
        let outcome = filter_streaming_content(raw);
        let state = ChatOperationState::new()
            .start_generation("chat-1".into())
            .apply_stream_update(raw.to_string(), &outcome);

        assert!(state.thinking.is_thinking_phase);
        assert!(state.thinking.is_inside_thinking_block);
        assert!(state.thinking.has_active_thinking_bubble);
        assert_eq!(state.thinking.current_thinking_content, "working on it");
        assert_eq!(state.streaming.display_response, "");
    }

    #[test]
    fn test_thinking_phase_ends_when_answer_flows() {
        let raw = "<think>done</think>Here you go";
        let outcome = filter_streaming_content(raw);
        let state = ChatOperationState::new()
            .start_generation("chat-1".into())
            .apply_stream_update(raw.to_string(), &outcome);

        assert!(!state.thinking.is_thinking_phase);
        assert!(!state.thinking.has_active_thinking_bubble);
        assert_eq!(state.streaming.display_response, "Here you go");
        assert_eq!(state.thinking.current_thinking_content, "done");
    }

    #[test]
    fn test_expanded_bubbles_survive_reset() {
        let state = ChatOperationState::new()
            .toggle_expanded_bubble("msg-1".into())
            .start_generation("chat-1".into())
            .reset_generation();

        assert!(state.is_bubble_expanded("msg-1"));
        assert!(!state.is_bubble_expanded("msg-2"));
    }

    #[test]
    fn test_reset_clears_send_and_file_state() {
        let progress = FileProgress {
            path: PathBuf::from("/tmp/a.txt"),
            file_name: "a.txt".into(),
            progress: 0.5,
            status: crate::services::files::FileStatus::Extracting,
        };
        let state = ChatOperationState::new()
            .start_send()
            .start_file_processing()
            .update_file_progress(progress)
            .start_generation("chat-1".into())
            .reset_generation();

        assert!(!state.is_sending_message);
        assert!(!state.is_processing_files);
        assert!(state.file_progress.is_empty());
        assert!(!state.is_generating);
    }

    #[test]
    fn test_file_progress_update_and_remove() {
        let path = PathBuf::from("/tmp/report.pdf");
        let progress = FileProgress {
            path: path.clone(),
            file_name: "report.pdf".into(),
            progress: 0.25,
            status: crate::services::files::FileStatus::Extracting,
        };
        let state = ChatOperationState::new()
            .start_file_processing()
            .update_file_progress(progress);
        assert_eq!(state.file_progress.len(), 1);

        let state = state.remove_file_progress(&path);
        assert!(state.file_progress.is_empty());
        assert!(state.is_processing_files);
    }

    #[test]
    fn test_title_flag_mirrors_set() {
        let state = ChatOperationState::new()
            .start_title_generation("a".into())
            .start_title_generation("b".into());
        assert!(state.titles.is_generating_title);
        assert!(state.is_generating_title_for("a"));

        let state = state.stop_title_generation("a");
        assert!(state.titles.is_generating_title);

        let state = state.stop_title_generation("b");
        assert!(!state.titles.is_generating_title);
    }

    #[test]
    #[should_panic(expected = "is_generating must mirror current_generating_chat")]
    fn test_invalid_snapshot_panics() {
        let state = ChatOperationState {
            is_generating: true,
            ..ChatOperationState::default()
        };
        state.assert_valid();
    }
}
