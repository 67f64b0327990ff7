//! Automatic chat titling from the first exchange.
//!
//! Asks the same model for a short title, then cleans the output into a
//! 2–5 word label. Low-quality output falls back to keywords pulled from
//! the user's message, then to a fixed default. Nothing in here is allowed
//! to fail outward; a chat keeps its old title on any error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationParams;
use crate::error::with_timeout;
use crate::models::cancellation::CancelCheck;
use crate::services::generation::{GenerationRequest, GenerationService};
use crate::services::thinking;

/// Used when both the model and the keyword fallback produce nothing.
pub const FALLBACK_TITLE: &str = "New Conversation";

const MAX_TITLE_WORDS: usize = 5;
const MIN_TITLE_WORDS: usize = 2;
/// Per-side cap on the prompt excerpt fed to the title model.
const EXCERPT_CHARS: usize = 500;
const TITLE_DEADLINE: Duration = Duration::from_secs(30);

/// Lead-ins models like to add despite being told not to.
static TITLE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^(title|chat title|topic)\s*[:\-]\s*"#).unwrap());

fn truncate_text(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

/// Clean raw model output into a candidate title. Returns `None` when the
/// result is too short to be useful.
pub fn clean_title(raw: &str) -> Option<String> {
    let first_line = raw.trim().lines().next().unwrap_or("");
    let stripped = TITLE_PREFIX.replace(first_line, "");
    let stripped = stripped
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim_matches('*')
        .trim();

    let words: Vec<&str> = stripped.split_whitespace().collect();
    if words.len() < MIN_TITLE_WORDS {
        return None;
    }
    Some(words[..words.len().min(MAX_TITLE_WORDS)].join(" "))
}

const STOPWORDS: [&str; 26] = [
    "a", "an", "and", "are", "can", "could", "do", "does", "for", "how", "i", "in", "is", "it",
    "me", "my", "of", "on", "please", "the", "to", "what", "when", "why", "with", "you",
];

/// Derive a title from the user's own words when the model's attempt was
/// unusable: keep the first few non-stopwords, capitalized.
pub fn fallback_title(user_message: &str) -> Option<String> {
    let keywords: Vec<String> = user_message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 1 && !STOPWORDS.contains(&word.to_lowercase().as_str()))
        .take(4)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    if keywords.len() >= MIN_TITLE_WORDS {
        Some(keywords.join(" "))
    } else {
        None
    }
}

fn title_prompt(user_text: &str, assistant_text: &str) -> String {
    format!(
        "Generate a concise, descriptive title (2-5 words) for this conversation. \
        Output ONLY the title, no quotes, no explanation.\n\n\
        User: {}\n\nAssistant: {}",
        truncate_text(user_text, EXCERPT_CHARS),
        truncate_text(assistant_text, EXCERPT_CHARS)
    )
}

/// Produce a title for the first exchange of a chat.
///
/// `assistant_text` must already be thinking-filtered; the model's own
/// title output is filtered again here because small local models tend to
/// reason out loud even for this. Never fails: every error path degrades
/// to the keyword fallback or [`FALLBACK_TITLE`].
pub async fn generate_chat_title(
    service: &dyn GenerationService,
    model: &str,
    user_text: &str,
    assistant_text: &str,
    is_cancelled: CancelCheck,
) -> String {
    let request = GenerationRequest {
        model: model.to_string(),
        prompt: title_prompt(user_text, assistant_text),
        system: None,
        context: None,
        history: Vec::new(),
        processed_files: Vec::new(),
        params: GenerationParams::default(),
        context_length: 2048,
    };

    let response = with_timeout(
        "title_generation",
        TITLE_DEADLINE,
        service.generate(request, is_cancelled),
    )
    .await;

    let candidate = match response {
        Ok(response) => {
            let extraction = thinking::extract_thinking_content(&response.text);
            clean_title(&extraction.final_answer)
        }
        Err(err) => {
            warn!(error = %err, "title generation failed, using fallback");
            None
        }
    };

    let title = candidate
        .or_else(|| fallback_title(user_text))
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    debug!(title = %title, "title resolved");
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_strips_quotes_and_prefix() {
        assert_eq!(
            clean_title("Title: \"Rust Borrow Checker Help\"").as_deref(),
            Some("Rust Borrow Checker Help")
        );
        assert_eq!(
            clean_title("'Weekend Trip Planning'\nignored second line").as_deref(),
            Some("Weekend Trip Planning")
        );
    }

    #[test]
    fn test_clean_title_clamps_to_five_words() {
        assert_eq!(
            clean_title("One Two Three Four Five Six Seven").as_deref(),
            Some("One Two Three Four Five")
        );
    }

    #[test]
    fn test_clean_title_rejects_single_word() {
        assert_eq!(clean_title("Hello"), None);
        assert_eq!(clean_title("   "), None);
        assert_eq!(clean_title(""), None);
    }

    #[test]
    fn test_fallback_title_filters_stopwords() {
        let title = fallback_title("how do I profile memory usage in tokio").unwrap();
        assert_eq!(title, "Profile Memory Usage Tokio");
    }

    #[test]
    fn test_fallback_title_gives_up_on_thin_input() {
        assert_eq!(fallback_title("why"), None);
        assert_eq!(fallback_title(""), None);
    }

    #[test]
    fn test_title_prompt_truncates_long_inputs() {
        let long_text = "x".repeat(2000);
        let prompt = title_prompt(&long_text, "short");
        assert!(prompt.len() < 1200);
        assert!(prompt.contains("short"));
    }
}
