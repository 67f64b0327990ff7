//! Separation of model "thinking" markup from the user-visible answer.
//!
//! Two entry points share the marker tables: [`filter_streaming_content`]
//! re-filters the full accumulated raw text on every chunk while a response
//! is still arriving (live display), and [`extract_thinking_content`] runs
//! once over the complete response to produce what actually gets persisted.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker pairs checked in this fixed order, case-insensitively.
const THINKING_MARKERS: [(&str, &str); 5] = [
    ("<think>", "</think>"),
    ("<thinking>", "</thinking>"),
    ("<reasoning>", "</reasoning>"),
    ("<analysis>", "</analysis>"),
    ("<reflection>", "</reflection>"),
];

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Result of filtering the raw text accumulated so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Raw text with thinking markup removed, ready for rendering.
    pub display: String,
    /// Thinking text of the last block processed (trimmed). When a response
    /// mixes marker types, only the last type in the fixed order survives
    /// here; earlier types' markup is still stripped from `display`.
    pub thinking: String,
    /// True while the stream sits inside an opening tag with no close yet.
    pub inside_open_block: bool,
}

/// Case-insensitive (ASCII) substring search from a byte offset.
/// Markers are pure ASCII, so match offsets always land on char boundaries.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || from + pat.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - pat.len())
        .find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

/// Separate thinking segments from the answer in the full raw text so far.
///
/// Stateless and idempotent: the result depends only on the current raw
/// string, never on previous calls. Never fails; text without markers
/// passes through unchanged.
pub fn filter_streaming_content(raw: &str) -> FilterOutcome {
    let mut display = raw.to_string();
    let mut thinking = String::new();
    let mut inside_open_block = false;

    for (open_tag, close_tag) in THINKING_MARKERS {
        let mut search_from = 0usize;
        while let Some(open_at) = find_ci(&display, open_tag, search_from) {
            let content_start = open_at + open_tag.len();
            match find_ci(&display, close_tag, content_start) {
                Some(close_at) => {
                    thinking = display[content_start..close_at].trim().to_string();
                    inside_open_block = false;
                    display.replace_range(open_at..close_at + close_tag.len(), "");
                    search_from = open_at;
                }
                None => {
                    // Unterminated: everything to the end is live thinking.
                    // No further block of this type can follow it.
                    thinking = display[content_start..].trim().to_string();
                    inside_open_block = true;
                    display.truncate(open_at);
                    break;
                }
            }
        }
    }

    let display = EXCESS_NEWLINES.replace_all(&display, "\n\n").into_owned();

    FilterOutcome {
        display,
        thinking,
        inside_open_block,
    }
}

/// Whether the text contains any recognized thinking markup at all.
pub fn has_thinking_content(text: &str) -> bool {
    THINKING_MARKERS
        .iter()
        .any(|(open, _)| find_ci(text, open, 0).is_some())
}

/// Batch extraction over a complete response, used for persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThinkingExtraction {
    pub thinking: Option<String>,
    pub final_answer: String,
    pub has_thinking: bool,
    /// Byte range of the first detected block (opening tag through closing
    /// tag, or end of text for an unterminated block).
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
}

/// Extract the final answer and thinking text from a complete response.
///
/// Shares the filter's marker semantics so the persisted message agrees
/// with what the live filter last showed, and additionally reports where
/// the first block sat in the raw text.
pub fn extract_thinking_content(text: &str) -> ThinkingExtraction {
    let outcome = filter_streaming_content(text);
    let has_thinking = has_thinking_content(text);

    let (start_index, end_index) = match first_block_span(text) {
        Some((start, end)) => (Some(start), Some(end)),
        None => (None, None),
    };

    ThinkingExtraction {
        thinking: if outcome.thinking.is_empty() {
            None
        } else {
            Some(outcome.thinking)
        },
        final_answer: outcome.display,
        has_thinking,
        start_index,
        end_index,
    }
}

/// Locate the earliest marker block in the text, whatever its type.
fn first_block_span(text: &str) -> Option<(usize, usize)> {
    let mut earliest: Option<(usize, usize)> = None;
    for (open_tag, close_tag) in THINKING_MARKERS {
        if let Some(open_at) = find_ci(text, open_tag, 0) {
            let end = match find_ci(text, close_tag, open_at + open_tag.len()) {
                Some(close_at) => close_at + close_tag.len(),
                None => text.len(),
            };
            if earliest.map_or(true, |(start, _)| open_at < start) {
                earliest = Some((open_at, end));
            }
        }
    }
    earliest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_block() {
        let outcome = filter_streaming_content("<think>step one</think>Hello world");
        assert_eq!(outcome.display, "Hello world");
        assert_eq!(outcome.thinking, "step one");
        assert!(!outcome.inside_open_block);
    }

    #[test]
    fn test_unterminated_block() {
        let outcome = filter_streaming_content("<think>still reasoning");
        assert_eq!(outcome.display, "");
        assert_eq!(outcome.thinking, "still reasoning");
        assert!(outcome.inside_open_block);
    }

    #[test]
    fn test_no_markers_passes_through() {
        let outcome = filter_streaming_content("plain answer");
        assert_eq!(outcome.display, "plain answer");
        assert_eq!(outcome.thinking, "");
        assert!(!outcome.inside_open_block);
    }

    #[test]
    fn test_idempotent_on_same_input() {
        let raw = "<thinking>abc</thinking>answer\n\n\n\nmore";
        assert_eq!(filter_streaming_content(raw), filter_streaming_content(raw));
    }

    #[test]
    fn test_case_insensitive_markers() {
        let outcome = filter_streaming_content("<THINK>loud</Think>quiet");
        assert_eq!(outcome.display, "quiet");
        assert_eq!(outcome.thinking, "loud");
    }

    #[test]
    fn test_multiple_blocks_of_same_type_keep_last() {
        let outcome = filter_streaming_content("<think>first</think>a<think>second</think>b");
        assert_eq!(outcome.display, "ab");
        assert_eq!(outcome.thinking, "second");
        assert!(!outcome.inside_open_block);
    }

    #[test]
    fn test_mixed_marker_types_last_processed_wins() {
        // <think> is handled before <reasoning>, so the reasoning content
        // ends up as the surviving thinking text even though it appears
        // first in the raw stream. Both markups are stripped from display.
        let raw = "<reasoning>plan</reasoning>x<think>check</think>y";
        let outcome = filter_streaming_content(raw);
        assert_eq!(outcome.display, "xy");
        assert_eq!(outcome.thinking, "plan");
        assert!(!outcome.inside_open_block);
    }

    #[test]
    fn test_unterminated_block_swallows_rest_of_stream() {
        let outcome = filter_streaming_content("before<analysis>deep dive, no close");
        assert_eq!(outcome.display, "before");
        assert_eq!(outcome.thinking, "deep dive, no close");
        assert!(outcome.inside_open_block);
    }

    #[test]
    fn test_open_tag_prefix_does_not_shadow_longer_tag() {
        // "<think>" must not match inside "<thinking>".
        let outcome = filter_streaming_content("<thinking>inner</thinking>done");
        assert_eq!(outcome.display, "done");
        assert_eq!(outcome.thinking, "inner");
    }

    #[test]
    fn test_newline_collapse() {
        let outcome = filter_streaming_content("a\n\n\n\n\nb\n\nc");
        assert_eq!(outcome.display, "a\n\nb\n\nc");
    }

    #[test]
    fn test_display_never_longer_than_raw() {
        let samples = [
            "plain",
            "<think>a</think>b",
            "<think>open",
            "x\n\n\n\ny",
            "<reasoning>r</reasoning><think>t</think>",
        ];
        for raw in samples {
            let outcome = filter_streaming_content(raw);
            assert!(outcome.display.len() <= raw.len(), "raw: {:?}", raw);
        }
    }

    #[test]
    fn test_has_thinking_content() {
        assert!(has_thinking_content("<think>x"));
        assert!(has_thinking_content("<REFLECTION>y</REFLECTION>"));
        assert!(!has_thinking_content("no tags here"));
    }

    #[test]
    fn test_batch_extraction_complete() {
        let extraction = extract_thinking_content("<think>why</think>because");
        assert_eq!(extraction.final_answer, "because");
        assert_eq!(extraction.thinking.as_deref(), Some("why"));
        assert!(extraction.has_thinking);
        assert_eq!(extraction.start_index, Some(0));
        assert_eq!(extraction.end_index, Some("<think>why</think>".len()));
    }

    #[test]
    fn test_batch_extraction_without_markers() {
        let extraction = extract_thinking_content("just an answer");
        assert_eq!(extraction.final_answer, "just an answer");
        assert_eq!(extraction.thinking, None);
        assert!(!extraction.has_thinking);
        assert_eq!(extraction.start_index, None);
    }

    #[test]
    fn test_extraction_agrees_with_live_filter() {
        let raw = "<thinking>t1</thinking>mid<thinking>t2</thinking>end";
        let live = filter_streaming_content(raw);
        let batch = extract_thinking_content(raw);
        assert_eq!(batch.final_answer, live.display);
        assert_eq!(batch.thinking.as_deref(), Some(live.thinking.as_str()));
    }
}
