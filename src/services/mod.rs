pub mod files;
pub mod generation;
pub mod ollama;
pub mod thinking;
pub mod title;

pub use files::{
    FileContentProcessor, FileProgress, FileStatus, PlainTextProcessor, ProcessedFile,
    ProgressCallback,
};
pub use generation::{
    ChunkStream, GenerationChunk, GenerationRequest, GenerationResponse, GenerationService,
};
pub use ollama::OllamaClient;
pub use thinking::{
    extract_thinking_content, filter_streaming_content, has_thinking_content, FilterOutcome,
    ThinkingExtraction,
};
pub use title::generate_chat_title;
