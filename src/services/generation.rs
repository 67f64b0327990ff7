use futures::stream::BoxStream;

use crate::config::GenerationParams;
use crate::error::ChatResult;
use crate::models::cancellation::CancelCheck;
use crate::models::chat::Message;
use crate::repositories::BoxFuture;
use crate::services::files::ProcessedFile;

/// Everything a backend needs to produce one response.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub model: String,
    /// Fully composed prompt: user content plus any attachment text.
    pub prompt: String,
    pub system: Option<String>,
    /// Opaque conversation-memory tokens from the previous response.
    pub context: Option<Vec<i64>>,
    /// Prior messages, for backends that rebuild memory from history
    /// instead of context tokens.
    pub history: Vec<Message>,
    pub processed_files: Vec<ProcessedFile>,
    pub params: GenerationParams,
    pub context_length: u32,
}

#[derive(Clone, Debug)]
pub struct GenerationResponse {
    pub text: String,
    pub context: Option<Vec<i64>>,
}

/// One streamed fragment. The final chunk carries `done = true` and,
/// when the server provides one, the next context token list.
#[derive(Clone, Debug, Default)]
pub struct GenerationChunk {
    pub delta: String,
    pub context: Option<Vec<i64>>,
    pub done: bool,
}

pub type ChunkStream = BoxStream<'static, ChatResult<GenerationChunk>>;

/// The network boundary of the orchestrator. Implementations own transport
/// details; the orchestrator only consumes chunks and checks cancellation.
pub trait GenerationService: Send + Sync + 'static {
    /// Complete a prompt in one round trip.
    fn generate(
        &self,
        request: GenerationRequest,
        is_cancelled: CancelCheck,
    ) -> BoxFuture<'static, ChatResult<GenerationResponse>>;

    /// Open a token stream for the prompt. Cancellation is handled by the
    /// consumer dropping the stream.
    fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, ChatResult<ChunkStream>>;
}
