//! Local model server client (Ollama HTTP API).
//!
//! Speaks `/api/generate` for completions (NDJSON lines when streaming,
//! a single JSON object otherwise) and `/api/tags` for model discovery.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::models::cancellation::CancelCheck;
use crate::repositories::BoxFuture;
use crate::services::generation::{
    ChunkStream, GenerationChunk, GenerationRequest, GenerationResponse, GenerationService,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// One line of the `/api/generate` NDJSON stream (also the whole body in
/// non-streaming mode).
#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    context: Option<Vec<i64>>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TaggedModel>,
}

#[derive(Debug, Deserialize)]
struct TaggedModel {
    name: String,
}

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn localhost() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> ChatResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Api {
                status: Some(response.status().as_u16()),
                message: format!("model listing failed: {}", response.status()),
            });
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn request_body(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let mut options = json!({
            "temperature": request.params.temperature,
            "top_p": request.params.top_p,
            "top_k": request.params.top_k,
            "repeat_penalty": request.params.repeat_penalty,
            "num_ctx": request.context_length,
        });
        if let Some(seed) = request.params.seed {
            options["seed"] = json!(seed);
        }
        if let Some(num_predict) = request.params.num_predict {
            options["num_predict"] = json!(num_predict);
        }

        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": stream,
            "options": options,
        });
        if let Some(system) = &request.system {
            if !system.is_empty() {
                body["system"] = json!(system);
            }
        }
        if let Some(context) = &request.context {
            body["context"] = json!(context);
        }
        body
    }

    async fn post_generate(&self, body: serde_json::Value) -> ChatResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self.http.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: Some(status),
                message: format!("generate failed with HTTP {}: {}", status, detail),
            });
        }

        Ok(response)
    }
}

/// Parse one NDJSON line into a chunk, surfacing in-band server errors.
fn parse_line(line: &str) -> ChatResult<GenerationChunk> {
    let parsed: GenerateLine = serde_json::from_str(line).map_err(|err| ChatError::Format {
        message: format!("bad stream line: {}", err),
    })?;

    if let Some(error) = parsed.error {
        return Err(ChatError::Api {
            status: None,
            message: error,
        });
    }

    Ok(GenerationChunk {
        delta: parsed.response,
        context: parsed.context,
        done: parsed.done,
    })
}

impl GenerationService for OllamaClient {
    fn generate(
        &self,
        request: GenerationRequest,
        is_cancelled: CancelCheck,
    ) -> BoxFuture<'static, ChatResult<GenerationResponse>> {
        let client = self.clone();

        Box::pin(async move {
            if is_cancelled() {
                return Err(ChatError::Cancelled);
            }

            let body = client.request_body(&request, false);
            debug!(model = %request.model, "non-streaming generate");
            let response = client.post_generate(body).await?;
            let line: GenerateLine = response.json().await?;

            if let Some(error) = line.error {
                return Err(ChatError::Api {
                    status: None,
                    message: error,
                });
            }
            if is_cancelled() {
                return Err(ChatError::Cancelled);
            }

            Ok(GenerationResponse {
                text: line.response,
                context: line.context,
            })
        })
    }

    fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, ChatResult<ChunkStream>> {
        let client = self.clone();

        Box::pin(async move {
            let body = client.request_body(&request, true);
            debug!(model = %request.model, "opening generate stream");
            let response = client.post_generate(body).await?;

            let stream: ChunkStream = Box::pin(async_stream::stream! {
                let mut bytes = response.bytes_stream();
                // Chunk boundaries do not respect line boundaries; carry the
                // partial tail between reads.
                let mut buffer = String::new();

                while let Some(item) = bytes.next().await {
                    let data = match item {
                        Ok(data) => data,
                        Err(err) => {
                            yield Err(ChatError::from(err));
                            return;
                        }
                    };
                    buffer.push_str(&String::from_utf8_lossy(&data));

                    while let Some(newline) = buffer.find('\n') {
                        let line: String = buffer.drain(..=newline).collect();
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_line(line) {
                            Ok(chunk) => {
                                let finished = chunk.done;
                                yield Ok(chunk);
                                if finished {
                                    return;
                                }
                            }
                            Err(err) => {
                                yield Err(err);
                                return;
                            }
                        }
                    }
                }

                // Server closed without a done marker; flush any tail.
                let tail = buffer.trim().to_string();
                if !tail.is_empty() {
                    match parse_line(&tail) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
                warn!("stream ended without done marker");
                yield Ok(GenerationChunk { done: true, ..GenerationChunk::default() });
            });

            Ok(stream)
        })
    }
}
