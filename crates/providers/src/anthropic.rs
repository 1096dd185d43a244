//! Anthropic Messages API transport.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Strict response parsing: unknown block types or stop reasons are
//!   protocol errors, never silently dropped

use async_trait::async_trait;
use microclaw_config::AppConfig;
use microclaw_core::error::{Error, TransportError};
use microclaw_core::message::{ContentBlock, Message, MessageContent, Role};
use microclaw_core::transport::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Longest error body excerpt kept in a [`TransportError::Protocol`].
const ERROR_EXCERPT_BYTES: usize = 200;

/// Largest successful response body read into memory.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Error bodies are only mined for a message.
const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

/// Anthropic native Messages API transport.
pub struct AnthropicTransport {
    name: String,
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicTransport {
    /// Create a new Anthropic transport.
    pub fn new(api_key: impl Into<String>) -> microclaw_core::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            api_url: DEFAULT_API_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from application config. Fails when no API key is available.
    pub fn from_config(config: &AppConfig) -> microclaw_core::Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| Error::Config {
            message: "No API key configured. Set MICROCLAW_API_KEY or ANTHROPIC_API_KEY, \
                      or add api_key to ~/.microclaw/config.toml"
                .into(),
        })?;
        Ok(Self::new(api_key)?.with_api_url(&config.api_url))
    }

    /// Use a custom endpoint (e.g., for testing or proxies).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Borrowing wire body for one request.
    fn build_body<'a>(request: &ModelRequest<'a>) -> ApiRequest<'a> {
        let (system, messages) = Self::to_api_messages(&request.messages);
        ApiRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            system,
            messages,
            tools: request.tools,
        }
    }

    /// Split out the system prompt and convert the rest to API messages.
    ///
    /// Anthropic has no tool-result role: results travel as `user` messages,
    /// and consecutive results are merged into one message so they answer
    /// the preceding `tool_use` turn together.
    fn to_api_messages<'a>(messages: &[&'a Message]) -> (Option<String>, Vec<ApiMessage<'a>>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut result: Vec<ApiMessage<'a>> = Vec::new();
        let mut merging_results = false;

        for &msg in messages {
            match msg.role {
                Role::System => {
                    system_parts.push(msg.text());
                    merging_results = false;
                }
                Role::User => {
                    result.push(ApiMessage {
                        role: "user",
                        content: ApiContent::from(&msg.content),
                    });
                    merging_results = false;
                }
                Role::Assistant => {
                    result.push(ApiMessage {
                        role: "assistant",
                        content: ApiContent::from(&msg.content),
                    });
                    merging_results = false;
                }
                Role::ToolResult => {
                    let MessageContent::Blocks(blocks) = &msg.content else {
                        // Collapsed by truncation; the correlation id is gone.
                        result.push(ApiMessage {
                            role: "user",
                            content: ApiContent::from(&msg.content),
                        });
                        merging_results = false;
                        continue;
                    };

                    if merging_results {
                        if let Some(ApiMessage {
                            content: ApiContent::Blocks(prev),
                            ..
                        }) = result.last_mut()
                        {
                            prev.extend(blocks.iter());
                            continue;
                        }
                    }
                    result.push(ApiMessage {
                        role: "user",
                        content: ApiContent::Blocks(blocks.iter().collect()),
                    });
                    merging_results = true;
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, result)
    }

    /// Strictly parse a 2xx body into a [`ModelResponse`].
    fn parse_response(body: &[u8]) -> Result<ModelResponse, TransportError> {
        let api_resp: ApiResponse = serde_json::from_slice(body).map_err(|e| {
            TransportError::malformed(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let stop_reason = match api_resp.stop_reason.as_deref() {
            Some(raw) => StopReason::parse(raw)
                .ok_or_else(|| TransportError::malformed(format!("Unknown stop_reason '{raw}'")))?,
            None => return Err(TransportError::malformed("Response has no stop_reason")),
        };

        let content = api_resp
            .content
            .into_iter()
            .map(|block| match block {
                ResponseBlock::Text { text } => ContentBlock::Text { text },
                ResponseBlock::ToolUse { id, name, input } => {
                    ContentBlock::ToolUse { id, name, input }
                }
            })
            .collect();

        Ok(ModelResponse {
            stop_reason,
            content,
            usage: api_resp.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }

    /// Map a non-2xx status to the error taxonomy.
    fn classify_status(status: u16, retry_after: Option<Duration>, body: &[u8]) -> TransportError {
        match status {
            // 529 is Anthropic's "overloaded"
            429 | 529 => TransportError::RateLimited { retry_after },
            _ => TransportError::Protocol {
                status,
                message: error_message(body),
            },
        }
    }

    async fn exchange(&self, payload: Vec<u8>) -> Result<ModelResponse, TransportError> {
        let mut response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let success = (200..300).contains(&status);
        let cap = if success {
            MAX_RESPONSE_BYTES
        } else {
            MAX_ERROR_BODY_BYTES
        };

        let mut body = Vec::new();
        let mut overflow = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
        {
            let room = cap - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                overflow = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        debug!(status, bytes = body.len(), overflow, "Received Anthropic response");

        if !success {
            let err = Self::classify_status(status, retry_after, &body);
            warn!(status, error = %err, "Anthropic API error");
            return Err(err);
        }
        if overflow {
            return Err(TransportError::malformed(format!(
                "Response body exceeds {MAX_RESPONSE_BYTES} bytes"
            )));
        }

        Self::parse_response(&body)
    }
}

#[async_trait]
impl Transport for AnthropicTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        request: &ModelRequest<'_>,
        timeout: Duration,
    ) -> std::result::Result<ModelResponse, TransportError> {
        let payload = {
            let body = Self::build_body(request);
            serde_json::to_vec(&body).map_err(|e| TransportError::Protocol {
                status: 0,
                message: format!("Failed to encode request: {e}"),
            })?
        };

        debug!(
            transport = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            bytes = payload.len(),
            "Sending request"
        );

        match tokio::time::timeout(timeout, self.exchange(payload)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Anthropic request timed out");
                Err(TransportError::Network(format!(
                    "Request timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }
}

/// `Retry-After` in delta-seconds form.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Prefer the API's `error.message`, fall back to a bounded body excerpt.
fn error_message(body: &[u8]) -> String {
    if let Ok(err) = serde_json::from_slice::<ApiErrorBody>(body) {
        return format!("{}: {}", err.error.kind, err.error.message);
    }
    let text = String::from_utf8_lossy(body);
    let mut end = text.len().min(ERROR_EXCERPT_BYTES);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: ApiContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent<'a> {
    Text(&'a str),
    Blocks(Vec<&'a ContentBlock>),
}

impl<'a> From<&'a MessageContent> for ApiContent<'a> {
    fn from(content: &'a MessageContent) -> Self {
        match content {
            MessageContent::Text(text) => ApiContent::Text(text),
            MessageContent::Blocks(blocks) => ApiContent::Blocks(blocks.iter().collect()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}
