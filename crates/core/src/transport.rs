//! Transport trait: the abstraction over the remote model endpoint.
//!
//! A Transport knows how to send one request (history + tool catalog) to the
//! model and return a strictly parsed response. It never retries: the agent
//! loop owns backoff so it can budget retries against the whole cycle.
//!
//! Implementations: Anthropic Messages API (`microclaw-providers`), scripted
//! mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TransportError;
use crate::message::{ContentBlock, Message};

/// One model turn's request, borrowing the conversation instead of cloning it.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest<'a> {
    /// The model to use (e.g., "claude-3-5-haiku-20241022")
    pub model: &'a str,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Ordered history, system message first
    pub messages: Vec<&'a Message>,

    /// Available tools the model can call
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ToolDefinition],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer
    EndTurn,
    /// The model wants tool results before continuing
    ToolUse,
    /// Generation hit `max_tokens`
    MaxTokens,
    /// A stop sequence matched
    StopSequence,
}

impl StopReason {
    /// Parse the wire value; unknown values are a protocol violation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "end_turn" => Some(StopReason::EndTurn),
            "tool_use" => Some(StopReason::ToolUse),
            "max_tokens" => Some(StopReason::MaxTokens),
            "stop_sequence" => Some(StopReason::StopSequence),
            _ => None,
        }
    }
}

/// A complete response from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Why generation stopped
    pub stop_reason: StopReason,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// Convenience constructor for a plain text answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::text(text)],
            usage: None,
        }
    }

    /// Convenience constructor for a tool-use turn.
    pub fn tool_use(content: Vec<ContentBlock>) -> Self {
        Self {
            stop_reason: StopReason::ToolUse,
            content,
            usage: None,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The core Transport trait.
///
/// The agent loop calls `send()` without knowing which endpoint is behind it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// A human-readable name for this transport (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Issue exactly one request and wait at most `timeout` for the answer.
    ///
    /// Every buffer used for the exchange is released before this returns,
    /// on success and on every error path.
    async fn send(
        &self,
        request: &ModelRequest<'_>,
        timeout: Duration,
    ) -> std::result::Result<ModelResponse, TransportError>;
}
