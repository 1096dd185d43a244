//! Shared test helpers for agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use microclaw_core::error::TransportError;
use microclaw_core::message::{ContentBlock, Message};
use microclaw_core::transport::{ModelRequest, ModelResponse, StopReason, Transport, Usage};
use tokio::time::Instant;

/// A mock transport that replays a script of results.
///
/// Each call to `send` pops the next entry. Once the script runs out every
/// further call is a protocol error, so a loop that over-calls fails loudly.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ModelResponse, TransportError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    calls: Mutex<Vec<Instant>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<ModelResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Script made only of successful responses.
    pub fn responses(responses: Vec<ModelResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Pretend each exchange takes `delay` of (tokio) time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Time between consecutive calls.
    pub fn call_gaps(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }

    /// Every message list that was sent, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(
        &self,
        request: &ModelRequest<'_>,
        _timeout: Duration,
    ) -> Result<ModelResponse, TransportError> {
        self.calls.lock().unwrap().push(Instant::now());
        self.requests
            .lock()
            .unwrap()
            .push(request.messages.iter().map(|m| (*m).clone()).collect());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::malformed("script exhausted")))
    }
}

/// A final text answer with some token usage.
pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
        }),
        ..ModelResponse::text(text)
    }
}

/// A `tool_use` turn requesting the given calls.
pub fn tool_use_response(calls: Vec<ContentBlock>) -> ModelResponse {
    ModelResponse {
        usage: Some(Usage {
            input_tokens: 20,
            output_tokens: 8,
        }),
        ..ModelResponse::tool_use(calls)
    }
}

/// Helper to create a tool_use block.
pub fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

/// A response whose stop reason is `tool_use` but that carries no calls.
pub fn empty_tool_use_response() -> ModelResponse {
    ModelResponse {
        stop_reason: StopReason::ToolUse,
        content: vec![ContentBlock::text("Nothing to do.")],
        usage: None,
    }
}
