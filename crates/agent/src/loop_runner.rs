//! The agent cycle: request, interpret, dispatch tools, repeat.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use microclaw_config::AppConfig;
use microclaw_core::agent::AgentStats;
use microclaw_core::error::ErrorKind;
use microclaw_core::event::{DomainEvent, EventBus};
use microclaw_core::message::Message;
use microclaw_core::tool::ToolRegistry;
use microclaw_core::transport::{ModelRequest, StopReason, ToolDefinition, Transport};
use tracing::{debug, info, warn};

use crate::conversation::ConversationStore;
use crate::retry::{RetryPolicy, send_with_retry};

/// Appended as the final assistant message when a cycle runs out of
/// tool-dispatch rounds.
pub const ITERATION_LIMIT_MARKER: &str =
    "[Stopped: reached the tool iteration limit for this cycle]";

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Terminal state of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleResult {
    /// The model produced a final answer (or the round cap was hit).
    Done {
        text: String,
        /// Tool-dispatch rounds used
        rounds: u32,
        /// True when the cycle was cut off by the iteration cap
        truncated: bool,
    },
    /// A transport failure that retries could not recover.
    Failed { kind: ErrorKind, message: String },
}

impl CycleResult {
    pub fn is_done(&self) -> bool {
        matches!(self, CycleResult::Done { .. })
    }

    /// The final answer, if the cycle completed.
    pub fn text(&self) -> Option<&str> {
        match self {
            CycleResult::Done { text, .. } => Some(text),
            CycleResult::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CycleResult::Done { .. } => None,
            CycleResult::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Drives cycles against one transport and one tool catalog.
///
/// The loop never owns the history: callers pass the [`ConversationStore`]
/// by `&mut`, so the same loop serves one-shot, scheduled, and chat use.
pub struct AgentLoop {
    transport: Arc<dyn Transport>,

    tools: Arc<ToolRegistry>,

    /// Built once from the registry, which is immutable after setup
    tool_definitions: Vec<ToolDefinition>,

    model: String,

    max_tokens: u32,

    /// Per-request timeout
    timeout: Duration,

    retry: RetryPolicy,

    /// Tool-dispatch rounds allowed per cycle
    max_iterations: u32,

    event_bus: Arc<EventBus>,

    stats: AgentStats,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        transport: Arc<dyn Transport>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let tool_definitions = tools.schema_for_model();
        Self {
            transport,
            tools,
            tool_definitions,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            event_bus,
            stats: AgentStats::default(),
        }
    }

    /// Build a loop with every knob taken from the config.
    pub fn from_config(
        transport: Arc<dyn Transport>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(transport, tools, config.model.clone(), event_bus)
            .with_max_tokens(config.max_tokens)
            .with_timeout(Duration::from_secs(config.api_timeout_secs))
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_max_iterations(config.agent.max_iterations_per_cycle)
    }

    /// Set the maximum tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the number of tool-dispatch rounds per cycle (at least 1).
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Append a user message and run one cycle on it.
    pub async fn prompt(
        &mut self,
        history: &mut ConversationStore,
        text: impl Into<String>,
    ) -> CycleResult {
        self.record(history, Message::user(text));
        let result = self.run_cycle(history).await;
        history.reclaim();
        result
    }

    /// Run one cycle over `history` until DONE or FAILED.
    ///
    /// Never returns an error: transport failures become
    /// [`CycleResult::Failed`] and tool failures are fed back to the model
    /// as error results.
    pub async fn run_cycle(&mut self, history: &mut ConversationStore) -> CycleResult {
        info!(
            entries = history.len(),
            bytes = history.serialized_size(),
            "Starting cycle"
        );

        let mut rounds = 0u32;
        let mut turn = 0u32;

        loop {
            turn += 1;
            debug!(turn, est_tokens = history.estimated_tokens(), "Building request");

            // The request only borrows the history; it is gone before the
            // response is appended.
            let outcome = {
                let request = ModelRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    messages: history.to_request_payload(),
                    tools: &self.tool_definitions,
                };
                send_with_retry(&self.retry, self.transport.as_ref(), &request, self.timeout)
                    .await
            };

            let response = match outcome {
                Ok(response) => response,
                Err(e) => return self.fail(e.kind(), e.to_string()),
            };

            self.stats.record_call(response.usage);
            self.event_bus.publish(DomainEvent::ResponseReceived {
                model: self.model.clone(),
                turn,
                tokens_used: response
                    .usage
                    .map(|u| u.input_tokens + u.output_tokens)
                    .unwrap_or(0),
                timestamp: Utc::now(),
            });

            let stop_reason = response.stop_reason;
            let assistant = Message::assistant(response.content);
            let text = assistant.text();
            let calls = assistant.tool_calls();
            debug!(turn, ?stop_reason, tool_calls = calls.len(), "Model responded");

            // An assistant turn with no blocks is not a valid history entry.
            if !assistant.is_empty() {
                self.record(history, assistant);
            }

            if calls.is_empty() {
                return self.complete(text, rounds, false);
            }

            // Every recorded tool_use gets its result, even when the model
            // stopped for another reason.
            for call in &calls {
                let start = Instant::now();
                let result = self.tools.dispatch(call).await;
                self.event_bus.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: !result.is_error(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                });
                self.record(history, result.into_message());
            }

            rounds += 1;
            if stop_reason != StopReason::ToolUse {
                return self.complete(text, rounds, false);
            }
            if rounds >= self.max_iterations {
                warn!(
                    rounds,
                    max = self.max_iterations,
                    "Tool iteration limit reached, ending cycle"
                );
                self.record(history, Message::assistant_text(ITERATION_LIMIT_MARKER));
                return self.complete(ITERATION_LIMIT_MARKER.to_string(), rounds, true);
            }
        }
    }

    /// Append to the history, reporting any pruning.
    fn record(&self, history: &mut ConversationStore, message: Message) {
        let report = history.append(message);
        if report.removed > 0 {
            self.event_bus.publish(DomainEvent::HistoryPruned {
                removed: report.removed,
                remaining: history.len(),
                timestamp: Utc::now(),
            });
        }
    }

    fn complete(&mut self, text: String, rounds: u32, truncated: bool) -> CycleResult {
        self.stats.cycles += 1;
        info!(rounds, truncated, chars = text.len(), "Cycle complete");
        self.event_bus.publish(DomainEvent::CycleCompleted {
            text: text.clone(),
            rounds,
            timestamp: Utc::now(),
        });
        CycleResult::Done {
            text,
            rounds,
            truncated,
        }
    }

    fn fail(&mut self, kind: ErrorKind, message: String) -> CycleResult {
        self.stats.failed_cycles += 1;
        warn!(kind = %kind, error = %message, "Cycle failed");
        self.event_bus.publish(DomainEvent::CycleFailed {
            kind,
            message: message.clone(),
            timestamp: Utc::now(),
        });
        CycleResult::Failed { kind, message }
    }
}
