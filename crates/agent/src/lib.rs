//! The agent loop: the heart of MicroClaw.
//!
//! One *cycle* runs a small state machine:
//!
//! 1. **Build** a request from the conversation history and tool catalog
//! 2. **Send** it through the transport (transient failures back off and retry)
//! 3. **If tool calls**: dispatch each in order, append the results, loop to 1
//! 4. **Otherwise**: the cycle is done with the model's text
//!
//! The loop ends when the model stops asking for tools, when the per-cycle
//! round cap is hit, or when the transport fails for good. It never returns
//! an error; see [`CycleResult`].

pub mod conversation;
pub mod loop_runner;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use conversation::{ConversationStore, PruneReport};
pub use loop_runner::{AgentLoop, CycleResult, ITERATION_LIMIT_MARKER};
pub use retry::{RetryPolicy, send_with_retry};
pub use scheduler::{EventAgent, ScheduledAgent};
