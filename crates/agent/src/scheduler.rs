//! Outer drivers around [`AgentLoop`]: a fixed-interval scheduler and an
//! event handler.

use std::future::Future;
use std::time::Duration;

use microclaw_config::AppConfig;
use microclaw_core::agent::AgentStats;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::conversation::ConversationStore;
use crate::loop_runner::{AgentLoop, CycleResult};

/// Runs the same prompt on a fixed interval, each cycle on a fresh history.
pub struct ScheduledAgent {
    agent: AgentLoop,
    history: ConversationStore,
    prompt: String,
    interval: Duration,
}

impl ScheduledAgent {
    pub fn new(
        agent: AgentLoop,
        history: ConversationStore,
        prompt: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            agent,
            history,
            prompt: prompt.into(),
            interval,
        }
    }

    pub fn from_config(agent: AgentLoop, config: &AppConfig) -> Self {
        Self::new(
            agent,
            ConversationStore::from_config(config),
            config.agent.recurring_prompt.clone(),
            Duration::from_secs(config.agent.interval_seconds),
        )
    }

    /// One scheduled cycle: fresh history, recurring prompt, then release
    /// the history again.
    pub async fn run_cycle(&mut self) -> CycleResult {
        self.history.clear();
        let result = self
            .agent
            .prompt(&mut self.history, self.prompt.clone())
            .await;
        self.history.clear();
        self.history.reclaim();
        result
    }

    /// Repeat [`run_cycle`](Self::run_cycle) until `shutdown` resolves.
    ///
    /// Cycles start `interval` apart; the time a cycle took is subtracted
    /// from the following sleep, and an over-long cycle is followed
    /// immediately by the next one. A shutdown that arrives mid-cycle takes
    /// effect once that cycle finishes. Returns the number of cycles run.
    pub async fn run_until<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0u64;

        loop {
            let started = Instant::now();
            cycles += 1;

            // A started cycle always reaches DONE or FAILED; shutdown is
            // only observed between cycles.
            let result = self.run_cycle().await;
            match &result {
                CycleResult::Done { rounds, .. } => {
                    debug!(cycle = cycles, rounds, "Scheduled cycle done")
                }
                CycleResult::Failed { kind, .. } => {
                    warn!(cycle = cycles, kind = %kind, "Scheduled cycle failed")
                }
            }

            let sleep = self.interval.saturating_sub(started.elapsed());
            if sleep.is_zero() {
                warn!(
                    interval_secs = self.interval.as_secs(),
                    "Cycle overran its interval, starting next one now"
                );
            } else {
                debug!(sleep_ms = sleep.as_millis() as u64, "Sleeping until next cycle");
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        info!(cycles, "Scheduler stopped");
        cycles
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn stats(&self) -> AgentStats {
        self.agent.stats()
    }
}

/// Turns external events into prompts.
pub struct EventAgent {
    agent: AgentLoop,
    history: ConversationStore,
    reset_after_event: bool,
}

impl EventAgent {
    pub fn new(agent: AgentLoop, history: ConversationStore, reset_after_event: bool) -> Self {
        Self {
            agent,
            history,
            reset_after_event,
        }
    }

    pub fn from_config(agent: AgentLoop, config: &AppConfig) -> Self {
        Self::new(
            agent,
            ConversationStore::from_config(config),
            config.agent.reset_after_event,
        )
    }

    /// Prompt format for one event.
    pub fn event_prompt(event_type: &str, data: &str) -> String {
        format!("[EVENT: {event_type}] {data}")
    }

    /// Run one cycle for an event such as a button press or sensor alert.
    pub async fn handle_event(&mut self, event_type: &str, data: &str) -> CycleResult {
        info!(event_type, "Handling event");
        let result = self
            .agent
            .prompt(&mut self.history, Self::event_prompt(event_type, data))
            .await;
        if self.reset_after_event {
            self.history.clear();
            self.history.reclaim();
        }
        result
    }

    pub fn history(&self) -> &ConversationStore {
        &self.history
    }

    pub fn stats(&self) -> AgentStats {
        self.agent.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use microclaw_core::event::EventBus;
    use microclaw_core::message::Role;
    use microclaw_core::tool::ToolRegistry;
    use std::sync::Arc;

    fn agent(transport: Arc<ScriptedTransport>) -> AgentLoop {
        AgentLoop::new(
            transport,
            Arc::new(ToolRegistry::new()),
            "mock-model",
            Arc::new(EventBus::default()),
        )
    }

    fn answers(n: usize) -> Vec<microclaw_core::ModelResponse> {
        (0..n).map(|i| text_response(&format!("status {i}"))).collect()
    }

    #[tokio::test]
    async fn scheduled_cycle_starts_fresh() {
        let transport = Arc::new(ScriptedTransport::responses(answers(2)));
        let mut scheduled = ScheduledAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            "Check sensors",
            Duration::from_secs(60),
        );

        assert_eq!(scheduled.run_cycle().await.text(), Some("status 0"));
        assert_eq!(scheduled.run_cycle().await.text(), Some("status 1"));

        for request in transport.requests() {
            assert_eq!(request.len(), 2);
            assert_eq!(request[1].text(), "Check sensors");
        }
        assert_eq!(scheduled.stats().cycles, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_subtracts_cycle_time() {
        let transport = Arc::new(
            ScriptedTransport::responses(answers(10)).with_delay(Duration::from_secs(2)),
        );
        let mut scheduled = ScheduledAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            "Check sensors",
            Duration::from_secs(10),
        );

        let cycles = scheduled
            .run_until(tokio::time::sleep(Duration::from_secs(25)))
            .await;

        assert_eq!(cycles, 3);
        assert_eq!(
            transport.call_gaps(),
            [Duration::from_secs(10), Duration::from_secs(10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_cycle_skips_sleep() {
        let transport = Arc::new(
            ScriptedTransport::responses(answers(10)).with_delay(Duration::from_secs(12)),
        );
        let mut scheduled = ScheduledAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            "Check sensors",
            Duration::from_secs(10),
        );

        scheduled
            .run_until(tokio::time::sleep(Duration::from_secs(30)))
            .await;

        assert_eq!(
            transport.call_gaps(),
            [Duration::from_secs(12), Duration::from_secs(12)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_cycle_in_flight() {
        let transport = Arc::new(
            ScriptedTransport::responses(answers(2)).with_delay(Duration::from_secs(10)),
        );
        let mut scheduled = ScheduledAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            "Check sensors",
            Duration::from_secs(60),
        );
        let begun = Instant::now();

        let cycles = scheduled
            .run_until(tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert_eq!(cycles, 1);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(scheduled.stats().cycles, 1);
        assert_eq!(scheduled.stats().failed_cycles, 0);
        assert!(begun.elapsed() >= Duration::from_secs(10));
        assert!(scheduled.history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycles_keep_the_schedule() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(microclaw_core::TransportError::malformed("garbage")),
            Ok(text_response("recovered")),
        ]));
        let mut scheduled = ScheduledAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            "Check sensors",
            Duration::from_secs(5),
        );

        scheduled
            .run_until(tokio::time::sleep(Duration::from_secs(7)))
            .await;

        assert_eq!(transport.call_count(), 2);
        assert_eq!(scheduled.stats().failed_cycles, 1);
        assert_eq!(scheduled.stats().cycles, 1);
    }

    #[tokio::test]
    async fn event_prompt_format() {
        let transport = Arc::new(ScriptedTransport::responses(answers(1)));
        let mut events = EventAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            true,
        );

        let result = events.handle_event("button_press", "pin 4 pressed").await;

        assert!(result.is_done());
        assert_eq!(
            transport.requests()[0][1].text(),
            "[EVENT: button_press] pin 4 pressed"
        );
        assert!(events.history().is_empty());
    }

    #[tokio::test]
    async fn events_can_share_history() {
        let transport = Arc::new(ScriptedTransport::responses(answers(2)));
        let mut events = EventAgent::new(
            agent(transport.clone()),
            ConversationStore::new("sys", 12, 16 * 1024),
            false,
        );

        events.handle_event("motion", "hallway").await;
        events.handle_event("motion", "kitchen").await;

        let second = &transport.requests()[1];
        let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(events.history().len(), 4);
    }
}
