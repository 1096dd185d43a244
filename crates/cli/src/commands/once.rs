//! `microclaw once`: run a single cycle and print the answer.

use microclaw_agent::ConversationStore;
use tracing::debug;

use super::setup;

pub async fn run(prompt: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = setup::load_config()?;
    let mut agent = setup::build_agent(&config)?;
    let mut history = ConversationStore::from_config(&config);

    let prompt = prompt.unwrap_or_else(|| config.agent.recurring_prompt.clone());
    let result = agent.prompt(&mut history, prompt).await;

    let stats = agent.stats();
    debug!(
        api_calls = stats.api_calls,
        tokens = stats.total_tokens(),
        "Single cycle finished"
    );
    setup::finish(result)
}
