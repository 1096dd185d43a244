//! `microclaw event`: hand one external event to the agent.

use microclaw_agent::EventAgent;

use super::setup;

pub async fn run(event_type: &str, data: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = setup::load_config()?;
    let agent = setup::build_agent(&config)?;
    let mut events = EventAgent::from_config(agent, &config);
    setup::finish(events.handle_event(event_type, data).await)
}
