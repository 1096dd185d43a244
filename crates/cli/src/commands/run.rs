//! `microclaw run`: the scheduled agent loop.

use microclaw_agent::ScheduledAgent;
use tracing::{info, warn};

use super::setup;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = setup::load_config()?;
    let agent = setup::build_agent(&config)?;
    let hooks = setup::spawn_hooks(agent.event_bus());

    println!("MicroClaw: scheduled agent");
    println!("   Model:     {}", config.model);
    println!("   Interval:  {}s", config.agent.interval_seconds);
    println!("   Tools:     {}", agent.tools().names().join(", "));
    println!("   Press Ctrl+C to stop.");
    println!();

    let mut scheduled = ScheduledAgent::from_config(agent, &config);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C ({e}), running until killed");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };
    let cycles = scheduled.run_until(shutdown).await;
    hooks.abort();

    let stats = scheduled.stats();
    println!();
    println!("   Cycles:    {cycles} ({} failed)", stats.failed_cycles);
    println!("   API calls: {}", stats.api_calls);
    println!(
        "   Tokens:    {} in / {} out",
        stats.input_tokens, stats.output_tokens
    );
    Ok(())
}
