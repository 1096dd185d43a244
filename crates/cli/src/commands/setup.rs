//! Shared wiring for the commands that talk to the model.

use std::sync::Arc;

use microclaw_agent::{AgentLoop, CycleResult};
use microclaw_config::AppConfig;
use microclaw_core::event::{DomainEvent, EventBus};
use microclaw_providers::AnthropicTransport;
use microclaw_tools::{SimulatedBoard, device_registry};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

/// Load config and insist on an API key, with setup instructions if missing.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    MICROCLAW_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}

/// Transport, device tools, and agent loop for `config`.
pub fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let transport = Arc::new(AnthropicTransport::from_config(config)?);
    let board = Arc::new(SimulatedBoard::new(config.board.led_count));
    let tools = Arc::new(device_registry(board, &config.board)?);
    let event_bus = Arc::new(EventBus::default());
    Ok(AgentLoop::from_config(transport, tools, config, event_bus))
}

/// Print a finished cycle, or turn a failed one into an error.
pub fn finish(result: CycleResult) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        CycleResult::Done { text, .. } => {
            println!("{text}");
            Ok(())
        }
        CycleResult::Failed { kind, message } => Err(format!("Cycle failed ({kind}): {message}").into()),
    }
}

/// Response and error hooks: print every cycle outcome as it is published.
pub fn spawn_hooks(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::CycleCompleted {
                        text, timestamp, ..
                    } => {
                        println!("[{}] {text}", timestamp.format("%H:%M:%S"));
                    }
                    DomainEvent::CycleFailed {
                        kind,
                        message,
                        timestamp,
                    } => {
                        eprintln!("[{}] {kind} error: {message}", timestamp.format("%H:%M:%S"));
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Output hook fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
