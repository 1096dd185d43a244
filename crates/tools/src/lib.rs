//! Device tool implementations for MicroClaw.
//!
//! Tools give the agent the ability to act on the board:
//! inspect memory and CPU, drive GPIO pins, light an LED strip,
//! and call webhooks.
//!
//! Every tool talks to hardware through the [`Board`] trait, so the same
//! catalog runs against real drivers or the in-memory [`SimulatedBoard`].

pub mod board;
pub mod gpio;
pub mod led_strip;
pub mod system;
pub mod webhook;

use microclaw_config::BoardConfig;
use microclaw_core::error::ToolError;
use microclaw_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::debug;

pub use board::{Board, BoardError, Rgb, SimulatedBoard};

/// Create the device tool registry for `board`.
///
/// - System tools are always present.
/// - GPIO tools are limited to `config.allowed_pins` (empty = every pin).
/// - LED strip tools are registered when the board has pixels.
/// - Webhook tools are opt-in via `config.webhooks`.
pub fn device_registry(
    board: Arc<dyn Board>,
    config: &BoardConfig,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(system::GetFreeMemoryTool::new(board.clone())))?;
    registry.register(Box::new(system::GetSystemInfoTool::new(board.clone())))?;
    registry.register(Box::new(system::SetCpuFrequencyTool::new(board.clone())))?;
    registry.register(Box::new(system::DelayTool))?;

    let gpio = gpio::Gpio::new(board.clone(), config.allowed_pins.clone());
    for tool in gpio::gpio_tools(gpio) {
        registry.register(tool)?;
    }

    if board.pixel_count() > 0 {
        registry.register(Box::new(led_strip::SetLedColorTool::new(board.clone())))?;
        registry.register(Box::new(led_strip::SetAllLedsTool::new(board.clone())))?;
        registry.register(Box::new(led_strip::ClearLedsTool::new(board)))?;
    }

    if config.webhooks {
        let webhook = webhook::Webhook::new()?;
        registry.register(Box::new(webhook::HttpGetTool(webhook.clone())))?;
        registry.register(Box::new(webhook::HttpPostTool(webhook)))?;
    }

    debug!(tools = registry.len(), "Device registry ready");
    Ok(registry)
}
