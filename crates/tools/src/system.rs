//! System tools: work on any board without external hardware.

use async_trait::async_trait;
use microclaw_core::error::ToolError;
use microclaw_core::tool::{InputSchema, ParamKind, Tool, ToolArgs};
use std::sync::Arc;
use std::time::Duration;

use crate::board::{Board, CPU_FREQUENCIES_MHZ};

/// Longest pause the model may request with `delay`.
pub const MAX_DELAY_MS: i64 = 10_000;

pub struct GetFreeMemoryTool {
    board: Arc<dyn Board>,
}

impl GetFreeMemoryTool {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for GetFreeMemoryTool {
    fn name(&self) -> &str {
        "get_free_memory"
    }

    fn description(&self) -> &str {
        "Get the current free heap memory on the board. Use this to monitor memory usage."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
    }

    async fn execute(&self, _args: ToolArgs) -> Result<String, ToolError> {
        let mem = self.board.memory();
        Ok(format!(
            "Free: {} bytes, Used: {} bytes, Total: {} bytes ({}% free)",
            mem.free,
            mem.used,
            mem.total(),
            mem.percent_free()
        ))
    }
}

pub struct GetSystemInfoTool {
    board: Arc<dyn Board>,
}

impl GetSystemInfoTool {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for GetSystemInfoTool {
    fn name(&self) -> &str {
        "get_system_info"
    }

    fn description(&self) -> &str {
        "Get board information (platform, firmware, CPU frequency, flash storage, uptime)."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
    }

    async fn execute(&self, _args: ToolArgs) -> Result<String, ToolError> {
        let info = self.board.system_info();
        Ok(format!(
            "Platform: {}, Firmware: {}, CPU: {}MHz, Flash free: {}KB / {}KB, Uptime: {}s",
            info.platform,
            info.firmware,
            info.cpu_mhz,
            info.flash_free_kb,
            info.flash_total_kb,
            info.uptime_ms / 1000
        ))
    }
}

pub struct SetCpuFrequencyTool {
    board: Arc<dyn Board>,
}

impl SetCpuFrequencyTool {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for SetCpuFrequencyTool {
    fn name(&self) -> &str {
        "set_cpu_frequency"
    }

    fn description(&self) -> &str {
        "Set the CPU frequency. Lower = less power. Options: 80, 160, 240 MHz."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty().required("mhz", ParamKind::Integer, "Frequency in MHz: 80, 160, or 240")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let mhz = args.i64("mhz")?;
        let mhz = u32::try_from(mhz)
            .ok()
            .filter(|m| CPU_FREQUENCIES_MHZ.contains(m))
            .ok_or_else(|| {
                ToolError::InvalidArguments("frequency must be 80, 160, or 240 MHz".into())
            })?;

        self.board
            .set_cpu_frequency(mhz)
            .map_err(|e| ToolError::failed(self.name(), e.to_string()))?;
        Ok(format!("CPU frequency set to {mhz}MHz"))
    }
}

/// Cooperative pause; yields to the runtime instead of blocking it.
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Wait for a specified number of milliseconds (at most 10000)."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty().required("milliseconds", ParamKind::Integer, "Milliseconds to wait")
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let ms = args.i64("milliseconds")?;
        if !(0..=MAX_DELAY_MS).contains(&ms) {
            return Err(ToolError::InvalidArguments(format!(
                "milliseconds must be between 0 and {MAX_DELAY_MS}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        Ok(format!("Slept for {ms}ms"))
    }
}
