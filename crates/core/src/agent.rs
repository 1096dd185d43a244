//! Agent runtime statistics.

use serde::{Deserialize, Serialize};

use crate::transport::Usage;

/// Counters accumulated over the agent's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Prompt tokens reported by the endpoint
    pub input_tokens: u64,

    /// Completion tokens reported by the endpoint
    pub output_tokens: u64,

    /// Successful model turns
    pub api_calls: u64,

    /// Cycles that reached DONE
    pub cycles: u64,

    /// Cycles that ended FAILED
    pub failed_cycles: u64,
}

impl AgentStats {
    /// Record one successful exchange.
    pub fn record_call(&mut self, usage: Option<Usage>) {
        self.api_calls += 1;
        if let Some(usage) = usage {
            self.input_tokens += u64::from(usage.input_tokens);
            self.output_tokens += u64::from(usage.output_tokens);
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
