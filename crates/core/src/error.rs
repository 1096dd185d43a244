//! Error types for the MicroClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`ErrorKind`] flattens them
//! into the taxonomy the agent loop applies recovery policy against.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The top-level error type for all MicroClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this error for recovery decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(e) => e.kind(),
            Error::Tool(e) => e.kind(),
            Error::Config { .. } => ErrorKind::Config,
        }
    }
}

// --- Bounded context errors ---

/// Failures of a single exchange with the remote model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failure, TLS failure, or timeout. No partial response is kept.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint explicitly asked us to slow down.
    #[error("Rate limited by endpoint (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-2xx status or a body that does not match the expected shape.
    #[error("Protocol error: {message} (status: {status})")]
    Protocol { status: u16, message: String },
}

impl TransportError {
    /// Shorthand for a malformed 200 response.
    pub fn malformed(message: impl Into<String>) -> Self {
        TransportError::Protocol {
            status: 200,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Network(_) => ErrorKind::Network,
            TransportError::RateLimited { .. } => ErrorKind::RateLimit,
            TransportError::Protocol { .. } => ErrorKind::Protocol,
        }
    }
}

/// Failures around tool registration and execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Error executing {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

impl ToolError {
    /// Build an execution failure for the named tool.
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::UnknownTool(_) => ErrorKind::UnknownTool,
            ToolError::ExecutionFailed { .. } | ToolError::InvalidArguments(_) => {
                ErrorKind::ToolExecution
            }
            ToolError::DuplicateTool(_) => ErrorKind::DuplicateTool,
        }
    }
}

/// The flat error taxonomy used for recovery policy and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    RateLimit,
    Protocol,
    UnknownTool,
    ToolExecution,
    DuplicateTool,
    Config,
}

impl ErrorKind {
    /// Transient errors are retried with backoff; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::RateLimit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Protocol => "protocol",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::DuplicateTool => "duplicate_tool",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_displays_status() {
        let err = Error::Transport(TransportError::Protocol {
            status: 400,
            message: "bad request".into(),
        });
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("bad request"));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn tool_error_displays_name() {
        let err = Error::Tool(ToolError::failed("digital_write", "pin 7 not allowed"));
        assert!(err.to_string().contains("digital_write"));
        assert!(err.to_string().contains("pin 7"));
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Network("reset".into()).kind().is_transient());
        assert!(
            TransportError::RateLimited { retry_after: None }
                .kind()
                .is_transient()
        );
        assert!(!TransportError::malformed("no content").kind().is_transient());
        assert!(!ToolError::DuplicateTool("x".into()).kind().is_transient());
    }

    #[test]
    fn invalid_arguments_is_execution_kind() {
        let err = ToolError::InvalidArguments("missing 'pin'".into());
        assert_eq!(err.kind(), ErrorKind::ToolExecution);
        assert_eq!(ToolError::UnknownTool("x".into()).kind(), ErrorKind::UnknownTool);
    }

    #[test]
    fn config_error_kind() {
        let err = Error::Config {
            message: "no API key".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "Configuration error: no API key");
    }
}
