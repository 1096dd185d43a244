//! # MicroClaw Core
//!
//! Domain types, traits, and error definitions for the MicroClaw device agent.
//! This crate has **no I/O of its own**: it defines the domain model that the
//! transport, tool, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here. Implementations live in their respective crates:
//! - `Transport` (remote model endpoint) → `microclaw-providers`
//! - `Tool` (device operations) → `microclaw-tools`
//!
//! This keeps the agent loop testable against scripted transports and
//! simulated hardware.

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use agent::AgentStats;
pub use error::{Error, ErrorKind, Result, ToolError, TransportError};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, Message, MessageContent, Role};
pub use tool::{InputSchema, ParamKind, Tool, ToolArgs, ToolCall, ToolRegistry, ToolResult};
pub use transport::{ModelRequest, ModelResponse, StopReason, ToolDefinition, Transport, Usage};
