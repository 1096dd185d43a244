//! Model endpoint transports for MicroClaw.
//!
//! All transports implement the `microclaw_core::Transport` trait. The agent
//! loop owns retry and backoff; a transport issues exactly one request per
//! call.

pub mod anthropic;

pub use anthropic::AnthropicTransport;
