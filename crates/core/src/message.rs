//! Message and content-block domain types.
//!
//! These are the value objects that flow through the whole cycle:
//! the scheduler appends a prompt → the transport sends the history → the
//! model answers with content blocks → tool results are appended as messages.

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Marker left in place of content removed by the truncation fallback.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions (never pruned)
    System,
    /// The prompt source (scheduler, event, or person)
    User,
    /// The remote model
    Assistant,
    /// Outcome of a local tool invocation
    ToolResult,
}

/// A single block of structured content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Mutable access to the free-text payload of this block, if any.
    fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::ToolResult { content, .. } => Some(content),
            ContentBlock::ToolUse { .. } => None,
        }
    }
}

/// Message content: plain text or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message
    pub role: Role,

    /// Text or structured blocks, kept in their original form
    pub content: MessageContent,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message holding every block of a model turn.
    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a tool result message correlated to a tool_use id.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::ToolResult,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }]),
        }
    }

    /// All text blocks joined by newlines (tool blocks are skipped).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Tool calls requested in this message, in the order they appear.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Whether any block is a `tool_use`.
    pub fn has_tool_use(&self) -> bool {
        matches!(&self.content, MessageContent::Blocks(blocks)
            if blocks.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })))
    }

    /// True for empty text or an empty block list.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// Approximate wire size: the length of this message's compact JSON.
    ///
    /// Counted through a sink writer so no intermediate buffer is allocated.
    pub fn serialized_len(&self) -> usize {
        let mut counter = ByteCounter(0);
        match serde_json::to_writer(&mut counter, self) {
            Ok(()) => counter.0,
            // Serializing plain strings and JSON values cannot fail; treat a
            // failure as "infinitely large" so the caller prunes it.
            Err(_) => usize::MAX,
        }
    }

    /// Shrink the textual payload until the message serializes within `max_bytes`.
    ///
    /// The largest text-bearing block is cut first and suffixed with
    /// [`TRUNCATION_MARKER`]. If the structure alone still exceeds the budget
    /// (e.g. a huge `tool_use` input), the content collapses to the marker.
    /// Returns `true` if anything was changed.
    pub fn truncate_to(&mut self, max_bytes: usize) -> bool {
        let mut changed = false;

        loop {
            let size = self.serialized_len();
            if size <= max_bytes {
                return changed;
            }
            let excess = size - max_bytes;

            let Some(field) = self.largest_text_mut() else {
                break;
            };
            if field.len() <= TRUNCATION_MARKER.len() {
                break;
            }

            let keep = field.len().saturating_sub(excess + TRUNCATION_MARKER.len());
            let cut = floor_char_boundary(field, keep);
            field.truncate(cut);
            field.push_str(TRUNCATION_MARKER);
            changed = true;
        }

        if self.serialized_len() > max_bytes {
            self.content = MessageContent::Text(TRUNCATION_MARKER.to_string());
            changed = true;
        }
        changed
    }

    fn largest_text_mut(&mut self) -> Option<&mut String> {
        match &mut self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(blocks) => blocks
                .iter_mut()
                .filter_map(ContentBlock::text_mut)
                .max_by_key(|s| s.len()),
        }
    }
}

/// Largest index `<= index` that sits on a UTF-8 character boundary.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// `io::Write` sink that only counts bytes.
struct ByteCounter(usize);

impl std::io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Check the soil");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Check the soil");
        assert!(!msg.has_tool_use());
    }

    #[test]
    fn assistant_text_joins_text_blocks_only() {
        let msg = Message::assistant(vec![
            ContentBlock::text("Reading sensor"),
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "read_temperature".into(),
                input: serde_json::json!({}),
            },
            ContentBlock::text("then deciding"),
        ]);
        assert_eq!(msg.text(), "Reading sensor\nthen deciding");
        assert!(msg.has_tool_use());
    }

    #[test]
    fn tool_calls_preserve_order() {
        let msg = Message::assistant(vec![
            ContentBlock::ToolUse {
                id: "a".into(),
                name: "first".into(),
                input: serde_json::json!({"pin": 2}),
            },
            ContentBlock::ToolUse {
                id: "b".into(),
                name: "second".into(),
                input: serde_json::json!({}),
            },
        ]);
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].arguments["pin"], 2);
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn serialized_len_matches_json() {
        let msg = Message::tool_result("toolu_9", "Pin 2 set to HIGH", false);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(msg.serialized_len(), json.len());
        assert!(json.contains("\"type\":\"tool_result\""));
        assert!(json.contains("\"role\":\"tool_result\""));
    }

    #[test]
    fn truncate_text_message_fits_budget() {
        let mut msg = Message::user("x".repeat(2_000));
        assert!(msg.truncate_to(300));
        assert!(msg.serialized_len() <= 300);
        assert!(msg.text().ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncate_cuts_largest_block() {
        let mut msg = Message::assistant(vec![
            ContentBlock::text("short"),
            ContentBlock::text("y".repeat(1_000)),
        ]);
        assert!(msg.truncate_to(400));
        assert!(msg.serialized_len() <= 400);
        let text = msg.text();
        assert!(text.starts_with("short\n"));
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut msg = Message::user("é".repeat(500));
        assert!(msg.truncate_to(200));
        assert!(msg.serialized_len() <= 200);
        // Still valid UTF-8 and carries the marker.
        assert!(msg.text().ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn oversized_tool_use_collapses_to_marker() {
        let mut msg = Message::assistant(vec![ContentBlock::ToolUse {
            id: "toolu_big".into(),
            name: "http_post".into(),
            input: serde_json::json!({"body": "z".repeat(4_000)}),
        }]);
        assert!(msg.truncate_to(256));
        assert!(msg.serialized_len() <= 256);
        assert_eq!(msg.content, MessageContent::Text(TRUNCATION_MARKER.into()));
    }

    #[test]
    fn truncate_noop_when_within_budget() {
        let mut msg = Message::user("fits");
        assert!(!msg.truncate_to(1_000));
        assert_eq!(msg.text(), "fits");
    }

    #[test]
    fn content_blocks_roundtrip_structurally() {
        let msg = Message::assistant(vec![ContentBlock::ToolUse {
            id: "toolu_1".into(),
            name: "set_led".into(),
            input: serde_json::json!({"state": true}),
        }]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn empty_messages() {
        assert!(Message::assistant(vec![]).is_empty());
        assert!(Message::user("").is_empty());
        assert!(!Message::assistant_text("LED on.").is_empty());
    }
}
