//! Bounded conversation history.
//!
//! The store keeps the permanent system message apart from the ordered
//! entries and enforces two ceilings on the entries after every mutation:
//! an entry count and an approximate serialized size. Pruning is FIFO and
//! deterministic; when only one entry is left and it alone exceeds the byte
//! budget, its content is truncated with a marker instead.

use std::collections::VecDeque;

use microclaw_config::MIN_HISTORY_BYTES;
use microclaw_core::message::{ContentBlock, Message, MessageContent, Role};
use tracing::debug;

/// Characters per token used by [`ConversationStore::estimated_tokens`].
const CHARS_PER_TOKEN: usize = 4;

/// What a single append had to drop to stay within the caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries removed from the front
    pub removed: usize,
    /// Whether the oldest remaining entry was truncated
    pub truncated: bool,
}

impl PruneReport {
    pub fn is_noop(&self) -> bool {
        self.removed == 0 && !self.truncated
    }
}

/// Ordered, bounded message history with a permanent system message.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    system: Message,
    entries: VecDeque<Message>,
    /// Serialized size of each entry, parallel to `entries`.
    sizes: VecDeque<usize>,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl ConversationStore {
    /// Create an empty history.
    ///
    /// `max_entries` is raised to 1 and `max_bytes` to [`MIN_HISTORY_BYTES`]
    /// if smaller, so a single truncated entry always fits.
    pub fn new(system_prompt: impl Into<String>, max_entries: usize, max_bytes: usize) -> Self {
        Self {
            system: Message::system(system_prompt),
            entries: VecDeque::new(),
            sizes: VecDeque::new(),
            total_bytes: 0,
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(MIN_HISTORY_BYTES),
        }
    }

    /// Build from the `[history]` and `[agent]` config sections.
    pub fn from_config(config: &microclaw_config::AppConfig) -> Self {
        Self::new(
            config.agent.system_prompt.clone(),
            config.history.max_entries,
            config.history.max_bytes,
        )
    }

    /// Add a message to the end, then prune.
    ///
    /// A system message is never stored as an entry; it replaces the
    /// permanent one instead.
    pub fn append(&mut self, message: Message) -> PruneReport {
        if message.role == Role::System {
            self.system = message;
            return PruneReport::default();
        }

        let size = message.serialized_len();
        self.entries.push_back(message);
        self.sizes.push_back(size);
        self.total_bytes = self.total_bytes.saturating_add(size);
        self.prune()
    }

    /// Restore both ceilings.
    ///
    /// 1. Drop the oldest entries while either cap is exceeded, never going
    ///    below one entry.
    /// 2. If anything was dropped, also drop leading `tool_result` entries
    ///    whose `tool_use` went with it. A last one that must stay becomes a
    ///    plain user entry.
    /// 3. If the last entry alone is over budget, truncate it.
    pub fn prune(&mut self) -> PruneReport {
        let mut report = PruneReport::default();

        while (self.entries.len() > self.max_entries || self.total_bytes > self.max_bytes)
            && self.entries.len() > 1
        {
            self.pop_front();
            report.removed += 1;
        }

        if report.removed > 0 {
            while self.entries.len() > 1
                && self
                    .entries
                    .front()
                    .is_some_and(|m| m.role == Role::ToolResult)
            {
                self.pop_front();
                report.removed += 1;
            }
            self.demote_orphan_front();
        }

        if self.total_bytes > self.max_bytes {
            if let (Some(front), Some(size)) = (self.entries.front_mut(), self.sizes.front_mut()) {
                front.truncate_to(self.max_bytes);
                let new_size = front.serialized_len();
                self.total_bytes = self.total_bytes - *size + new_size;
                *size = new_size;
                report.truncated = true;
            }
        }

        if !report.is_noop() {
            debug!(
                removed = report.removed,
                truncated = report.truncated,
                remaining = self.entries.len(),
                bytes = self.total_bytes,
                "History pruned"
            );
        }
        report
    }

    /// A lone leading `tool_result` has lost its `tool_use`; keep its text
    /// as a user entry so the request stays well formed.
    fn demote_orphan_front(&mut self) {
        let (Some(front), Some(size)) = (self.entries.front_mut(), self.sizes.front_mut()) else {
            return;
        };
        if front.role != Role::ToolResult {
            return;
        }

        let outcome = match &front.content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            MessageContent::Text(text) => text.clone(),
        };
        *front = Message::user(format!("[earlier tool result] {outcome}"));

        let new_size = front.serialized_len();
        self.total_bytes = self.total_bytes - *size + new_size;
        *size = new_size;
    }

    fn pop_front(&mut self) {
        self.entries.pop_front();
        if let Some(size) = self.sizes.pop_front() {
            self.total_bytes -= size;
        }
    }

    /// Ordered view for a request: system message first, then the entries
    /// in insertion order, borrowed as-is.
    pub fn to_request_payload(&self) -> Vec<&Message> {
        let mut payload = Vec::with_capacity(self.entries.len() + 1);
        payload.push(&self.system);
        payload.extend(self.entries.iter());
        payload
    }

    /// Drop every entry; the system message stays.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.sizes.clear();
        self.total_bytes = 0;
    }

    /// Give spare capacity back to the allocator.
    pub fn reclaim(&mut self) {
        self.entries.shrink_to_fit();
        self.sizes.shrink_to_fit();
    }

    pub fn system(&self) -> &Message {
        &self.system
    }

    pub fn entries(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.back()
    }

    /// Number of entries, excluding the system message.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate serialized size of the entries (system excluded).
    pub fn serialized_size(&self) -> usize {
        self.total_bytes
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Rough token count of everything that would be sent.
    pub fn estimated_tokens(&self) -> usize {
        (self.system.serialized_len() + self.total_bytes).div_ceil(CHARS_PER_TOKEN)
    }
}
