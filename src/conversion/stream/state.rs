use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallEntry {
    pub id: String,
    pub name: String,
    pub block_index: usize,
}

/// Per-response translation state. At most one content block is open, and
/// `content_block_index` only moves forward when a block closes ahead of a
/// new one.
#[derive(Debug, Default)]
pub struct StreamState {
    pub message_start_sent: bool,
    pub content_block_index: usize,
    pub content_block_open: bool,
    pub message_stop_sent: bool,
    pub tool_calls: HashMap<usize, ToolCallEntry>,
}

impl StreamState {
    pub fn is_tool_block_open(&self) -> bool {
        self.content_block_open
            && self
                .tool_calls
                .values()
                .any(|entry| entry.block_index == self.content_block_index)
    }
}
