use serde::Serialize;
use serde_json::Value;

use crate::constants::ROLE_ASSISTANT;
use crate::conversion::response::AnthropicUsage;

/// Anthropic streaming events, serialized with an internal `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: MessageStartPayload,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentBlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaPayload,
        usage: AnthropicUsage,
    },
    MessageStop,
    Error {
        error: StreamErrorPayload,
    },
}

impl AnthropicStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Error { .. } => "error",
        }
    }

    pub(crate) fn message_start(id: &str, model: &str, usage: AnthropicUsage) -> Self {
        Self::MessageStart {
            message: MessageStartPayload {
                id: id.to_string(),
                message_type: "message",
                role: ROLE_ASSISTANT,
                content: Vec::new(),
                model: model.to_string(),
                stop_reason: None,
                stop_sequence: None,
                usage,
            },
        }
    }

    pub(crate) fn message_delta(stop_reason: &'static str, usage: AnthropicUsage) -> Self {
        Self::MessageDelta {
            delta: MessageDeltaPayload {
                stop_reason,
                stop_sequence: None,
            },
            usage,
        }
    }

    pub(crate) fn error(error_type: &'static str, message: &str) -> Self {
        Self::Error {
            error: StreamErrorPayload {
                error_type,
                message: message.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageStartPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub role: &'static str,
    pub content: Vec<Value>,
    pub model: String,
    pub stop_reason: Option<&'static str>,
    pub stop_sequence: Option<String>,
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDeltaPayload {
    pub stop_reason: &'static str,
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamErrorPayload {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub message: String,
}
