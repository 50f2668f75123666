use serde_json::Value;
use tracing::warn;

use crate::constants::ROLE_ASSISTANT;
use crate::conversion::request::models::{ChatMessage, ChatMessageContent, ChatToolCall};
use crate::models::{AnthropicContent, AnthropicContentBlock};

pub fn convert_assistant_message(content: &AnthropicContent) -> ChatMessage {
    let blocks = match content {
        AnthropicContent::Text(text) => return ChatMessage::text(ROLE_ASSISTANT, text.as_str()),
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let (text_parts, tool_calls) = extract_assistant_parts(blocks);
    let content = (!text_parts.is_empty()).then(|| ChatMessageContent::Text(text_parts.join("\n\n")));

    ChatMessage {
        role: ROLE_ASSISTANT.to_string(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        ..Default::default()
    }
}

fn extract_assistant_parts(blocks: &[AnthropicContentBlock]) -> (Vec<&str>, Vec<ChatToolCall>) {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => text_parts.push(text.as_str()),
            AnthropicContentBlock::Thinking { thinking, .. } => text_parts.push(thinking.as_str()),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                if let Some(tool_call) = build_tool_call(id, name, input) {
                    tool_calls.push(tool_call);
                }
            }
            _ => {}
        }
    }

    (text_parts, tool_calls)
}

fn build_tool_call(id: &str, name: &str, input: &Value) -> Option<ChatToolCall> {
    let tool_id = id.trim();
    if tool_id.is_empty() {
        warn!(
            phase = "drop_tool_use",
            reason = "empty_id",
            "Dropping assistant tool_use block"
        );
        return None;
    }

    let tool_name = name.trim();
    if tool_name.is_empty() {
        warn!(
            phase = "drop_tool_use",
            reason = "empty_name",
            tool_id,
            "Dropping assistant tool_use block"
        );
        return None;
    }

    let arguments = match input {
        Value::Null => "{}".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string()),
    };

    Some(ChatToolCall::function(
        tool_id.to_string(),
        tool_name.to_string(),
        arguments,
    ))
}
