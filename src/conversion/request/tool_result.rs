use serde_json::Value;
use tracing::warn;

use crate::constants::CONTENT_TEXT;
use crate::conversion::request::models::ChatMessage;
use crate::models::{AnthropicContent, AnthropicContentBlock};

pub fn convert_tool_results(content: &AnthropicContent) -> Vec<ChatMessage> {
    let AnthropicContent::Blocks(blocks) = content else {
        return Vec::new();
    };

    blocks.iter().filter_map(convert_tool_result_block).collect()
}

fn convert_tool_result_block(block: &AnthropicContentBlock) -> Option<ChatMessage> {
    let AnthropicContentBlock::ToolResult {
        tool_use_id,
        content,
        ..
    } = block
    else {
        return None;
    };

    let tool_use_id = tool_use_id.trim();
    if tool_use_id.is_empty() {
        warn!(
            phase = "drop_tool_result",
            reason = "empty_tool_use_id",
            "Dropping tool_result block"
        );
        return None;
    }

    Some(ChatMessage::tool_result(
        tool_use_id,
        parse_tool_result_content(content.as_ref()),
    ))
}

fn parse_tool_result_content(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return String::new();
    };

    match content {
        Value::Null => String::new(),
        Value::String(text) => text.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| extract_item_text(item).unwrap_or_else(|| item.to_string()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => extract_item_text(other).unwrap_or_else(|| other.to_string()),
    }
}

fn extract_item_text(item: &Value) -> Option<String> {
    if let Some(text) = item.as_str() {
        return Some(text.to_string());
    }
    if item.get("type").and_then(Value::as_str) != Some(CONTENT_TEXT) {
        return None;
    }
    item.get("text").and_then(Value::as_str).map(ToOwned::to_owned)
}
