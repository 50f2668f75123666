use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::constants::{ROLE_ASSISTANT, TOOL_FUNCTION};

#[derive(Debug, Serialize)]
pub struct AnthropicMessageResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: &'static str,
    pub role: &'static str,
    pub model: String,
    pub content: Vec<AnthropicResponseBlock>,
    pub stop_reason: Option<&'static str>,
    pub stop_sequence: Option<String>,
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

pub(crate) fn build_message_response(
    id: Option<String>,
    model: String,
    content: Vec<AnthropicResponseBlock>,
    stop_reason: Option<&'static str>,
    usage: AnthropicUsage,
) -> AnthropicMessageResponse {
    AnthropicMessageResponse {
        id: id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("msg_{}", Uuid::new_v4().simple())),
        response_type: "message",
        role: ROLE_ASSISTANT,
        model,
        content,
        stop_reason,
        stop_sequence: None,
        usage,
    }
}

pub(crate) fn maybe_push_text(content_blocks: &mut Vec<AnthropicResponseBlock>, text: Option<&str>) {
    let Some(text) = text.filter(|text| !text.is_empty()) else {
        return;
    };
    content_blocks.push(AnthropicResponseBlock::Text {
        text: text.to_string(),
    });
}

pub(crate) fn map_tool_use_block(
    id: &str,
    kind: &str,
    name: &str,
    arguments: &str,
) -> Option<AnthropicResponseBlock> {
    if kind != TOOL_FUNCTION {
        warn!(
            phase = "drop_tool_use",
            reason = "unsupported_tool_call_type",
            tool_call_type = kind,
            tool_call_id = id,
            tool_name = name,
            "Dropping upstream tool_call with unsupported type"
        );
        return None;
    }

    let tool_call_id = id.trim();
    if tool_call_id.is_empty() {
        warn!(
            phase = "drop_tool_use",
            reason = "empty_tool_call_id",
            tool_name = name,
            "Dropping upstream tool_call with empty id"
        );
        return None;
    }

    Some(AnthropicResponseBlock::ToolUse {
        id: tool_call_id.to_string(),
        name: name.to_string(),
        input: parse_tool_arguments(arguments),
    })
}

fn parse_tool_arguments(arguments_raw: &str) -> Value {
    if arguments_raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str::<Value>(arguments_raw).unwrap_or_else(|_| {
        Value::Object(
            [(
                "raw_arguments".to_string(),
                Value::String(arguments_raw.to_string()),
            )]
            .into_iter()
            .collect(),
        )
    })
}
