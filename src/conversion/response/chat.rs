use serde::{Deserialize, Serialize};

use super::types::{
    AnthropicMessageResponse, AnthropicResponseBlock, build_message_response, map_tool_use_block,
    maybe_push_text,
};
use super::{anthropic_usage, map_finish_reason};

/// Upstream finish reasons. Anything outside this set is a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatUsage {
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptTokensDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

impl ChatCompletionResponse {
    pub fn total_tokens(&self) -> u64 {
        self.usage
            .as_ref()
            .map(|usage| {
                usage
                    .prompt_tokens
                    .saturating_add(usage.completion_tokens)
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    finish_reason: Option<FinishReason>,
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    tool_calls: Vec<ChatResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseToolCall {
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    id: String,
    #[serde(
        rename = "type",
        default = "default_tool_kind",
        deserialize_with = "tool_kind_or_default"
    )]
    kind: String,
    function: ChatResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ChatResponseFunction {
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    arguments: String,
}

fn default_tool_kind() -> String {
    crate::constants::TOOL_FUNCTION.to_string()
}

fn tool_kind_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_tool_kind))
}

/// Builds the one-shot Anthropic message. Text parts of every choice come
/// first, followed by their tool calls.
pub fn convert_chat_to_anthropic_response(
    response: &ChatCompletionResponse,
    requested_model: &str,
) -> AnthropicMessageResponse {
    let mut text_blocks = Vec::new();
    let mut tool_blocks = Vec::new();

    for message in response.choices.iter().filter_map(|choice| choice.message.as_ref()) {
        maybe_push_text(&mut text_blocks, message.content.as_deref());
        tool_blocks.extend(message.tool_calls.iter().filter_map(|tool_call| {
            map_tool_use_block(
                &tool_call.id,
                &tool_call.kind,
                &tool_call.function.name,
                &tool_call.function.arguments,
            )
        }));
    }

    let mut content: Vec<AnthropicResponseBlock> = text_blocks;
    content.extend(tool_blocks);

    let stop_reason = response
        .choices
        .iter()
        .rev()
        .find_map(|choice| choice.finish_reason)
        .map(map_finish_reason);

    build_message_response(
        response.id.clone(),
        response
            .model
            .clone()
            .unwrap_or_else(|| requested_model.to_string()),
        content,
        stop_reason,
        anthropic_usage(response.usage.as_ref(), true),
    )
}
