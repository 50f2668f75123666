mod chat;
mod types;

pub use chat::{ChatCompletionResponse, ChatUsage, FinishReason, convert_chat_to_anthropic_response};
pub use types::AnthropicUsage;

use crate::constants::{STOP_END_TURN, STOP_MAX_TOKENS, STOP_TOOL_USE};

pub fn map_finish_reason(finish_reason: FinishReason) -> &'static str {
    match finish_reason {
        FinishReason::Stop | FinishReason::ContentFilter => STOP_END_TURN,
        FinishReason::Length => STOP_MAX_TOKENS,
        FinishReason::ToolCalls => STOP_TOOL_USE,
    }
}

/// Anthropic usage as reported on `message_start`, `message_delta` and
/// one-shot responses. Cached prompt tokens are reported separately and
/// excluded from `input_tokens`.
pub fn anthropic_usage(usage: Option<&ChatUsage>, include_output: bool) -> AnthropicUsage {
    let cached_tokens = usage
        .and_then(|usage| usage.prompt_tokens_details.as_ref())
        .and_then(|details| details.cached_tokens);
    let prompt_tokens = usage.map(|usage| usage.prompt_tokens).unwrap_or(0);
    let output_tokens = if include_output {
        usage.map(|usage| usage.completion_tokens).unwrap_or(0)
    } else {
        0
    };

    AnthropicUsage {
        input_tokens: prompt_tokens.saturating_sub(cached_tokens.unwrap_or(0)),
        output_tokens,
        cache_read_input_tokens: cached_tokens,
    }
}
