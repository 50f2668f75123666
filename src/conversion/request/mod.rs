mod assistant;
mod models;
mod system;
mod tool_result;
mod tools;
mod user;

pub use models::{
    ChatCompletionsPayload, ChatContentPart, ChatMessage, ChatMessageContent, TypedContentPart,
};

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::constants::ROLE_SYSTEM;
use crate::models::{AnthropicMessage, AnthropicMessagesRequest, AnthropicRole};
use assistant::convert_assistant_message;
use system::extract_system_text;
use tool_result::convert_tool_results;
use tools::{add_optional_request_fields, add_tool_choice, add_tools};
use user::convert_user_message;

/// Maps an Anthropic Messages request onto the upstream chat-completions shape.
pub fn translate_messages_request(request: &AnthropicMessagesRequest) -> ChatCompletionsPayload {
    let mut messages: Vec<ChatMessage> = Vec::new();

    push_system_message(request, &mut messages);
    convert_message_list(&request.messages, &mut messages);

    let mut payload = ChatCompletionsPayload {
        model: request.model.clone(),
        messages,
        max_tokens: Some(request.max_tokens),
        stream: Some(request.is_streaming()),
        ..Default::default()
    };
    add_optional_request_fields(request, &mut payload);
    add_tools(request, &mut payload);
    add_tool_choice(request, &mut payload);

    if payload.is_streaming() {
        payload.enable_stream_usage();
    }

    trace!(
        phase = "upstream_request_full",
        upstream_request = %serde_json::to_string(&payload).unwrap_or_default(),
        "Converted request for upstream (full)"
    );

    debug!(
        phase = "upstream_request_summary",
        upstream_model = %payload.model,
        stream = payload.is_streaming(),
        max_tokens = ?payload.max_tokens,
        messages_len = payload.messages.len(),
        tools_len = payload.tools.as_ref().map(Vec::len).unwrap_or(0),
        has_tool_choice = payload.tool_choice.is_some(),
        "Converted request for upstream (summary)"
    );

    payload
}

fn push_system_message(request: &AnthropicMessagesRequest, messages: &mut Vec<ChatMessage>) {
    let Some(system) = &request.system else {
        return;
    };
    let system_text = extract_system_text(system);
    if system_text.trim().is_empty() {
        return;
    }
    messages.push(ChatMessage::text(ROLE_SYSTEM, system_text.trim()));
}

fn convert_message_list(source: &[AnthropicMessage], messages: &mut Vec<ChatMessage>) {
    let mut seen_tool_call_ids = HashSet::new();

    for message in source {
        match message.role {
            AnthropicRole::User => {
                for tool_message in convert_tool_results(&message.content) {
                    let Some(tool_call_id) = tool_message.tool_call_id() else {
                        continue;
                    };
                    if !seen_tool_call_ids.contains(tool_call_id) {
                        warn!(
                            phase = "drop_tool_result",
                            reason = "unknown_tool_call_id",
                            tool_call_id,
                            known_ids_count = seen_tool_call_ids.len(),
                            "Dropping tool message with unknown tool_call_id"
                        );
                        continue;
                    }
                    messages.push(tool_message);
                }

                if let Some(user_message) = convert_user_message(&message.content) {
                    messages.push(user_message);
                }
            }
            AnthropicRole::Assistant => {
                let assistant_message = convert_assistant_message(&message.content);
                for tool_call in assistant_message.tool_calls.iter().flatten() {
                    seen_tool_call_ids.insert(tool_call.id.clone());
                }
                messages.push(assistant_message);
            }
        }
    }
}
