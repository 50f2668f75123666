use serde_json::{Value, json};

use crate::constants::TOOL_FUNCTION;
use crate::conversion::request::models::{ChatCompletionsPayload, ChatFunctionDefinition, ChatTool};
use crate::models::{AnthropicMessagesRequest, AnthropicTool, AnthropicToolChoice};

pub fn add_optional_request_fields(
    request: &AnthropicMessagesRequest,
    payload: &mut ChatCompletionsPayload,
) {
    if let Some(stop_sequences) = request
        .stop_sequences
        .as_ref()
        .filter(|sequences| !sequences.is_empty())
    {
        payload.stop = Some(json!(stop_sequences));
    }
    payload.temperature = request.temperature;
    payload.top_p = request.top_p;
    payload.user = request
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.user_id.clone());
}

pub fn add_tools(request: &AnthropicMessagesRequest, payload: &mut ChatCompletionsPayload) {
    let Some(tools) = &request.tools else {
        return;
    };

    let converted_tools: Vec<ChatTool> = tools.iter().filter_map(convert_single_tool).collect();
    if converted_tools.is_empty() {
        return;
    }
    payload.tools = Some(converted_tools);
}

fn convert_single_tool(tool: &AnthropicTool) -> Option<ChatTool> {
    let name = tool.name.trim();
    if name.is_empty() {
        return None;
    }

    let parameters = tool
        .input_schema
        .clone()
        .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));

    Some(ChatTool {
        tool_type: TOOL_FUNCTION.to_string(),
        function: ChatFunctionDefinition {
            name: name.to_string(),
            description: tool.description.clone(),
            parameters: Some(parameters),
        },
    })
}

pub fn add_tool_choice(request: &AnthropicMessagesRequest, payload: &mut ChatCompletionsPayload) {
    let Some(tool_choice) = &request.tool_choice else {
        return;
    };

    payload.tool_choice = Some(map_tool_choice(tool_choice));
}

fn map_tool_choice(tool_choice: &AnthropicToolChoice) -> Value {
    match tool_choice {
        AnthropicToolChoice::Auto {} => json!("auto"),
        AnthropicToolChoice::Any {} => json!("required"),
        AnthropicToolChoice::None {} => json!("none"),
        AnthropicToolChoice::Tool { name } => json!({
            "type": TOOL_FUNCTION,
            "function": {"name": name}
        }),
    }
}
