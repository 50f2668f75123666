use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{ROLE_ASSISTANT, ROLE_TOOL, TOOL_FUNCTION};

/// Upstream chat-completions request. Unknown fields sent by OpenAI-protocol
/// clients are carried through `extra` untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionsPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionsPayload {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn enable_stream_usage(&mut self) {
        self.stream_options = Some(StreamOptions {
            include_usage: true,
        });
    }

    /// Any prior assistant or tool turn marks the call as agent-initiated.
    pub fn is_agent_call(&self) -> bool {
        self.messages
            .iter()
            .any(|message| message.role == ROLE_ASSISTANT || message.role == ROLE_TOOL)
    }

    pub fn has_image_input(&self) -> bool {
        self.messages.iter().any(|message| match &message.content {
            Some(ChatMessageContent::Parts(parts)) => parts.iter().any(ChatContentPart::is_image),
            _ => false,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatMessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(ChatMessageContent::Text(text.into())),
            ..Default::default()
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: ROLE_TOOL.to_string(),
            content: Some(ChatMessageContent::Text(text.into())),
            tool_call_id: Some(tool_call_id.into()),
            ..Default::default()
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChatContentPart {
    Typed(TypedContentPart),
    Other(Value),
}

impl ChatContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Typed(TypedContentPart::Text { text: text.into() })
    }

    pub fn image_url(url: String) -> Self {
        Self::Typed(TypedContentPart::ImageUrl {
            image_url: ImageUrl { url, detail: None },
        })
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Typed(TypedContentPart::ImageUrl { .. }))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: ChatFunctionDefinition,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatFunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ChatFunctionCall,
}

impl ChatToolCall {
    pub fn function(id: String, name: String, arguments: String) -> Self {
        Self {
            id,
            call_type: TOOL_FUNCTION.to_string(),
            function: ChatFunctionCall { name, arguments },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}
