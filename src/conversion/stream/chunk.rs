use serde::{Deserialize, Serialize};

use crate::conversion::response::{ChatUsage, FinishReason};

/// One decoded `data:` payload of an upstream chat-completions stream.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub model: String,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkChoice {
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub index: usize,
    #[serde(default, deserialize_with = "crate::utils::null_as_default")]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkToolCall {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ChunkFunction>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ChunkToolCall {
    /// Both id and name present: the first fragment of a new call.
    pub fn opening(&self) -> Option<(&str, &str)> {
        let id = self.id.as_deref().filter(|id| !id.is_empty())?;
        let name = self
            .function
            .as_ref()
            .and_then(|function| function.name.as_deref())
            .filter(|name| !name.is_empty())?;
        Some((id, name))
    }

    pub fn arguments(&self) -> Option<&str> {
        self.function
            .as_ref()
            .and_then(|function| function.arguments.as_deref())
            .filter(|arguments| !arguments.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::ChatCompletionChunk;
    use serde_json::json;

    #[test]
    fn decodes_usage_only_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4.1",
            "choices": [],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 3,
                "total_tokens": 15,
                "prompt_tokens_details": {"cached_tokens": 4}
            }
        }))
        .expect("chunk should decode");

        assert!(chunk.choices.is_empty());
        let usage = chunk.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(
            usage.prompt_tokens_details.and_then(|details| details.cached_tokens),
            Some(4)
        );
    }

    #[test]
    fn tool_call_opening_requires_id_and_name() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4.1",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [
                    {"index": 0, "id": "call_1", "type": "function", "function": {"name": "Read", "arguments": ""}},
                    {"index": 1, "function": {"arguments": "{\"a\":1}"}}
                ]}
            }]
        }))
        .expect("chunk should decode");

        let calls = chunk.choices[0].delta.tool_calls.as_ref().expect("tool calls");
        assert_eq!(calls[0].opening(), Some(("call_1", "Read")));
        assert_eq!(calls[0].arguments(), None);
        assert_eq!(calls[1].opening(), None);
        assert_eq!(calls[1].arguments(), Some("{\"a\":1}"));
    }

    #[test]
    fn explicit_nulls_decode_as_empty() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": null,
            "model": null,
            "choices": [{
                "index": 0,
                "delta": {"content": "hi", "role": null, "tool_calls": null},
                "finish_reason": null
            }],
            "usage": null
        }))
        .expect("chunk should decode");

        assert!(chunk.id.is_empty());
        assert!(chunk.model.is_empty());
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
        assert!(chunk.choices[0].delta.tool_calls.is_none());

        let empty: ChatCompletionChunk =
            serde_json::from_value(json!({"id": "chatcmpl-1", "choices": null}))
                .expect("chunk should decode");
        assert!(empty.choices.is_empty());
    }

    #[test]
    fn rejects_unknown_finish_reason() {
        let decoded = serde_json::from_value::<ChatCompletionChunk>(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4.1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "eos"}]
        }));
        assert!(decoded.is_err());
    }
}
