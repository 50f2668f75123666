use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::conversion::request::ChatCompletionsPayload;
use crate::errors::ApiError;
use crate::models::{AnthropicCountTokensRequest, AnthropicMessagesRequest, EmbeddingRequest};

pub fn parse_messages_payload(value: Value) -> Result<AnthropicMessagesRequest, ApiError> {
    decode(value)
}

pub fn parse_count_tokens_payload(value: Value) -> Result<AnthropicCountTokensRequest, ApiError> {
    decode(value)
}

pub fn parse_chat_payload(value: Value) -> Result<ChatCompletionsPayload, ApiError> {
    decode(value)
}

pub fn parse_embeddings_payload(value: Value) -> Result<EmbeddingRequest, ApiError> {
    decode(value)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|error| ApiError::Validation(error.to_string()))
}
