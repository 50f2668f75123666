use serde_json::json;
use tracing::{debug, warn};

use crate::constants::{ERROR_TYPE_API, STREAM_FAILURE_MESSAGE, STREAM_TIMEOUT_MESSAGE};
use crate::conversion::response::{FinishReason, anthropic_usage, map_finish_reason};
use crate::conversion::stream::chunk::{ChatCompletionChunk, ChunkToolCall};
use crate::conversion::stream::events::{AnthropicStreamEvent, ContentBlockDelta, ContentBlockStart};
use crate::conversion::stream::state::{StreamState, ToolCallEntry};
use crate::errors::UpstreamError;

/// Why a stream ended early. Selects the message of the terminal error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFailure {
    Timeout,
    Other,
}

impl From<&UpstreamError> for StreamFailure {
    fn from(error: &UpstreamError) -> Self {
        if error.timed_out {
            Self::Timeout
        } else {
            Self::Other
        }
    }
}

/// Turns upstream chat-completion chunks into Anthropic stream events. One
/// translator per response; not shared between tasks.
#[derive(Debug, Default)]
pub struct StreamTranslator {
    state: StreamState,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<AnthropicStreamEvent> {
        let Some(choice) = chunk.choices.first() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        self.append_message_start(&mut events, chunk);
        self.append_content_delta(&mut events, choice.delta.content.as_deref());
        self.append_tool_calls(&mut events, choice.delta.tool_calls.as_deref());
        self.append_finish(&mut events, chunk, choice.finish_reason);
        events
    }

    pub fn on_error(&mut self, failure: StreamFailure) -> Vec<AnthropicStreamEvent> {
        let message = match failure {
            StreamFailure::Timeout => STREAM_TIMEOUT_MESSAGE,
            StreamFailure::Other => STREAM_FAILURE_MESSAGE,
        };
        vec![AnthropicStreamEvent::error(ERROR_TYPE_API, message)]
    }

    fn append_message_start(
        &mut self,
        events: &mut Vec<AnthropicStreamEvent>,
        chunk: &ChatCompletionChunk,
    ) {
        if self.state.message_start_sent {
            return;
        }

        events.push(AnthropicStreamEvent::message_start(
            &chunk.id,
            &chunk.model,
            anthropic_usage(chunk.usage.as_ref(), false),
        ));
        self.state.message_start_sent = true;
    }

    fn append_content_delta(&mut self, events: &mut Vec<AnthropicStreamEvent>, content: Option<&str>) {
        let Some(content) = content.filter(|content| !content.is_empty()) else {
            return;
        };

        if self.state.is_tool_block_open() {
            self.close_block(events);
            self.state.content_block_index += 1;
        }

        if !self.state.content_block_open {
            events.push(AnthropicStreamEvent::ContentBlockStart {
                index: self.state.content_block_index,
                content_block: ContentBlockStart::Text {
                    text: String::new(),
                },
            });
            self.state.content_block_open = true;
        }

        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index: self.state.content_block_index,
            delta: ContentBlockDelta::TextDelta {
                text: content.to_string(),
            },
        });
    }

    fn append_tool_calls(
        &mut self,
        events: &mut Vec<AnthropicStreamEvent>,
        tool_calls: Option<&[ChunkToolCall]>,
    ) {
        for tool_call in tool_calls.unwrap_or_default() {
            let opening = tool_call
                .opening()
                .filter(|_| !self.state.tool_calls.contains_key(&tool_call.index));
            if let Some((id, name)) = opening {
                if self.state.content_block_open {
                    self.close_block(events);
                    self.state.content_block_index += 1;
                }

                let block_index = self.state.content_block_index;
                self.state.tool_calls.insert(
                    tool_call.index,
                    ToolCallEntry {
                        id: id.to_string(),
                        name: name.to_string(),
                        block_index,
                    },
                );

                events.push(AnthropicStreamEvent::ContentBlockStart {
                    index: block_index,
                    content_block: ContentBlockStart::ToolUse {
                        id: id.to_string(),
                        name: name.to_string(),
                        input: json!({}),
                    },
                });
                self.state.content_block_open = true;
            }

            let Some(arguments) = tool_call.arguments() else {
                continue;
            };
            let Some(entry) = self.state.tool_calls.get(&tool_call.index) else {
                debug!(
                    phase = "stream_tool_arguments",
                    tool_call_position = tool_call.index,
                    "Skipping arguments for unknown tool call position"
                );
                continue;
            };

            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index: entry.block_index,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: arguments.to_string(),
                },
            });
        }
    }

    fn append_finish(
        &mut self,
        events: &mut Vec<AnthropicStreamEvent>,
        chunk: &ChatCompletionChunk,
        finish_reason: Option<FinishReason>,
    ) {
        let Some(finish_reason) = finish_reason else {
            return;
        };
        if self.state.message_stop_sent {
            warn!(
                phase = "stream_finish",
                finish_reason = ?finish_reason,
                "Ignoring repeated finish_reason after message_stop"
            );
            return;
        }

        if self.state.content_block_open {
            self.close_block(events);
        }

        events.push(AnthropicStreamEvent::message_delta(
            map_finish_reason(finish_reason),
            anthropic_usage(chunk.usage.as_ref(), true),
        ));
        events.push(AnthropicStreamEvent::MessageStop);
        self.state.message_stop_sent = true;
    }

    fn close_block(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        events.push(AnthropicStreamEvent::ContentBlockStop {
            index: self.state.content_block_index,
        });
        self.state.content_block_open = false;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{StreamFailure, StreamTranslator};
    use crate::conversion::stream::chunk::ChatCompletionChunk;
    use crate::conversion::stream::events::{
        AnthropicStreamEvent, ContentBlockDelta, ContentBlockStart,
    };
    use crate::errors::UpstreamError;

    fn chunk(choice: Value) -> ChatCompletionChunk {
        chunk_with_usage(choice, None)
    }

    fn chunk_with_usage(choice: Value, usage: Option<Value>) -> ChatCompletionChunk {
        let mut raw = json!({
            "id": "chatcmpl-42",
            "model": "claude-sonnet-4",
            "choices": [choice],
        });
        if let Some(usage) = usage {
            raw["usage"] = usage;
        }
        serde_json::from_value(raw).expect("chunk should decode")
    }

    fn text(content: &str) -> ChatCompletionChunk {
        chunk(json!({"index": 0, "delta": {"content": content}}))
    }

    fn tool_open(position: usize, id: &str, name: &str) -> ChatCompletionChunk {
        chunk(json!({"index": 0, "delta": {"tool_calls": [
            {"index": position, "id": id, "type": "function", "function": {"name": name, "arguments": ""}}
        ]}}))
    }

    fn tool_args(position: usize, arguments: &str) -> ChatCompletionChunk {
        chunk(json!({"index": 0, "delta": {"tool_calls": [
            {"index": position, "function": {"arguments": arguments}}
        ]}}))
    }

    fn finish(reason: &str, usage: Value) -> ChatCompletionChunk {
        chunk_with_usage(
            json!({"index": 0, "delta": {}, "finish_reason": reason}),
            Some(usage),
        )
    }

    fn run(chunks: &[ChatCompletionChunk]) -> Vec<AnthropicStreamEvent> {
        let mut translator = StreamTranslator::new();
        chunks
            .iter()
            .flat_map(|chunk| translator.on_chunk(chunk))
            .collect()
    }

    fn types(events: &[AnthropicStreamEvent]) -> Vec<&'static str> {
        events.iter().map(AnthropicStreamEvent::event_type).collect()
    }

    #[test]
    fn text_only_stream_produces_canonical_sequence() {
        let events = run(&[
            text("Hi"),
            text(" there"),
            finish("stop", json!({"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12})),
        ]);

        assert_eq!(
            types(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(
            events[1],
            AnthropicStreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlockStart::Text {
                    text: String::new()
                },
            }
        );
        assert_eq!(
            events[3],
            AnthropicStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::TextDelta {
                    text: " there".to_string()
                },
            }
        );
        assert_eq!(events[4], AnthropicStreamEvent::ContentBlockStop { index: 0 });

        let delta = serde_json::to_value(&events[5]).expect("encode");
        assert_eq!(delta["delta"]["stop_reason"], json!("end_turn"));
        assert_eq!(delta["usage"]["input_tokens"], json!(10));
        assert_eq!(delta["usage"]["output_tokens"], json!(2));
    }

    #[test]
    fn message_start_uses_chunk_identity_and_subtracts_cached_tokens() {
        let events = run(&[chunk_with_usage(
            json!({"index": 0, "delta": {"role": "assistant"}}),
            Some(json!({
                "prompt_tokens": 30,
                "completion_tokens": 0,
                "total_tokens": 30,
                "prompt_tokens_details": {"cached_tokens": 25}
            })),
        )]);

        assert_eq!(events.len(), 1);
        let start = serde_json::to_value(&events[0]).expect("encode");
        assert_eq!(start["message"]["id"], json!("chatcmpl-42"));
        assert_eq!(start["message"]["model"], json!("claude-sonnet-4"));
        assert_eq!(
            start["message"]["usage"],
            json!({"input_tokens": 5, "output_tokens": 0, "cache_read_input_tokens": 25})
        );
    }

    #[test]
    fn text_then_tool_call_moves_to_next_block() {
        let events = run(&[
            text("Let me look."),
            tool_open(0, "call_1", "Read"),
            tool_args(0, "{\"path\":"),
            tool_args(0, "\"a.rs\"}"),
            finish("tool_calls", json!({"prompt_tokens": 5, "completion_tokens": 9, "total_tokens": 14})),
        ]);

        assert_eq!(
            types(&events),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(events[3], AnthropicStreamEvent::ContentBlockStop { index: 0 });
        assert_eq!(
            events[4],
            AnthropicStreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlockStart::ToolUse {
                    id: "call_1".to_string(),
                    name: "Read".to_string(),
                    input: json!({}),
                },
            }
        );
        assert_eq!(
            events[6],
            AnthropicStreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: "\"a.rs\"}".to_string()
                },
            }
        );
        assert_eq!(events[7], AnthropicStreamEvent::ContentBlockStop { index: 1 });

        let delta = serde_json::to_value(&events[8]).expect("encode");
        assert_eq!(delta["delta"]["stop_reason"], json!("tool_use"));
    }

    #[test]
    fn text_after_tool_call_opens_fresh_text_block() {
        let events = run(&[
            tool_open(0, "call_1", "Read"),
            text("done"),
        ]);

        assert_eq!(events[1], AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlockStart::ToolUse {
                id: "call_1".to_string(),
                name: "Read".to_string(),
                input: json!({}),
            },
        });
        assert_eq!(events[2], AnthropicStreamEvent::ContentBlockStop { index: 0 });
        assert!(matches!(
            events[3],
            AnthropicStreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlockStart::Text { .. }
            }
        ));
    }

    #[test]
    fn parallel_tool_calls_route_arguments_to_their_own_block() {
        let events = run(&[
            tool_open(0, "call_a", "Read"),
            tool_open(1, "call_b", "Grep"),
            tool_args(0, "{}"),
        ]);

        assert_eq!(
            events.last(),
            Some(&AnthropicStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: "{}".to_string()
                },
            })
        );
    }

    #[test]
    fn repeated_id_and_name_stay_in_the_first_block() {
        let repeated = |arguments: &str| {
            chunk(json!({"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                 "function": {"name": "Read", "arguments": arguments}}
            ]}}))
        };
        let events = run(&[repeated("{\"a\":"), repeated("1}")]);

        let starts = events
            .iter()
            .filter(|event| matches!(event, AnthropicStreamEvent::ContentBlockStart { .. }))
            .count();
        assert_eq!(starts, 1);
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, AnthropicStreamEvent::ContentBlockStop { .. }))
        );

        let fragments: Vec<(usize, &str)> = events
            .iter()
            .filter_map(|event| match event {
                AnthropicStreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentBlockDelta::InputJsonDelta { partial_json },
                } => Some((*index, partial_json.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(fragments, vec![(0, "{\"a\":"), (0, "1}")]);
    }

    #[test]
    fn arguments_for_unknown_position_are_ignored() {
        let mut translator = StreamTranslator::new();
        translator.on_chunk(&text("hi"));

        let events = translator.on_chunk(&tool_args(3, "{\"x\":1}"));
        assert!(events.is_empty());
    }

    #[test]
    fn chunk_without_choices_emits_nothing() {
        let mut translator = StreamTranslator::new();
        let empty: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-42",
            "model": "claude-sonnet-4",
            "choices": [],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        }))
        .expect("chunk should decode");

        assert!(translator.on_chunk(&empty).is_empty());
        assert_eq!(translator.on_chunk(&text("x"))[0].event_type(), "message_start");
    }

    #[test]
    fn length_and_content_filter_map_to_anthropic_stop_reasons() {
        for (reason, expected) in [("length", "max_tokens"), ("content_filter", "end_turn")] {
            let events = run(&[finish(reason, json!({"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}))]);
            let delta = serde_json::to_value(&events[1]).expect("encode");
            assert_eq!(delta["delta"]["stop_reason"], json!(expected));
        }
    }

    #[test]
    fn message_stop_is_emitted_once() {
        let usage = json!({"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2});
        let events = run(&[
            text("a"),
            finish("stop", usage.clone()),
            finish("stop", usage),
        ]);

        let stops = events
            .iter()
            .filter(|event| **event == AnthropicStreamEvent::MessageStop)
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn every_started_block_is_stopped_before_the_next_opens() {
        let events = run(&[
            text("a"),
            tool_open(0, "call_1", "Read"),
            tool_open(1, "call_2", "Read"),
            text("b"),
            finish("stop", json!({"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2})),
        ]);

        let mut open: Option<usize> = None;
        for event in &events {
            match event {
                AnthropicStreamEvent::ContentBlockStart { index, .. } => {
                    assert!(open.is_none(), "block {index} opened while another is open");
                    open = Some(*index);
                }
                AnthropicStreamEvent::ContentBlockStop { index } => {
                    assert_eq!(open, Some(*index));
                    open = None;
                }
                _ => {}
            }
        }
        assert!(open.is_none());
    }

    #[test]
    fn errors_map_to_single_api_error_event() {
        let mut translator = StreamTranslator::new();

        let timeout = translator.on_error(StreamFailure::from(&UpstreamError::timeout("read timed out")));
        assert_eq!(timeout.len(), 1);
        let encoded = serde_json::to_value(&timeout[0]).expect("encode");
        assert_eq!(encoded["error"]["type"], json!("api_error"));
        assert_eq!(
            encoded["error"]["message"],
            json!("Upstream streaming request timed out. Please retry.")
        );

        let other = translator.on_error(StreamFailure::Other);
        let encoded = serde_json::to_value(&other[0]).expect("encode");
        assert_eq!(
            encoded["error"]["message"],
            json!("An unexpected error occurred during streaming.")
        );
    }
}
