use std::time::Duration;

use futures_util::StreamExt;
use salvo::prelude::*;
use tracing::{debug, error, trace};

use crate::conversion::request::translate_messages_request;
use crate::conversion::response::{ChatCompletionResponse, convert_chat_to_anthropic_response};
use crate::conversion::stream::{
    AnthropicStreamEvent, ChatCompletionChunk, StreamFailure, StreamTranslator,
};
use crate::errors::ApiError;
use crate::handlers::{app_state, read_json_body, render_error, set_sse_headers};
use crate::sse_queue::SseWriteQueue;
use crate::upstream::ChatCompletionsReply;
use crate::upstream_parse::UpstreamEventStream;
use crate::validation::parse_messages_payload;

#[handler]
pub async fn create_message(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    if let Err(error) = handle_create_message(req, depot, res).await {
        render_error(res, &error);
    }
}

async fn handle_create_message(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let state = app_state(depot)?;
    let body = read_json_body(req, state.config.request_body_max_size).await?;
    let request = parse_messages_payload(body)?;

    trace!(
        phase = "downstream_request_full",
        anthropic_request = %serde_json::to_string(&request).unwrap_or_default(),
        "Received downstream request (full)"
    );

    debug!(
        phase = "downstream_request_summary",
        anthropic_model = %request.model,
        stream = request.is_streaming(),
        max_tokens = request.max_tokens,
        messages_len = request.messages.len(),
        has_system = request.system.is_some(),
        has_tools = request.has_tools(),
        has_tool_choice = request.tool_choice.is_some(),
        "Received downstream request (summary)"
    );

    let payload = translate_messages_request(&request);
    let token = state.copilot_token().await?;
    let request_id = uuid::Uuid::new_v4().to_string();

    match state
        .copilot
        .chat_completions(&token, &payload, &request_id)
        .await?
    {
        ChatCompletionsReply::Json(value) => {
            let response: ChatCompletionResponse =
                serde_json::from_value(value).map_err(|decode_error| {
                    ApiError::Internal(format!(
                        "failed to decode upstream chat completion: {decode_error}"
                    ))
                })?;
            let anthropic_response = convert_chat_to_anthropic_response(&response, &request.model);
            debug!(
                phase = "downstream_response_summary",
                request_id = %request_id,
                stop_reason = ?anthropic_response.stop_reason,
                total_tokens = response.total_tokens(),
                content_len = anthropic_response.content.len(),
                "Translated upstream response"
            );
            res.render(Json(anthropic_response));
        }
        ChatCompletionsReply::Stream(events) => {
            set_sse_headers(res);
            let keepalive = state.config.sse_keepalive_millis().map(Duration::from_millis);
            let queue = SseWriteQueue::new(res.channel(), keepalive);
            tokio::spawn(async move {
                pump_translated_stream(events, &queue, &request_id).await;
            });
        }
    }
    Ok(())
}

/// Feeds upstream chunks through a fresh translator into the queue until the
/// upstream ends, fails, or the client goes away. Always stops the queue.
pub(crate) async fn pump_translated_stream(
    mut events: UpstreamEventStream,
    queue: &SseWriteQueue,
    request_id: &str,
) {
    let mut translator = StreamTranslator::new();

    loop {
        if queue.is_stopped() {
            debug!(
                phase = "downstream_stream_aborted",
                request_id = %request_id,
                "Client went away, dropping upstream stream"
            );
            break;
        }

        let item = tokio::select! {
            item = events.next() => item,
            _ = queue.stopped() => continue,
        };
        let Some(item) = item else {
            break;
        };

        let event = match item {
            Ok(event) => event,
            Err(upstream_error) => {
                error!(
                    phase = "upstream_stream_failed",
                    request_id = %request_id,
                    timed_out = upstream_error.timed_out,
                    error = %upstream_error,
                    "Upstream stream failed"
                );
                let failure = StreamFailure::from(&upstream_error);
                send_events(queue, translator.on_error(failure)).await;
                break;
            }
        };

        if event.is_done() {
            continue;
        }

        let chunk = match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
            Ok(chunk) => chunk,
            Err(decode_error) => {
                error!(
                    phase = "upstream_chunk_invalid",
                    request_id = %request_id,
                    error = %decode_error,
                    data = %event.data,
                    "Failed to decode upstream chunk"
                );
                send_events(queue, translator.on_error(StreamFailure::Other)).await;
                break;
            }
        };

        trace!(phase = "upstream_chunk", request_id = %request_id, data = %event.data, "Upstream chunk");
        send_events(queue, translator.on_chunk(&chunk)).await;
    }

    queue.stop();
}

async fn send_events(queue: &SseWriteQueue, events: Vec<AnthropicStreamEvent>) {
    for event in &events {
        queue.send_event(event).await;
    }
}
