use std::time::Duration;

use futures_util::StreamExt;
use salvo::prelude::*;
use tracing::{debug, error, info, warn};

use crate::catalog::ModelCatalog;
use crate::conversion::request::ChatCompletionsPayload;
use crate::errors::ApiError;
use crate::handlers::{app_state, read_json_body, render_error, set_sse_headers};
use crate::sse_queue::SseWriteQueue;
use crate::tokenizer::count_tokens;
use crate::upstream::ChatCompletionsReply;
use crate::upstream_parse::UpstreamEventStream;
use crate::validation::parse_chat_payload;

/// OpenAI-protocol passthrough. The payload is forwarded as-is apart from a
/// default `max_tokens` taken from the model's output limit.
#[handler]
pub async fn create_chat_completion(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    if let Err(error) = handle_chat_completion(req, depot, res).await {
        render_error(res, &error);
    }
}

async fn handle_chat_completion(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let state = app_state(depot)?;
    let body = read_json_body(req, state.config.request_body_max_size).await?;
    let mut payload = parse_chat_payload(body)?;

    debug!(
        phase = "downstream_chat_summary",
        model = %payload.model,
        stream = payload.is_streaming(),
        max_tokens = ?payload.max_tokens,
        messages_len = payload.messages.len(),
        "Received chat completion request"
    );

    let catalog = state.catalog().await;
    log_token_count(&payload, &catalog);
    apply_default_max_tokens(&mut payload, &catalog);

    let token = state.copilot_token().await?;
    let request_id = uuid::Uuid::new_v4().to_string();

    match state
        .copilot
        .chat_completions(&token, &payload, &request_id)
        .await?
    {
        ChatCompletionsReply::Json(value) => res.render(Json(value)),
        ChatCompletionsReply::Stream(events) => {
            set_sse_headers(res);
            let keepalive = state.config.sse_keepalive_millis().map(Duration::from_millis);
            let queue = SseWriteQueue::new(res.channel(), keepalive);
            tokio::spawn(async move {
                relay_stream(events, &queue, &request_id).await;
            });
        }
    }
    Ok(())
}

fn log_token_count(payload: &ChatCompletionsPayload, catalog: &ModelCatalog) {
    let Some(model) = catalog.find(&payload.model) else {
        warn!(
            phase = "token_count",
            model = %payload.model,
            "No model selected, skipping token count calculation"
        );
        return;
    };

    match count_tokens(payload, model) {
        Ok(count) => info!(
            phase = "token_count",
            model = %payload.model,
            input = count.input,
            output = count.output,
            "Current token count"
        ),
        Err(count_error) => warn!(
            phase = "token_count",
            model = %payload.model,
            error = %count_error,
            "Failed to calculate token count"
        ),
    }
}

fn apply_default_max_tokens(payload: &mut ChatCompletionsPayload, catalog: &ModelCatalog) {
    if payload.max_tokens.is_some() {
        return;
    }
    payload.max_tokens = catalog
        .find(&payload.model)
        .and_then(|model| model.capabilities.limits.max_output_tokens);
    debug!(
        phase = "default_max_tokens",
        max_tokens = ?payload.max_tokens,
        "Set max_tokens from model limits"
    );
}

/// Copies upstream events to the client unchanged, `[DONE]` included.
async fn relay_stream(mut events: UpstreamEventStream, queue: &SseWriteQueue, request_id: &str) {
    while !queue.is_stopped() {
        let item = tokio::select! {
            item = events.next() => item,
            _ = queue.stopped() => break,
        };
        let Some(item) = item else {
            break;
        };
        match item {
            Ok(event) => queue.send_raw(event.to_frame()).await,
            Err(upstream_error) => {
                error!(
                    phase = "upstream_stream_failed",
                    request_id = %request_id,
                    timed_out = upstream_error.timed_out,
                    error = %upstream_error,
                    "Upstream stream failed during passthrough"
                );
                break;
            }
        }
    }
    queue.stop();
}
