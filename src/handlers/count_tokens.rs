use salvo::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::conversion::request::translate_messages_request;
use crate::errors::ApiError;
use crate::handlers::{app_state, read_json_body, render_error};
use crate::token_accounting::adjust_token_count;
use crate::tokenizer::count_tokens as count_payload_tokens;
use crate::validation::parse_count_tokens_payload;

#[handler]
pub async fn count_tokens(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    match handle_count_tokens(req, depot).await {
        Ok(input_tokens) => res.render(Json(TokenCountResponse { input_tokens })),
        Err(error) => render_error(res, &error),
    }
}

async fn handle_count_tokens(req: &mut Request, depot: &mut Depot) -> Result<u64, ApiError> {
    let state = app_state(depot)?;
    let anthropic_beta = req
        .headers()
        .get("anthropic-beta")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let body = read_json_body(req, state.config.request_body_max_size).await?;
    let request = parse_count_tokens_payload(body)?;

    debug!(
        phase = "downstream_token_count_summary",
        anthropic_model = %request.model,
        messages_len = request.messages.len(),
        has_system = request.system.is_some(),
        tools_len = request.tools.as_ref().map(Vec::len).unwrap_or(0),
        anthropic_beta = anthropic_beta.as_deref().unwrap_or("-"),
        "Token counting request (summary)"
    );

    let payload = translate_messages_request(&request.clone().into_messages_request());
    let catalog = state.catalog().await;
    let model = catalog.find(&payload.model).ok_or_else(|| {
        ApiError::ModelNotFound(format!(
            "Model not found for token counting: \"{}\"",
            payload.model
        ))
    })?;

    let raw = count_payload_tokens(&payload, model).map_err(ApiError::Internal)?;
    let input_tokens = adjust_token_count(raw, &request, anthropic_beta.as_deref());

    info!(
        phase = "token_count",
        anthropic_model = %request.model,
        raw_input = raw.input,
        raw_output = raw.output,
        input_tokens,
        "Token count"
    );
    Ok(input_tokens)
}

#[derive(Debug, Serialize)]
struct TokenCountResponse {
    input_tokens: u64,
}

#[cfg(test)]
mod tests {
    use salvo::http::StatusCode;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::{Value, json};

    use crate::handlers::test_service;
    use crate::state::test_state;

    const URL: &str = "http://127.0.0.1:4141/v1/messages/count_tokens";

    async fn post(body: Value, beta: Option<&str>) -> (Option<StatusCode>, Value) {
        let service = test_service(test_state(&["claude-haiku-4.5", "gpt-4.1"]).await);
        let mut client = TestClient::post(URL).json(&body);
        if let Some(beta) = beta {
            client = client.add_header("anthropic-beta", beta, true);
        }
        let mut res = client.send(&service).await;
        let status = res.status_code;
        (status, res.take_json().await.unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn counts_without_max_tokens() {
        let (status, body) = post(
            json!({
                "model": "claude-haiku-4.5",
                "messages": [{ "role": "user", "content": "Hello!" }]
            }),
            None,
        )
        .await;

        assert_eq!(status, Some(StatusCode::OK));
        assert!(body["input_tokens"].as_u64().expect("input_tokens") > 0);
    }

    #[tokio::test]
    async fn rejects_invalid_payload() {
        let (status, body) = post(json!({ "model": "claude-haiku-4.5" }), None).await;

        assert_eq!(status, Some(StatusCode::BAD_REQUEST));
        assert!(
            body["error"]["message"]
                .as_str()
                .expect("message")
                .starts_with("Invalid request payload")
        );
    }

    #[tokio::test]
    async fn rejects_unknown_model() {
        let (status, body) = post(
            json!({
                "model": "unknown-model",
                "messages": [{ "role": "user", "content": "Hello!" }]
            }),
            None,
        )
        .await;

        assert_eq!(status, Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            body["error"]["message"],
            "Model not found for token counting: \"unknown-model\""
        );
    }

    #[tokio::test]
    async fn tool_surcharge_is_skipped_for_claude_code_mcp_tools() {
        let request = json!({
            "model": "claude-haiku-4.5",
            "messages": [{ "role": "user", "content": "Hello!" }],
            "tools": [{ "name": "mcp__github__search", "input_schema": { "type": "object" } }]
        });

        let (_, plain) = post(request.clone(), None).await;
        let (_, claude_code) = post(request, Some("claude-code-20250219")).await;

        let plain = plain["input_tokens"].as_u64().expect("input_tokens");
        let claude_code = claude_code["input_tokens"].as_u64().expect("input_tokens");
        assert!(plain > claude_code + 346);
    }

    #[tokio::test]
    async fn other_families_are_not_scaled_or_surcharged() {
        let (status, body) = post(
            json!({
                "model": "gpt-4.1",
                "messages": [{ "role": "user", "content": "Hello!" }],
                "tools": [{ "name": "Read" }]
            }),
            None,
        )
        .await;

        assert_eq!(status, Some(StatusCode::OK));
        assert!(body["input_tokens"].as_u64().expect("input_tokens") < 346);
    }
}
