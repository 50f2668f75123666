mod chat;
mod count_tokens;
mod embeddings;
mod messages;
mod models;
mod usage;

use salvo::http::StatusCode;
use salvo::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router(show_token: bool) -> Router {
    let mut router = Router::new()
        .get(root)
        .push(
            Router::with_path("v1/messages")
                .post(messages::create_message)
                .push(Router::with_path("count_tokens").post(count_tokens::count_tokens)),
        )
        .push(Router::with_path("messages").post(messages::create_message))
        .push(Router::with_path("v1/chat/completions").post(chat::create_chat_completion))
        .push(Router::with_path("chat/completions").post(chat::create_chat_completion))
        .push(Router::with_path("v1/models").get(models::list_models))
        .push(Router::with_path("models").get(models::list_models))
        .push(Router::with_path("v1/embeddings").post(embeddings::create_embeddings))
        .push(Router::with_path("embeddings").post(embeddings::create_embeddings))
        .push(Router::with_path("usage").get(usage::get_usage));

    if show_token {
        router = router.push(Router::with_path("token").get(current_token));
    }
    router
}

#[handler]
pub async fn root(res: &mut Response) {
    res.render(Text::Plain("Server running"));
}

#[handler]
pub async fn current_token(depot: &mut Depot, res: &mut Response) {
    let token = match app_state(depot) {
        Ok(state) => state.copilot_token().await,
        Err(error) => Err(error),
    };
    match token {
        Ok(token) => res.render(Json(TokenResponse { token })),
        Err(error) => render_error(res, &error),
    }
}

pub(crate) fn app_state(depot: &Depot) -> Result<AppState, ApiError> {
    depot
        .obtain::<AppState>()
        .cloned()
        .map_err(|_| ApiError::Internal("application state is not configured".to_string()))
}

pub(crate) async fn read_json_body(req: &mut Request, max_size: usize) -> Result<Value, ApiError> {
    req.parse_json_with_max_size::<Value>(max_size)
        .await
        .map_err(|error| ApiError::Validation(error.to_string()))
}

pub(crate) fn render_error(res: &mut Response, api_error: &ApiError) {
    let status = api_error.status();
    match api_error {
        ApiError::Upstream(_) | ApiError::Internal(_) => error!(
            phase = "request_failed",
            status = status.as_u16(),
            error = %api_error,
            "Request failed"
        ),
        _ => warn!(
            phase = "request_rejected",
            status = status.as_u16(),
            error = %api_error,
            "Request rejected"
        ),
    }

    res.status_code(status);
    res.render(Json(ErrorResponse {
        error: ErrorDetail {
            message: api_error.to_string(),
            error_type: api_error.error_type(),
        },
    }));
}

pub(crate) fn set_sse_headers(res: &mut Response) {
    res.status_code(StatusCode::OK);
    let _ = res.add_header("Cache-Control", "no-cache", true);
    let _ = res.add_header("Connection", "keep-alive", true);
    let _ = res.add_header("Content-Type", "text/event-stream; charset=utf-8", true);
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: &'static str,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

#[cfg(test)]
pub(crate) fn test_service(state: AppState) -> Service {
    crate::app::build_service(state)
}
