use salvo::prelude::*;
use tracing::debug;

use crate::errors::ApiError;
use crate::handlers::{app_state, read_json_body, render_error};
use crate::validation::parse_embeddings_payload;

#[handler]
pub async fn create_embeddings(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    match handle_embeddings(req, depot).await {
        Ok(value) => res.render(Json(value)),
        Err(error) => render_error(res, &error),
    }
}

async fn handle_embeddings(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<serde_json::Value, ApiError> {
    let state = app_state(depot)?;
    let body = read_json_body(req, state.config.request_body_max_size).await?;
    let payload = parse_embeddings_payload(body)?;
    debug!(phase = "downstream_embeddings", model = %payload.model, "Embeddings request");

    let token = state.copilot_token().await?;
    let request_id = uuid::Uuid::new_v4().to_string();
    Ok(state
        .copilot
        .embeddings(&token, &payload, &request_id)
        .await?)
}
