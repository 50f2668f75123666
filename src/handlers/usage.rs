use salvo::prelude::*;

use crate::errors::ApiError;
use crate::handlers::{app_state, render_error};

/// Copilot quota snapshot, relayed from GitHub unchanged.
#[handler]
pub async fn get_usage(depot: &mut Depot, res: &mut Response) {
    match fetch_usage(depot).await {
        Ok(usage) => res.render(Json(usage)),
        Err(error) => render_error(res, &error),
    }
}

async fn fetch_usage(depot: &mut Depot) -> Result<serde_json::Value, ApiError> {
    let state = app_state(depot)?;
    let github_token = state.github_token().await?;
    Ok(state.github.copilot_usage(&github_token).await?)
}
