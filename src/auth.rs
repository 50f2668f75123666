use std::time::Duration;

use tracing::{error, info, warn};

use crate::catalog::ModelCatalog;
use crate::github::CopilotTokenResponse;
use crate::state::AppState;

const REFRESH_MARGIN_SECS: u64 = 60;

/// Resolves the GitHub token (configured, or interactive device login), then
/// fetches the first Copilot token, starts its refresh task and caches the
/// model catalog. Any failure here is fatal to startup.
pub async fn bootstrap(state: &AppState) -> Result<(), String> {
    let github_token = match state.config.github_token.clone() {
        Some(token) => {
            info!(phase = "auth_bootstrap", "Using GitHub token from configuration");
            token
        }
        None => state
            .github
            .device_login()
            .await
            .map_err(|error| format!("GitHub device login failed: {error}"))?,
    };
    state.set_github_token(github_token.clone()).await;

    match state.github.user(&github_token).await {
        Ok(user) => info!(phase = "auth_bootstrap", login = %user.login, "Logged in to GitHub"),
        Err(user_error) => warn!(
            phase = "auth_bootstrap",
            error = %user_error,
            "Could not look up GitHub user"
        ),
    }

    let token = state
        .github
        .copilot_token(&github_token)
        .await
        .map_err(|error| format!("failed to obtain Copilot token: {error}"))?;
    let refresh_every = refresh_interval(token.refresh_in);
    apply_copilot_token(state, token).await;
    tokio::spawn(refresh_loop(state.clone(), github_token, refresh_every));

    cache_models(state).await
}

async fn cache_models(state: &AppState) -> Result<(), String> {
    let copilot_token = state
        .copilot_token()
        .await
        .map_err(|error| error.to_string())?;
    let models = state
        .copilot
        .models(&copilot_token)
        .await
        .map_err(|error| format!("failed to fetch Copilot models: {error}"))?;

    let catalog = ModelCatalog::new(models);
    info!(
        phase = "models_cached",
        model_count = catalog.model_count(),
        models = %catalog
            .models()
            .data
            .iter()
            .map(|model| model.id.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        "Available models"
    );
    state.set_catalog(catalog).await;
    Ok(())
}

async fn refresh_loop(state: AppState, github_token: String, every: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        ticker.tick().await;
        match state.github.copilot_token(&github_token).await {
            Ok(token) => {
                info!(phase = "copilot_token_refresh", "Copilot token refreshed");
                apply_copilot_token(&state, token).await;
            }
            Err(refresh_error) => error!(
                phase = "copilot_token_refresh",
                error = %refresh_error,
                "Failed to refresh Copilot token, retrying on next tick"
            ),
        }
    }
}

async fn apply_copilot_token(state: &AppState, token: CopilotTokenResponse) {
    if state.config.show_token {
        info!(phase = "copilot_token", token = %token.token, "Copilot token");
    }
    state.set_copilot_token(token.token).await;
}

/// Refreshes one minute ahead of the advertised `refresh_in`.
pub fn refresh_interval(refresh_in: u64) -> Duration {
    Duration::from_secs(refresh_in.saturating_sub(REFRESH_MARGIN_SECS).max(1))
}
