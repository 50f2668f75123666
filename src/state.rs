use std::sync::Arc;

use tokio::sync::RwLock;

use crate::catalog::ModelCatalog;
use crate::config::Config;
use crate::errors::ApiError;
use crate::github::GitHubClient;
use crate::upstream::CopilotClient;

/// Credentials as of the last refresh.
#[derive(Clone, Debug, Default)]
pub struct AuthSnapshot {
    pub github_token: Option<String>,
    pub copilot_token: Option<String>,
}

/// Process-wide context handed to every handler through the router depot.
/// Mutable parts are swapped wholesale; readers take an `Arc` snapshot.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub copilot: CopilotClient,
    pub github: GitHubClient,
    auth: Arc<RwLock<Arc<AuthSnapshot>>>,
    catalog: Arc<RwLock<Arc<ModelCatalog>>>,
}

impl AppState {
    pub fn new(config: Config, copilot: CopilotClient, github: GitHubClient) -> Self {
        Self {
            config: Arc::new(config),
            copilot,
            github,
            auth: Arc::new(RwLock::new(Arc::new(AuthSnapshot::default()))),
            catalog: Arc::new(RwLock::new(Arc::new(ModelCatalog::default()))),
        }
    }

    pub async fn auth(&self) -> Arc<AuthSnapshot> {
        self.auth.read().await.clone()
    }

    pub async fn catalog(&self) -> Arc<ModelCatalog> {
        self.catalog.read().await.clone()
    }

    pub async fn set_catalog(&self, catalog: ModelCatalog) {
        *self.catalog.write().await = Arc::new(catalog);
    }

    pub async fn set_github_token(&self, github_token: String) {
        let mut guard = self.auth.write().await;
        let mut next = AuthSnapshot::clone(&guard);
        next.github_token = Some(github_token);
        *guard = Arc::new(next);
    }

    pub async fn set_copilot_token(&self, copilot_token: String) {
        let mut guard = self.auth.write().await;
        let mut next = AuthSnapshot::clone(&guard);
        next.copilot_token = Some(copilot_token);
        *guard = Arc::new(next);
    }

    pub async fn copilot_token(&self) -> Result<String, ApiError> {
        self.auth()
            .await
            .copilot_token
            .clone()
            .ok_or_else(|| ApiError::Unauthorized("Copilot token not found".to_string()))
    }

    pub async fn github_token(&self) -> Result<String, ApiError> {
        self.auth()
            .await
            .github_token
            .clone()
            .ok_or_else(|| ApiError::Unauthorized("GitHub token not found".to_string()))
    }
}

#[cfg(test)]
pub(crate) async fn test_state(model_ids: &[&str]) -> AppState {
    let config = crate::config::test_config();
    let copilot = CopilotClient::new(&config).expect("copilot client");
    let github = GitHubClient::new(&config.vscode_version).expect("github client");
    let state = AppState::new(config, copilot, github);
    state
        .set_catalog(crate::catalog::test_catalog(model_ids))
        .await;
    state
}

#[cfg(test)]
mod tests {
    use super::test_state;

    #[tokio::test]
    async fn token_updates_replace_the_snapshot() {
        let state = test_state(&[]).await;
        let before = state.auth().await;
        assert!(state.copilot_token().await.is_err());

        state.set_github_token("gho_1".to_string()).await;
        state.set_copilot_token("tid=1".to_string()).await;

        assert!(before.copilot_token.is_none());
        let after = state.auth().await;
        assert_eq!(after.github_token.as_deref(), Some("gho_1"));
        assert_eq!(state.copilot_token().await.ok().as_deref(), Some("tid=1"));
    }

    #[tokio::test]
    async fn catalog_snapshot_is_shared() {
        let state = test_state(&["gpt-4.1"]).await;
        let catalog = state.catalog().await;
        assert!(catalog.find("gpt-4.1").is_some());
        assert_eq!(catalog.model_count(), 1);
    }
}
