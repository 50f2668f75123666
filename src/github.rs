use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::constants::{
    COPILOT_API_VERSION, GITHUB_API_BASE_URL, GITHUB_APP_SCOPES, GITHUB_BASE_URL,
    GITHUB_CLIENT_ID, copilot_user_agent, editor_plugin_version,
};
use crate::errors::UpstreamError;
use crate::upstream::{build_send_error, insert_dynamic, parse_success_json_response, read_http_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CopilotTokenResponse {
    pub token: String,
    pub expires_at: i64,
    pub refresh_in: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
}

/// GitHub endpoints used to obtain and refresh Copilot credentials.
#[derive(Clone, Debug)]
pub struct GitHubClient {
    client: Client,
    vscode_version: String,
}

impl GitHubClient {
    pub fn new(vscode_version: &str) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| format!("failed to initialize GitHub HTTP client: {error}"))?;
        Ok(Self {
            client,
            vscode_version: vscode_version.to_string(),
        })
    }

    pub async fn copilot_token(&self, github_token: &str) -> Result<CopilotTokenResponse, UpstreamError> {
        let url = format!("{GITHUB_API_BASE_URL}/copilot_internal/v2/token");
        self.get_json(&url, github_headers(github_token, &self.vscode_version))
            .await
    }

    /// Quota snapshot, relayed verbatim by `/usage`.
    pub async fn copilot_usage(&self, github_token: &str) -> Result<Value, UpstreamError> {
        let url = format!("{GITHUB_API_BASE_URL}/copilot_internal/user");
        self.get_json(&url, github_headers(github_token, &self.vscode_version))
            .await
    }

    pub async fn user(&self, github_token: &str) -> Result<GithubUser, UpstreamError> {
        let mut headers = standard_headers();
        insert_dynamic(&mut headers, "authorization", &format!("token {github_token}"));
        self.get_json(&format!("{GITHUB_API_BASE_URL}/user"), headers)
            .await
    }

    pub async fn device_code(&self) -> Result<DeviceCodeResponse, UpstreamError> {
        let body = json!({ "client_id": GITHUB_CLIENT_ID, "scope": GITHUB_APP_SCOPES });
        let response = self
            .post(&format!("{GITHUB_BASE_URL}/login/device/code"), &body)
            .await?;
        parse_success_json_response(response, "github", "/login/device/code", "-").await
    }

    /// Polls until the user approves the device. Never gives up; failures
    /// are logged and retried after `interval + 1` seconds.
    pub async fn poll_access_token(&self, device_code: &DeviceCodeResponse) -> String {
        let sleep_duration = Duration::from_secs(device_code.interval + 1);
        debug!(
            phase = "github_device_poll",
            interval_ms = sleep_duration.as_millis() as u64,
            "Polling access token"
        );

        let body = json!({
            "client_id": GITHUB_CLIENT_ID,
            "device_code": device_code.device_code,
            "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
        });
        let url = format!("{GITHUB_BASE_URL}/login/oauth/access_token");

        loop {
            match self.post(&url, &body).await {
                Ok(response) => {
                    match parse_success_json_response::<AccessTokenResponse>(
                        response,
                        "github",
                        "/login/oauth/access_token",
                        "-",
                    )
                    .await
                    {
                        Ok(AccessTokenResponse {
                            access_token: Some(token),
                            ..
                        }) if !token.is_empty() => return token,
                        Ok(pending) => debug!(
                            phase = "github_device_poll",
                            status = pending.error.as_deref().unwrap_or("pending"),
                            "Access token not granted yet"
                        ),
                        Err(poll_error) => error!(
                            phase = "github_device_poll",
                            error = %poll_error,
                            "Failed to decode access token response"
                        ),
                    }
                }
                Err(poll_error) => error!(
                    phase = "github_device_poll",
                    error = %poll_error,
                    "Failed to poll access token"
                ),
            }
            tokio::time::sleep(sleep_duration).await;
        }
    }

    /// Interactive login: logs the user code and waits for approval.
    pub async fn device_login(&self) -> Result<String, UpstreamError> {
        let device_code = self.device_code().await?;
        info!(
            phase = "github_device_login",
            user_code = %device_code.user_code,
            verification_uri = %device_code.verification_uri,
            "Please enter the code \"{}\" in {}",
            device_code.user_code,
            device_code.verification_uri
        );
        Ok(self.poll_access_token(&device_code).await)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T, UpstreamError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|error| {
                build_send_error(error, Some(REQUEST_TIMEOUT), "github", url, "-", started.elapsed())
            })?;
        if !response.status().is_success() {
            return Err(read_http_error(response, "github", url, "-").await);
        }
        parse_success_json_response(response, "github", url, "-").await
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, UpstreamError> {
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .headers(standard_headers())
            .json(body)
            .send()
            .await
            .map_err(|error| {
                build_send_error(error, Some(REQUEST_TIMEOUT), "github", url, "-", started.elapsed())
            })?;
        if !response.status().is_success() {
            return Err(read_http_error(response, "github", url, "-").await);
        }
        Ok(response)
    }
}

fn standard_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

pub fn github_headers(github_token: &str, vscode_version: &str) -> HeaderMap {
    let mut headers = standard_headers();
    if let Ok(value) = HeaderValue::from_str(&format!("token {github_token}")) {
        headers.insert(AUTHORIZATION, value);
    }
    insert_dynamic(&mut headers, "editor-version", &format!("vscode/{vscode_version}"));
    insert_dynamic(&mut headers, "editor-plugin-version", &editor_plugin_version());
    if let Ok(value) = HeaderValue::from_str(&copilot_user_agent()) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static(COPILOT_API_VERSION),
    );
    headers.insert(
        "x-vscode-user-agent-library-version",
        HeaderValue::from_static("electron-fetch"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::{CopilotTokenResponse, github_headers};

    #[test]
    fn github_headers_use_token_scheme() {
        let headers = github_headers("gho_abc", "1.99.3");
        let get = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        assert_eq!(get("authorization"), Some("token gho_abc"));
        assert_eq!(get("editor-version"), Some("vscode/1.99.3"));
        assert_eq!(get("accept"), Some("application/json"));
    }

    #[test]
    fn decodes_copilot_token_response() {
        let token: CopilotTokenResponse = serde_json::from_str(
            r#"{"token":"tid=1;exp=2","expires_at":1760000000,"refresh_in":1500,"sku":"free"}"#,
        )
        .expect("decode");
        assert_eq!(token.refresh_in, 1500);
        assert_eq!(token.token, "tid=1;exp=2");
    }
}
