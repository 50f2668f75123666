use std::borrow::Cow;
use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::catalog::ModelsResponse;
use crate::config::Config;
use crate::constants::{
    COPILOT_API_VERSION, COPILOT_INTEGRATION_ID, copilot_user_agent, editor_plugin_version,
};
use crate::conversion::request::ChatCompletionsPayload;
use crate::errors::{UpstreamError, extract_error_message_from_body};
use crate::models::EmbeddingRequest;
use crate::upstream_parse::{UpstreamEventStream, event_stream};
use crate::utils::to_salvo_status;

pub enum ChatCompletionsReply {
    Json(Value),
    Stream(UpstreamEventStream),
}

/// Client for the Copilot chat-completions API. Cheap to clone; the bearer
/// token is supplied per call from the current auth snapshot.
#[derive(Clone, Debug)]
pub struct CopilotClient {
    client: Client,
    base_url: String,
    vscode_version: String,
    request_timeout: Duration,
    stream_timeout: Option<Duration>,
}

impl CopilotClient {
    pub fn new(config: &Config) -> Result<Self, String> {
        let client = Client::builder()
            .build()
            .map_err(|error| format!("failed to initialize upstream HTTP client: {error}"))?;
        Ok(Self {
            client,
            base_url: config.copilot_base_url(),
            vscode_version: config.vscode_version.clone(),
            request_timeout: Duration::from_secs(config.request_timeout),
            stream_timeout: config.stream_request_timeout.map(Duration::from_secs),
        })
    }

    pub async fn chat_completions(
        &self,
        token: &str,
        payload: &ChatCompletionsPayload,
        request_id: &str,
    ) -> Result<ChatCompletionsReply, UpstreamError> {
        let streaming = payload.is_streaming();
        let (request_kind, timeout) = if streaming {
            ("stream", self.stream_timeout)
        } else {
            ("non_stream", Some(self.request_timeout))
        };

        let mut headers = copilot_headers(
            token,
            &self.vscode_version,
            request_id,
            payload.has_image_input(),
        );
        headers.insert("x-initiator", HeaderValue::from_static(initiator(payload)));

        let response = self
            .send_request(
                reqwest::Method::POST,
                "/chat/completions",
                headers,
                Some(payload),
                request_id,
                timeout,
                request_kind,
            )
            .await?;

        if streaming {
            return Ok(ChatCompletionsReply::Stream(event_stream(
                response.bytes_stream(),
            )));
        }

        parse_success_json_response::<Value>(response, request_kind, "/chat/completions", request_id)
            .await
            .map(ChatCompletionsReply::Json)
    }

    pub async fn embeddings(
        &self,
        token: &str,
        payload: &EmbeddingRequest,
        request_id: &str,
    ) -> Result<Value, UpstreamError> {
        let headers = copilot_headers(token, &self.vscode_version, request_id, false);
        let response = self
            .send_request(
                reqwest::Method::POST,
                "/embeddings",
                headers,
                Some(payload),
                request_id,
                Some(self.request_timeout),
                "non_stream",
            )
            .await?;
        parse_success_json_response(response, "non_stream", "/embeddings", request_id).await
    }

    pub async fn models(&self, token: &str) -> Result<ModelsResponse, UpstreamError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let headers = copilot_headers(token, &self.vscode_version, &request_id, false);
        let response = self
            .send_request::<Value>(
                reqwest::Method::GET,
                "/models",
                headers,
                None,
                &request_id,
                Some(self.request_timeout),
                "non_stream",
            )
            .await?;
        parse_success_json_response(response, "non_stream", "/models", &request_id).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_request<T: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        headers: HeaderMap,
        body: Option<&T>,
        request_id: &str,
        timeout: Option<Duration>,
        request_kind: &'static str,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request_builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            request_builder = request_builder.json(body);
        }
        if let Some(duration) = timeout {
            request_builder = request_builder.timeout(duration);
        }

        let timeout_secs = timeout.map(|value| value.as_secs());
        debug!(
            phase = "upstream_request_start",
            request_kind,
            path,
            request_id,
            url = %url,
            timeout_secs = ?timeout_secs,
            "Sending upstream request"
        );
        let request_started = Instant::now();
        let response = request_builder.send().await.map_err(|error| {
            build_send_error(
                error,
                timeout,
                request_kind,
                path,
                request_id,
                request_started.elapsed(),
            )
        })?;

        debug!(
            phase = "upstream_response_headers",
            request_kind,
            path,
            request_id,
            status = %response.status(),
            content_type = %response_content_type(&response),
            content_length = ?response.content_length(),
            elapsed_ms = request_started.elapsed().as_millis() as u64,
            "Received upstream response headers"
        );

        if response.status().is_success() {
            return Ok(response);
        }

        Err(read_http_error(response, request_kind, path, request_id).await)
    }
}

/// `agent` when the conversation already contains assistant or tool turns.
pub fn initiator(payload: &ChatCompletionsPayload) -> &'static str {
    if payload.is_agent_call() {
        "agent"
    } else {
        "user"
    }
}

pub fn copilot_headers(
    token: &str,
    vscode_version: &str,
    request_id: &str,
    vision: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Ok(auth_value) = HeaderValue::from_str(&format!("Bearer {token}")) {
        headers.insert(AUTHORIZATION, auth_value);
    }
    headers.insert(
        "copilot-integration-id",
        HeaderValue::from_static(COPILOT_INTEGRATION_ID),
    );
    insert_dynamic(&mut headers, "editor-version", &format!("vscode/{vscode_version}"));
    insert_dynamic(&mut headers, "editor-plugin-version", &editor_plugin_version());
    if let Ok(value) = HeaderValue::from_str(&copilot_user_agent()) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(
        "openai-intent",
        HeaderValue::from_static("conversation-panel"),
    );
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static(COPILOT_API_VERSION),
    );
    insert_dynamic(&mut headers, "x-request-id", request_id);
    headers.insert(
        "x-vscode-user-agent-library-version",
        HeaderValue::from_static("electron-fetch"),
    );

    if vision {
        headers.insert("copilot-vision-request", HeaderValue::from_static("true"));
    }

    headers
}

pub(crate) fn insert_dynamic(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("invalid header value ignored for {name}"),
    }
}

const BODY_PREVIEW_LIMIT: usize = 1024;

pub(crate) async fn read_http_error(
    response: reqwest::Response,
    request_kind: &str,
    path: &str,
    request_id: &str,
) -> UpstreamError {
    let upstream_status = response.status();
    let status = to_salvo_status(upstream_status);
    let content_type = response_content_type(&response);

    let text = match response.text().await {
        Ok(value) => value,
        Err(error) => {
            warn!(
                phase = "upstream_error_body_read_failed",
                request_kind,
                path,
                request_id,
                status = %status,
                "Failed to read upstream error response body: {error}"
            );
            String::new()
        }
    };

    warn!(
        phase = "upstream_http_error",
        request_kind,
        path,
        request_id,
        status = %status,
        content_type = %content_type,
        body_bytes = text.len(),
        body_preview = %preview_text(&text, BODY_PREVIEW_LIMIT),
        "Upstream returned non-success status"
    );

    UpstreamError {
        status,
        message: extract_error_message_from_body(&text),
        timed_out: false,
    }
}

fn response_content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "<missing>".to_string())
}

pub(crate) async fn parse_success_json_response<T: DeserializeOwned>(
    response: reqwest::Response,
    request_kind: &str,
    path: &str,
    request_id: &str,
) -> Result<T, UpstreamError> {
    let status = response.status();
    let content_type = response_content_type(&response);

    let body_read_started = Instant::now();
    let body = response.bytes().await.map_err(|error| {
        error!(
            phase = "upstream_body_read_failed",
            request_kind,
            path,
            request_id,
            status = %status,
            elapsed_ms = body_read_started.elapsed().as_millis() as u64,
            "Failed to read upstream response body: {error}"
        );
        if error.is_timeout() {
            UpstreamError::timeout(format!("upstream response body timed out: {error}"))
        } else {
            UpstreamError::bad_gateway(format!("failed to read upstream response body: {error}"))
        }
    })?;

    debug!(
        phase = "upstream_success_body_read_done",
        request_kind,
        path,
        request_id,
        status = %status,
        body_bytes = body.len(),
        elapsed_ms = body_read_started.elapsed().as_millis() as u64,
        "Read upstream success response body"
    );

    decode_json_body::<T>(status, &content_type, &body)
}

fn decode_json_body<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    content_type: &str,
    body: &[u8],
) -> Result<T, UpstreamError> {
    serde_json::from_slice::<T>(body).map_err(|error| {
        let body_preview = preview_text(&String::from_utf8_lossy(body), BODY_PREVIEW_LIMIT)
            .into_owned();
        UpstreamError::bad_gateway(format!(
            "failed to parse upstream JSON response (status: {status}, content-type: {content_type}, body-preview: {body_preview}): {error}"
        ))
    })
}

fn preview_text(text: &str, limit: usize) -> Cow<'_, str> {
    let mut iterator = text.chars();
    let preview: String = iterator.by_ref().take(limit).collect();
    if iterator.next().is_none() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{preview}...(truncated)"))
    }
}

pub(crate) fn build_send_error(
    error: reqwest::Error,
    timeout: Option<Duration>,
    request_kind: &str,
    path: &str,
    request_id: &str,
    elapsed: Duration,
) -> UpstreamError {
    let timeout_secs = timeout.map(|value| value.as_secs());
    let elapsed_ms = elapsed.as_millis() as u64;

    if error.is_timeout() {
        error!(
            phase = "upstream_connect_timeout",
            request_kind,
            path,
            request_id,
            timeout_secs = ?timeout_secs,
            elapsed_ms,
            "Upstream timeout before response headers"
        );
        return UpstreamError::timeout(format!("upstream request timed out: {error}"));
    }

    if error.is_connect() {
        error!(
            phase = "upstream_connect_error",
            request_kind,
            path,
            request_id,
            timeout_secs = ?timeout_secs,
            elapsed_ms,
            "Upstream connection failed before response headers: {error}"
        );
    } else {
        error!(
            phase = "upstream_request_error",
            request_kind,
            path,
            request_id,
            timeout_secs = ?timeout_secs,
            elapsed_ms,
            "Upstream request failed before response headers: {error}"
        );
    }

    UpstreamError::bad_gateway(format!("upstream request failed: {error}"))
}

#[cfg(test)]
mod tests {
    use super::{copilot_headers, decode_json_body, initiator, preview_text};
    use crate::constants::{ROLE_ASSISTANT, ROLE_TOOL, ROLE_USER};
    use crate::conversion::request::{ChatCompletionsPayload, ChatMessage};
    use reqwest::StatusCode;
    use serde::Deserialize;

    fn payload_with_roles(roles: &[&str]) -> ChatCompletionsPayload {
        ChatCompletionsPayload {
            model: "gpt-test".to_string(),
            messages: roles
                .iter()
                .map(|role| ChatMessage::text(role, "hi"))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn initiator_is_user_for_fresh_conversations() {
        assert_eq!(initiator(&payload_with_roles(&[ROLE_USER])), "user");
        assert_eq!(initiator(&payload_with_roles(&["system", ROLE_USER])), "user");
    }

    #[test]
    fn initiator_is_agent_after_assistant_or_tool_turns() {
        assert_eq!(initiator(&payload_with_roles(&[ROLE_USER, ROLE_TOOL])), "agent");
        assert_eq!(
            initiator(&payload_with_roles(&[ROLE_USER, ROLE_ASSISTANT, ROLE_USER])),
            "agent"
        );
    }

    #[test]
    fn builds_copilot_headers() {
        let headers = copilot_headers("tid=abc", "1.99.3", "req-1", false);
        let get = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        assert_eq!(get("authorization"), Some("Bearer tid=abc"));
        assert_eq!(get("copilot-integration-id"), Some("vscode-chat"));
        assert_eq!(get("editor-version"), Some("vscode/1.99.3"));
        assert_eq!(get("editor-plugin-version"), Some("copilot-chat/0.26.7"));
        assert_eq!(get("user-agent"), Some("GitHubCopilotChat/0.26.7"));
        assert_eq!(get("x-github-api-version"), Some("2025-04-01"));
        assert_eq!(get("x-request-id"), Some("req-1"));
        assert_eq!(get("copilot-vision-request"), None);

        let vision = copilot_headers("tid=abc", "1.99.3", "req-2", true);
        assert_eq!(
            vision
                .get("copilot-vision-request")
                .and_then(|value| value.to_str().ok()),
            Some("true")
        );
    }

    #[derive(Debug, Deserialize)]
    struct TestPayload {
        value: String,
    }

    #[test]
    fn decodes_valid_json_payload() {
        let payload = decode_json_body::<TestPayload>(
            StatusCode::OK,
            "application/json",
            br#"{"value":"ok"}"#,
        )
        .expect("json should decode");

        assert_eq!(payload.value, "ok");
    }

    #[test]
    fn parse_error_includes_status_content_type_and_preview() {
        let error = decode_json_body::<TestPayload>(
            StatusCode::OK,
            "text/html",
            b"<html><body>upstream gateway failed</body></html>",
        )
        .expect_err("json should fail");

        assert_eq!(error.status, salvo::http::StatusCode::BAD_GATEWAY);
        assert!(error.message.contains("status: 200 OK"));
        assert!(error.message.contains("content-type: text/html"));
        assert!(
            error
                .message
                .contains("body-preview: <html><body>upstream gateway failed</body></html>")
        );
    }

    #[test]
    fn preview_text_truncates_long_text() {
        assert_eq!(preview_text("abcdef", 3), "abc...(truncated)");
        assert_eq!(preview_text("abc", 3), "abc");
    }
}
