pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_TOOL: &str = "tool";

pub const CONTENT_TEXT: &str = "text";

pub const TOOL_FUNCTION: &str = "function";

pub const STOP_END_TURN: &str = "end_turn";
pub const STOP_MAX_TOKENS: &str = "max_tokens";
pub const STOP_TOOL_USE: &str = "tool_use";

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_NOT_FOUND: &str = "not_found_error";
pub const ERROR_TYPE_AUTHENTICATION: &str = "authentication_error";

pub const SSE_KEEPALIVE_FRAME: &str = ": ping\n\n";
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

pub const STREAM_TIMEOUT_MESSAGE: &str = "Upstream streaming request timed out. Please retry.";
pub const STREAM_FAILURE_MESSAGE: &str = "An unexpected error occurred during streaming.";

pub const COPILOT_VERSION: &str = "0.26.7";
pub const COPILOT_API_VERSION: &str = "2025-04-01";
pub const COPILOT_INTEGRATION_ID: &str = "vscode-chat";

pub const GITHUB_BASE_URL: &str = "https://github.com";
pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";
pub const GITHUB_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";
pub const GITHUB_APP_SCOPES: &str = "read:user";

pub fn editor_plugin_version() -> String {
    format!("copilot-chat/{COPILOT_VERSION}")
}

pub fn copilot_user_agent() -> String {
    format!("GitHubCopilotChat/{COPILOT_VERSION}")
}
