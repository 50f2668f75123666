use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountType {
    Individual,
    Business,
    Enterprise,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Business => "business",
            Self::Enterprise => "enterprise",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub account_type: AccountType,
    pub github_token: Option<String>,
    pub vscode_version: String,
    pub copilot_base_url: Option<String>,
    pub sse_keepalive_seconds: u64,
    pub request_timeout: u64,
    pub stream_request_timeout: Option<u64>,
    pub request_body_max_size: usize,
    pub show_token: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TomlConfigRaw {
    host: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
    account_type: Option<String>,
    github_token: Option<String>,
    vscode_version: Option<String>,
    copilot_base_url: Option<String>,
    sse_keepalive_seconds: Option<u64>,
    request_timeout: Option<u64>,
    stream_request_timeout: Option<u64>,
    request_body_max_size: Option<usize>,
    show_token: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        let toml_config = read_toml_config("config.toml")?.unwrap_or_default();

        let host = env::var("HOST")
            .ok()
            .or(toml_config.host)
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let port = env_u16_with_fallback("PORT", toml_config.port.unwrap_or(4141));
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .or(toml_config.log_level)
            .unwrap_or_else(|| "INFO".to_string());

        let account_type_raw = env::var("ACCOUNT_TYPE").ok().or(toml_config.account_type);
        let account_type = parse_account_type(account_type_raw.as_deref())?;

        let github_token = env::var("GH_TOKEN")
            .ok()
            .or(toml_config.github_token)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let vscode_version = env::var("VSCODE_VERSION")
            .ok()
            .or(toml_config.vscode_version)
            .unwrap_or_else(|| "1.99.3".to_string());

        let copilot_base_url = env::var("COPILOT_BASE_URL")
            .ok()
            .or(toml_config.copilot_base_url)
            .filter(|value| !value.trim().is_empty());

        let sse_keepalive_seconds = env_u64_with_fallback(
            "SSE_KEEPALIVE_SECONDS",
            toml_config.sse_keepalive_seconds.unwrap_or(60),
        );

        let request_timeout =
            env_u64_with_fallback("REQUEST_TIMEOUT", toml_config.request_timeout.unwrap_or(300));
        if request_timeout == 0 {
            return Err("REQUEST_TIMEOUT must be > 0".to_string());
        }

        let stream_request_timeout = env_optional_u64("STREAM_REQUEST_TIMEOUT")
            .or(toml_config.stream_request_timeout)
            .filter(|value| *value > 0);

        let request_body_max_size = env_usize_with_fallback(
            "REQUEST_BODY_MAX_SIZE",
            toml_config
                .request_body_max_size
                .unwrap_or(16 * 1024 * 1024),
        );

        let show_token =
            env_bool_with_fallback("SHOW_TOKEN", toml_config.show_token.unwrap_or(false));

        Ok(Self {
            host,
            port,
            log_level,
            account_type,
            github_token,
            vscode_version,
            copilot_base_url,
            sse_keepalive_seconds,
            request_timeout,
            stream_request_timeout,
            request_body_max_size,
            show_token,
        })
    }

    pub fn copilot_base_url(&self) -> String {
        if let Some(base_url) = self.copilot_base_url.as_deref() {
            return base_url.trim_end_matches('/').to_string();
        }

        match self.account_type {
            AccountType::Individual => "https://api.githubcopilot.com".to_string(),
            other => format!("https://api.{}.githubcopilot.com", other.as_str()),
        }
    }

    /// Keepalive period in milliseconds, `None` when disabled.
    pub fn sse_keepalive_millis(&self) -> Option<u64> {
        (self.sse_keepalive_seconds > 0).then(|| self.sse_keepalive_seconds.saturating_mul(1000))
    }
}

fn read_toml_config(path: &str) -> Result<Option<TomlConfigRaw>, String> {
    let config_path = Path::new(path);

    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path)
        .map_err(|error| format!("Failed to read {}: {}", config_path.display(), error))?;

    let parsed = toml::from_str::<TomlConfigRaw>(&content)
        .map_err(|error| format!("Failed to parse {}: {}", config_path.display(), error))?;

    Ok(Some(parsed))
}

fn parse_account_type(value: Option<&str>) -> Result<AccountType, String> {
    let Some(raw_value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(AccountType::Individual);
    };

    match raw_value.to_ascii_lowercase().as_str() {
        "individual" => Ok(AccountType::Individual),
        "business" => Ok(AccountType::Business),
        "enterprise" => Ok(AccountType::Enterprise),
        _ => Err(format!(
            "Invalid ACCOUNT_TYPE value '{raw_value}'. Supported values: individual, business, enterprise."
        )),
    }
}

fn env_u16_with_fallback(key: &str, fallback: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(fallback)
}

fn env_u64_with_fallback(key: &str, fallback: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn env_optional_u64(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn env_bool_with_fallback(key: &str, fallback: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(fallback)
}

fn env_usize_with_fallback(key: &str, fallback: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 4141,
        log_level: "INFO".to_string(),
        account_type: AccountType::Individual,
        github_token: None,
        vscode_version: "1.0.0".to_string(),
        copilot_base_url: None,
        sse_keepalive_seconds: 0,
        request_timeout: 90,
        stream_request_timeout: None,
        request_body_max_size: 16 * 1024 * 1024,
        show_token: false,
    }
}
