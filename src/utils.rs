use salvo::http::StatusCode;
use serde::{Deserialize, Deserializer};
use tracing_subscriber::EnvFilter;

pub fn to_salvo_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// `RUST_LOG` wins over the configured level.
/// Reads an explicit JSON `null` the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_log_level(log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn normalize_log_level(log_level: &str) -> String {
    log_level
        .split_whitespace()
        .next()
        .unwrap_or("info")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_log_level, to_salvo_status};

    #[test]
    fn normalizes_configured_level() {
        assert_eq!(normalize_log_level("DEBUG"), "debug");
        assert_eq!(normalize_log_level("  WARN # noisy"), "warn");
        assert_eq!(normalize_log_level(""), "info");
    }

    #[test]
    fn keeps_upstream_status_codes() {
        assert_eq!(
            to_salvo_status(reqwest::StatusCode::TOO_MANY_REQUESTS).as_u16(),
            429
        );
    }
}
