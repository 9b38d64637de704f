//! Configuration loading from environment variables.
//!
//! Every variable is optional. An unset variable takes its documented
//! default; a set-but-invalid value also takes the default and emits a
//! warning, so a typo can never keep the proxy from starting. Unknown
//! variables are ignored.

use std::fmt::Display;
use std::str::FromStr;

use crate::config::schema::{DitherPriority, ProxyConfig};

/// Load the full configuration from the process environment.
pub fn from_env() -> ProxyConfig {
    let mut config = ProxyConfig::default();

    config.server.host = env_string("HOST", config.server.host);
    config.server.port = env_parse("PORT", config.server.port);

    config.observability.log_level = env_string("LOG_LEVEL", config.observability.log_level);
    config.observability.metrics_enabled =
        env_parse("METRICS_ENABLED", config.observability.metrics_enabled);
    config.observability.metrics_address =
        env_string("METRICS_ADDRESS", config.observability.metrics_address);

    config.security.attempt_https_upgrade = env_parse(
        "SECURITY_ATTEMPT_HTTPS_UPGRADE",
        config.security.attempt_https_upgrade,
    );
    config.security.allow_redirects =
        env_parse("SECURITY_ALLOW_REDIRECTS", config.security.allow_redirects);
    config.security.max_redirects =
        env_parse("SECURITY_MAX_REDIRECTS", config.security.max_redirects);
    config.security.max_requests_per_min = env_parse(
        "SECURITY_MAX_REQUESTS_PER_MIN",
        config.security.max_requests_per_min,
    );
    config.security.max_request_size_mb = env_parse(
        "SECURITY_MAX_REQUEST_SIZE",
        config.security.max_request_size_mb,
    );

    config.http.timeout_secs = env_parse("HTTP_TIMEOUT", config.http.timeout_secs);
    config.http.user_agent = env_string("HTTP_USER_AGENT", config.http.user_agent);
    config.http.max_page_size_kb = env_parse("HTTP_MAX_PAGE_SIZE", config.http.max_page_size_kb);
    config.http.socks_proxy = std::env::var("HTTP_SOCKS_PROXY").ok().filter(|v| !v.is_empty());

    config.image.max_size_mb = env_parse("IMAGE_MAX_SIZE", config.image.max_size_mb);
    config.image.max_svg_size = env_parse("IMAGE_MAX_SVG_SIZE", config.image.max_svg_size);
    config.image.max_data_url_size =
        env_parse("IMAGE_MAX_DATA_URL_SIZE", config.image.max_data_url_size);
    config.image.max_pixels = env_parse("IMAGE_MAX_PIXELS", config.image.max_pixels);
    config.image.max_dimension = env_parse("IMAGE_MAX_DIMENSION", config.image.max_dimension);
    config.image.max_per_page = env_parse("IMAGE_MAX_PER_PAGE", config.image.max_per_page);
    config.image.svg_timeout_secs = env_parse("IMAGE_SVG_TIMEOUT", config.image.svg_timeout_secs);
    config.image.processing_timeout_secs = env_parse(
        "IMAGE_PROCESSING_TIMEOUT",
        config.image.processing_timeout_secs,
    );
    config.image.dither_priority = match std::env::var("IMAGE_DITHER_PRIORITY") {
        Ok(raw) => match DitherPriority::from_str(&raw) {
            Ok(v) => v,
            Err(()) => {
                tracing::warn!(
                    variable = "IMAGE_DITHER_PRIORITY",
                    value = %raw,
                    "Invalid value, falling back to default"
                );
                config.image.dither_priority
            }
        },
        Err(_) => config.image.dither_priority,
    };

    config
}

/// Read a string variable, falling back to `default` when unset or empty.
fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default,
    }
}

/// Read and parse a variable, warning and falling back on invalid input.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    variable = key,
                    value = %raw,
                    default = %default,
                    "Invalid value, falling back to default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = ProxyConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.http.max_page_size_kb, 512);
        assert_eq!(config.security.max_requests_per_min, 60);
        assert_eq!(config.image.dither_priority, DitherPriority::Quality);
    }

    #[test]
    fn invalid_value_falls_back() {
        std::env::set_var("HTTP_TIMEOUT", "not-a-number");
        let config = from_env();
        assert_eq!(config.http.timeout_secs, 10);
        std::env::remove_var("HTTP_TIMEOUT");
    }
}
