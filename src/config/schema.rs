//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits so the `about.xiino` page can render a
//! config summary.

use serde::{Deserialize, Serialize};

/// Root configuration for the transcoding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host/port).
    pub server: ServerConfig,

    /// Security caps: rate limiting, redirects, request size.
    pub security: SecurityConfig,

    /// Upstream HTTP behavior.
    pub http: HttpConfig,

    /// Image pipeline caps and tuning.
    pub image: ImageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g. "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,
}

impl ServerConfig {
    /// Full bind address in `host:port` form.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Probe `https` before falling back to a plain `http` URL.
    pub attempt_https_upgrade: bool,

    /// Follow upstream redirects at all.
    pub allow_redirects: bool,

    /// Maximum redirect hops per fetch.
    pub max_redirects: u32,

    /// Token bucket capacity per client IP per 60 s window.
    pub max_requests_per_min: u32,

    /// Maximum client request body size in megabytes.
    pub max_request_size_mb: usize,
}

impl SecurityConfig {
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_size_mb * 1024 * 1024
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            attempt_https_upgrade: true,
            allow_redirects: true,
            max_redirects: 5,
            max_requests_per_min: 60,
            max_request_size_mb: 10,
        }
    }
}

/// Upstream HTTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Hard cap for one upstream fetch, in seconds.
    pub timeout_secs: u64,

    /// User-Agent sent upstream unless the caller overrides it.
    pub user_agent: String,

    /// Maximum transcoded page size in kilobytes.
    pub max_page_size_kb: usize,

    /// Optional SOCKS proxy URL (e.g. "socks5://127.0.0.1:1080").
    pub socks_proxy: Option<String>,
}

impl HttpConfig {
    pub fn max_page_bytes(&self) -> usize {
        self.max_page_size_kb * 1024
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: concat!("XiinoProxy/", env!("CARGO_PKG_VERSION")).to_string(),
            max_page_size_kb: 512,
            socks_proxy: None,
        }
    }
}

/// Dither algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DitherPriority {
    /// Floyd-Steinberg error diffusion in LAB space, Lanczos-3 resize.
    #[default]
    Quality,
    /// Ordered 8x8 Bayer thresholding, bilinear resize.
    Performance,
}

impl std::str::FromStr for DitherPriority {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "performance" => Ok(Self::Performance),
            _ => Err(()),
        }
    }
}

/// Image pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Maximum raster source size in megabytes.
    pub max_size_mb: usize,

    /// Maximum SVG source size in bytes.
    pub max_svg_size: usize,

    /// Maximum decoded `data:` URL payload in bytes.
    pub max_data_url_size: usize,

    /// Maximum decoded pixel count (width * height).
    pub max_pixels: u64,

    /// Maximum decoded width or height.
    pub max_dimension: u32,

    /// Maximum images transcoded into one page.
    pub max_per_page: u32,

    /// Hard cap for SVG rasterization, in seconds.
    pub svg_timeout_secs: u64,

    /// Hard cap for one image's full pipeline, in seconds.
    pub processing_timeout_secs: u64,

    /// Quality/performance trade-off for resize and dithering.
    pub dither_priority: DitherPriority,
}

impl ImageConfig {
    pub fn max_source_bytes(&self) -> usize {
        self.max_size_mb * 1024 * 1024
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 5,
            max_svg_size: 1024 * 1024,
            max_data_url_size: 1024 * 1024,
            max_pixels: 1_000_000,
            max_dimension: 2048,
            max_per_page: 100,
            svg_timeout_secs: 5,
            processing_timeout_secs: 30,
            dither_priority: DitherPriority::Quality,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
