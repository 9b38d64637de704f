//! Error types shared across the proxy.
//!
//! # Responsibilities
//! - One typed error per failure class the proxy distinguishes
//! - Keep image-level failures isolated from document-level ones
//! - Map cleanly onto the built-in error pages

use thiserror::Error;

/// Errors produced by the transcoding pipeline and request lifecycle.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A resource (document, image, SVG source) exceeded a configured size cap.
    #[error("resource exceeds size limits")]
    TooLarge,

    /// A fetch or processing stage ran past its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Upstream answered with an error status on the top-level URL.
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    /// The upstream request failed at the transport level.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// A palette index was out of range for the requested bit depth.
    #[error("pixel index {index} exceeds {depth}-bit depth")]
    InvalidPixelIndex { index: u8, depth: u8 },

    /// The client exceeded its per-IP request allowance.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The client request body exceeded the configured maximum.
    #[error("request body too large")]
    RequestTooLarge,

    /// A URL used a scheme the client cannot follow.
    #[error("unsupported url scheme {0}")]
    UnsupportedScheme(String),

    /// The input could not be parsed (HTML, SVG, or raster data).
    #[error("content could not be parsed")]
    ParseFailure,
}

pub type Result<T> = std::result::Result<T, ProxyError>;
