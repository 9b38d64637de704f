//! Request parsing and identification.
//!
//! # Responsibilities
//! - Generate a request ID as early as possible for tracing
//! - Parse the Xiino device-code path segments into a device profile
//! - Extract the target URL from the path or the `url` query parameter
//!
//! The client encodes its capabilities as leading path segments, e.g.
//! `GET /c8/w153/http://example.com/` means 8-bit color, 153 px wide.

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::palette::ColorMode;

/// Per-request identifier, injected by [`request_id_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Attach a UUID to the request and echo it on the response.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Client capabilities for one request. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Usable screen width in pixels, post the client's 2:1 downscale.
    pub screen_width: u32,
    pub mode: ColorMode,
    /// Requested text encoding, if the client named one.
    pub encoding: Option<String>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            screen_width: 153,
            mode: ColorMode::Color8,
            encoding: None,
        }
    }
}

/// Parse the downstream path+query into a device profile and target URL.
///
/// Grayscale codes win over color codes when both appear, matching the
/// client's own preference order.
pub fn parse_request_path(path_qs: &str) -> (DeviceProfile, Option<String>) {
    let mut device = DeviceProfile::default();
    let mut gray: Option<u32> = None;

    let path_only = path_qs.split('?').next().unwrap_or(path_qs);
    let url_start = path_qs
        .find("http://")
        .or_else(|| path_qs.find("https://"));
    let device_region = match url_start {
        Some(pos) => &path_only[..pos.min(path_only.len())],
        None => path_only,
    };

    let mut consumed = 0usize;
    for segment in device_region.split('/') {
        if segment.is_empty() {
            consumed += 1;
            continue;
        }
        let mut chars = segment.chars();
        let head = chars.next().unwrap_or_default();
        let rest = chars.as_str();
        match head {
            // Color-depth segment: consumed, the default mode is color.
            'c' if rest.chars().all(|c| c.is_ascii_digit()) => {}
            'g' if rest.chars().all(|c| c.is_ascii_digit()) => {
                gray = Some(rest.parse().unwrap_or(4));
            }
            'w' if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) => {
                if let Ok(width) = rest.parse::<u32>() {
                    if width > 0 {
                        device.screen_width = width;
                    }
                }
            }
            'd' | 'e' => {
                let enc = rest.trim_start_matches(['d', 'e']);
                // Anything outside the encoding alphabet is not a device
                // code; treat it as the start of the target instead.
                if !enc.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    break;
                }
                if !enc.is_empty() {
                    device.encoding = Some(enc.to_string());
                }
            }
            _ => break,
        }
        consumed += segment.len() + 1;
    }

    device.mode = match gray {
        Some(1) => ColorMode::Mono1,
        Some(2) => ColorMode::Gray2,
        Some(_) => ColorMode::Gray4,
        None => ColorMode::Color8,
    };

    let target = if let Some(pos) = url_start {
        Some(path_qs[pos..].to_string())
    } else if let Some(from_query) = target_from_query(path_qs) {
        Some(from_query)
    } else {
        let rest = path_only
            .get(consumed.min(path_only.len())..)
            .unwrap_or("")
            .trim_matches('/');
        if rest.is_empty() {
            None
        } else {
            Some(format!("http://{rest}"))
        }
    };

    (device, target)
}

fn target_from_query(path_qs: &str) -> Option<String> {
    let query = path_qs.split_once('?')?.1;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
