//! Request orchestration.
//!
//! # Responsibilities
//! - Rate limit and request-size checks, answered with renderable pages
//! - Device profile and target URL extraction
//! - `.xiino` pseudo-domain dispatch (no outbound fetch)
//! - Budget assembly, fetch, transcode, response assembly with cookies

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use url::Url;
use uuid::Uuid;

use crate::budget::Budget;
use crate::cookies::session_key;
use crate::error::ProxyError;
use crate::html::strip_to_plaintext;
use crate::http::request::{parse_request_path, DeviceProfile, RequestId};
use crate::http::response::page_response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::pages;

/// Handle one client request end to end.
pub async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .copied()
        .unwrap_or(RequestId(Uuid::new_v4()));

    if !state.rate_limiter.check(addr.ip()) {
        tracing::warn!(request_id = %request_id, client = %addr.ip(), "Rate limit exceeded");
        metrics::record_rate_limited();
        return respond(
            StatusCode::TOO_MANY_REQUESTS,
            &pages::rate_limited_page(),
            &[],
            started,
        );
    }

    let path_qs = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let (device, target) = parse_request_path(&path_qs);

    let user_agent = header_string(&request, header::USER_AGENT).unwrap_or_default();
    let session = session_key(addr.ip(), &user_agent);
    let authorization = header_string(&request, header::AUTHORIZATION);
    let client_cookies = header_string(&request, header::COOKIE);
    let method = request.method().clone();

    let Some(target) = target else {
        return respond(StatusCode::BAD_REQUEST, &pages::bad_request_page(), &[], started);
    };
    let Ok(target_url) = Url::parse(&target) else {
        tracing::debug!(request_id = %request_id, target = %target, "Unparseable target");
        return respond(StatusCode::BAD_REQUEST, &pages::bad_request_page(), &[], started);
    };

    tracing::debug!(
        request_id = %request_id,
        client = %addr.ip(),
        target = %target_url,
        mode = ?device.mode,
        "Routing request"
    );

    // Reserved pseudo-domains are served internally, never resolved.
    if let Some(host) = target_url.host_str() {
        if host.ends_with(".xiino") {
            let content = pages::dispatch(host, &device, &state.config);
            return respond(StatusCode::OK, &content, &[], started);
        }
    }

    if !matches!(target_url.scheme(), "http" | "https") {
        return respond(StatusCode::BAD_REQUEST, &pages::bad_request_page(), &[], started);
    }

    if let Some(cookie_header) = &client_cookies {
        state
            .cookies
            .import_client_cookies(session, cookie_header, &target_url);
    }

    // Read the request body under the configured cap.
    let body_limit = state.config.security.max_request_bytes();
    let body = match axum::body::to_bytes(request.into_body(), body_limit).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(bytes.to_vec()),
        Err(_) => {
            tracing::warn!(request_id = %request_id, "Request body over limit");
            return respond(
                StatusCode::PAYLOAD_TOO_LARGE,
                &pages::request_too_large_page(),
                &[],
                started,
            );
        }
    };

    let deadline = Instant::now()
        + Duration::from_secs(
            state.config.http.timeout_secs + state.config.image.processing_timeout_secs,
        );

    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let fetched = match state
        .fetcher
        .fetch_document(target_url.clone(), method, body, authorization, session)
        .await
    {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(request_id = %request_id, target = %target_url, %error, "Fetch failed");
            return error_response(&error, target_url.as_str(), started);
        }
    };

    if fetched.status >= 400 {
        let status =
            StatusCode::from_u16(fetched.status).unwrap_or(StatusCode::BAD_GATEWAY);
        return respond(
            status,
            &pages::upstream_error_page(fetched.status, target_url.as_str()),
            &[],
            started,
        );
    }

    let budget = Budget::new(
        state.config.http.max_page_bytes(),
        state.config.image.max_per_page,
        deadline,
    );

    let response = if is_image_response(fetched.content_type.as_deref(), fetched.final_url.path())
    {
        serve_image(&state, &device, fetched, &budget, session, started).await
    } else {
        serve_document(&state, &device, fetched, &budget, session, started).await
    };

    tracing::debug!(
        request_id = %request_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request complete"
    );
    response
}

/// A directly requested image becomes a one-image page.
async fn serve_image(
    state: &AppState,
    device: &DeviceProfile,
    fetched: crate::fetch::FetchedResponse,
    budget: &Budget,
    session: u64,
    started: Instant,
) -> Response {
    let target = fetched.final_url.clone();
    match state
        .processor
        .transcode(
            fetched.body,
            fetched.content_type.as_deref(),
            device.mode,
            budget,
        )
        .await
    {
        Ok(transcoded) => {
            let (w, h) = (transcoded.image.width, transcoded.image.height);
            let markup = format!(
                "<IMG SRC=\"{src}\" WIDTH=\"{w}\" HEIGHT=\"{h}\" \
                 EBDWIDTH=\"{w}\" EBDHEIGHT=\"{h}\">",
                src = transcoded.src,
            );
            let cookies = state.cookies.downstream_set_cookies(session, &target);
            respond(
                StatusCode::OK,
                &pages::image_page(target.as_str(), &markup),
                &cookies,
                started,
            )
        }
        Err(error) => error_response(&error, target.as_str(), started),
    }
}

async fn serve_document(
    state: &AppState,
    device: &DeviceProfile,
    fetched: crate::fetch::FetchedResponse,
    budget: &Budget,
    session: u64,
    started: Instant,
) -> Response {
    let target = fetched.final_url.clone();
    let html = String::from_utf8_lossy(&fetched.body).into_owned();

    match state
        .transcoder
        .transcode(html.clone(), target.clone(), device.mode, budget, session)
        .await
    {
        Ok(mut serialized) => {
            // A body cut off at the fetch cap still owes the reader a
            // truncation marker, even when the rewritten document fits.
            if fetched.truncated && !serialized.truncated {
                serialized
                    .html
                    .push_str(crate::html::serialize::TRUNCATION_NOTICE);
                serialized.truncated = true;
            }
            if serialized.truncated {
                tracing::info!(target = %target, "Page truncated at weight cap");
            }
            let cookies = state.cookies.downstream_set_cookies(session, &target);
            respond(StatusCode::OK, &serialized.html, &cookies, started)
        }
        Err(ProxyError::ParseFailure) => {
            let text = strip_to_plaintext(&html);
            respond(
                StatusCode::OK,
                &pages::plaintext_page(target.as_str(), &text),
                &[],
                started,
            )
        }
        Err(error) => error_response(&error, target.as_str(), started),
    }
}

/// Map a pipeline error onto its client-renderable page.
fn error_response(error: &ProxyError, target: &str, started: Instant) -> Response {
    let (status, content) = match error {
        ProxyError::TooLarge => (StatusCode::OK, pages::page_too_large_page(target)),
        ProxyError::Timeout => (StatusCode::GATEWAY_TIMEOUT, pages::timeout_page(target)),
        ProxyError::UpstreamStatus(code) => (
            StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY),
            pages::upstream_error_page(*code, target),
        ),
        ProxyError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, pages::rate_limited_page()),
        ProxyError::RequestTooLarge => (
            StatusCode::PAYLOAD_TOO_LARGE,
            pages::request_too_large_page(),
        ),
        ProxyError::Upstream(_) => (
            StatusCode::BAD_GATEWAY,
            pages::upstream_error_page(502, target),
        ),
        ProxyError::ParseFailure
        | ProxyError::InvalidPixelIndex { .. }
        | ProxyError::UnsupportedScheme(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            pages::internal_error_page(),
        ),
    };
    respond(status, &content, &[], started)
}

fn respond(
    status: StatusCode,
    content: &str,
    set_cookies: &[String],
    started: Instant,
) -> Response {
    metrics::record_request(status.as_u16(), started);
    page_response(status, content, set_cookies)
}

fn header_string(request: &Request<Body>, name: header::HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Direct image requests bypass the HTML transcoder.
fn is_image_response(content_type: Option<&str>, path: &str) -> bool {
    if let Some(ct) = content_type {
        if ct.starts_with("image/") {
            return true;
        }
        // Explicit non-image content type wins over the extension.
        if ct.starts_with("text/html") {
            return false;
        }
    }
    let lower = path.to_ascii_lowercase();
    [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".tiff", ".svg"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_detection_prefers_content_type() {
        assert!(is_image_response(Some("image/png"), "/x"));
        assert!(!is_image_response(Some("text/html; charset=utf-8"), "/a.png"));
        assert!(is_image_response(None, "/photo.JPEG"));
        assert!(!is_image_response(None, "/page"));
    }
}
