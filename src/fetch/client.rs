//! Upstream HTTP client.
//!
//! # Responsibilities
//! - Fetch documents and images with streaming size caps
//! - Opportunistic HTTPS upgrade with a short probe timeout
//! - Manual redirect following, capped, dropping Authorization
//!   cross-origin
//! - Bridge the session cookie jar onto every hop
//! - Optional SOCKS proxy routing

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::config::{HttpConfig, ImageConfig, SecurityConfig};
use crate::cookies::{CookieBridge, SessionKey};
use crate::error::{ProxyError, Result};

/// Ceiling for the HTTPS upgrade probe.
const UPGRADE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// What to do when a body runs past its size cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverflowPolicy {
    /// Keep the capped prefix and flag it; documents degrade gracefully.
    Truncate,
    /// Fail with `TooLarge`; a partial image is useless.
    Reject,
}

/// A fully read upstream response.
#[derive(Debug)]
pub struct FetchedResponse {
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Set when the body hit the size cap and was cut off.
    pub truncated: bool,
}

pub struct Fetcher {
    client: reqwest::Client,
    security: SecurityConfig,
    page_cap: usize,
    image_cap: usize,
    cookies: std::sync::Arc<CookieBridge>,
}

impl Fetcher {
    pub fn new(
        http: &HttpConfig,
        security: &SecurityConfig,
        image: &ImageConfig,
        cookies: std::sync::Arc<CookieBridge>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(Duration::from_secs(http.timeout_secs))
            .redirect(reqwest::redirect::Policy::none());

        if let Some(proxy_url) = &http.socks_proxy {
            match reqwest::Proxy::all(proxy_url.as_str()) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(error) => {
                    tracing::warn!(proxy = %proxy_url, %error, "Invalid SOCKS proxy, going direct");
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            security: security.clone(),
            page_cap: http.max_page_bytes(),
            image_cap: image.max_source_bytes(),
            cookies,
        })
    }

    /// Fetch a top-level document, capped at the page size limit.
    pub async fn fetch_document(
        &self,
        url: Url,
        method: Method,
        body: Option<Vec<u8>>,
        authorization: Option<String>,
        session: SessionKey,
    ) -> Result<FetchedResponse> {
        self.fetch(
            url,
            method,
            body,
            authorization,
            session,
            self.page_cap,
            OverflowPolicy::Truncate,
        )
        .await
    }

    /// Fetch an image, capped at the image source limit.
    pub async fn fetch_image(&self, url: Url, session: SessionKey) -> Result<FetchedResponse> {
        self.fetch(
            url,
            Method::GET,
            None,
            None,
            session,
            self.image_cap,
            OverflowPolicy::Reject,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch(
        &self,
        url: Url,
        method: Method,
        body: Option<Vec<u8>>,
        authorization: Option<String>,
        session: SessionKey,
        cap: usize,
        overflow: OverflowPolicy,
    ) -> Result<FetchedResponse> {
        let original_origin = url.origin();
        let mut current = url;
        let mut method = method;
        let mut body = body;
        let mut authorization = authorization;
        let mut hops: u32 = 0;

        loop {
            let response = if hops == 0
                && self.security.attempt_https_upgrade
                && current.scheme() == "http"
            {
                match self
                    .probe_https(&current, &method, &body, &authorization, session)
                    .await
                {
                    Some(upgraded) => upgraded,
                    None => {
                        self.send(&current, &method, &body, &authorization, session)
                            .await?
                    }
                }
            } else {
                self.send(&current, &method, &body, &authorization, session)
                    .await?
            };

            let final_url = response.url().clone();
            let set_cookies: Vec<String> = response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok().map(String::from))
                .collect();
            self.cookies
                .store_response_cookies(session, &set_cookies, &final_url);

            let status = response.status();
            if status.is_redirection() && self.security.allow_redirects {
                if let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    if hops >= self.security.max_redirects {
                        return Err(ProxyError::Upstream("redirect limit exceeded".into()));
                    }
                    let next = final_url
                        .join(location)
                        .map_err(|_| ProxyError::Upstream("invalid redirect target".into()))?;
                    if next.origin() != original_origin {
                        authorization = None;
                    }
                    if status == StatusCode::SEE_OTHER
                        || (method == Method::POST
                            && matches!(
                                status,
                                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
                            ))
                    {
                        method = Method::GET;
                        body = None;
                    }
                    hops += 1;
                    current = next;
                    continue;
                }
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let (body, truncated) = read_capped(response, cap, overflow).await?;

            return Ok(FetchedResponse {
                final_url,
                status: status.as_u16(),
                content_type,
                body,
                truncated,
            });
        }
    }

    /// Try the same request over https; any failure (connect, TLS, 5xx,
    /// slow handshake) falls back to the original plain URL.
    async fn probe_https(
        &self,
        url: &Url,
        method: &Method,
        body: &Option<Vec<u8>>,
        authorization: &Option<String>,
        session: SessionKey,
    ) -> Option<reqwest::Response> {
        let mut upgraded = url.clone();
        upgraded.set_scheme("https").ok()?;

        let attempt = self.send(&upgraded, method, body, authorization, session);
        match tokio::time::timeout(UPGRADE_PROBE_TIMEOUT, attempt).await {
            Ok(Ok(response)) if !response.status().is_server_error() => {
                tracing::debug!(url = %upgraded, "HTTPS upgrade succeeded");
                Some(response)
            }
            _ => {
                tracing::debug!(url = %url, "HTTPS upgrade failed, using plain http");
                None
            }
        }
    }

    async fn send(
        &self,
        url: &Url,
        method: &Method,
        body: &Option<Vec<u8>>,
        authorization: &Option<String>,
        session: SessionKey,
    ) -> Result<reqwest::Response> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(header) = self.cookies.cookie_header(session, url) {
            request = request.header(COOKIE, header);
        }
        if let Some(auth) = authorization {
            request = request.header(AUTHORIZATION, auth.clone());
        }
        if let Some(bytes) = body {
            request = request.body(bytes.clone());
        }
        request.send().await.map_err(map_transport_error)
    }
}

fn map_transport_error(error: reqwest::Error) -> ProxyError {
    if error.is_timeout() {
        ProxyError::Timeout
    } else {
        ProxyError::Upstream(error.to_string())
    }
}

/// Stream the body into memory, stopping once the cap is passed. Never
/// trusts Content-Length; reads at most one chunk past the cap.
async fn read_capped(
    response: reqwest::Response,
    cap: usize,
    overflow: OverflowPolicy,
) -> Result<(Vec<u8>, bool)> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_transport_error)?;
        if body.len() + chunk.len() > cap {
            match overflow {
                OverflowPolicy::Reject => return Err(ProxyError::TooLarge),
                OverflowPolicy::Truncate => {
                    body.extend_from_slice(&chunk[..cap - body.len()]);
                    return Ok((body, true));
                }
            }
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}
