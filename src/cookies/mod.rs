//! Cookie jar and the Xiino downstream bridge.
//!
//! # Responsibilities
//! - Store upstream `Set-Cookie` headers with host/path/expiry semantics
//! - Select the matching subset for each outbound request
//! - Enforce the client's limits downstream: 40 cookies total, 20 per
//!   site, 4 KB per cookie, evicting the least-recently-set on overflow
//! - Never hand secure cookies to the plain-http downstream wire
//!
//! Jars are per session; session identity is a hash of client IP and
//! User-Agent. In-memory only.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use url::Url;

pub type SessionKey = u64;

/// Stable session identity for one device.
pub fn session_key(ip: IpAddr, user_agent: &str) -> SessionKey {
    let mut hasher = DefaultHasher::new();
    ip.hash(&mut hasher);
    user_agent.hash(&mut hasher);
    hasher.finish()
}

/// One stored cookie.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Effective domain, without a leading dot.
    pub domain: String,
    /// Set when the cookie had no Domain attribute.
    pub host_only: bool,
    pub path: String,
    /// From Max-Age; absent means a session cookie.
    pub expires_at: Option<SystemTime>,
    pub secure: bool,
    /// Monotonic set order, used for least-recently-set eviction.
    set_seq: u64,
}

impl Cookie {
    /// Parse one `Set-Cookie` header value in the context of the request
    /// URL it arrived on.
    pub fn parse(header: &str, request_url: &Url) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: request_url.host_str()?.to_ascii_lowercase(),
            host_only: true,
            path: "/".to_string(),
            expires_at: None,
            secure: false,
            set_seq: 0,
        };

        for part in parts {
            let part = part.trim();
            if let Some((attr, val)) = part.split_once('=') {
                match attr.trim().to_ascii_lowercase().as_str() {
                    "domain" => {
                        let domain = val.trim().trim_start_matches('.').to_ascii_lowercase();
                        if !domain.is_empty() && domain_matches(&cookie.domain, &domain) {
                            cookie.domain = domain;
                            cookie.host_only = false;
                        }
                    }
                    "path" => {
                        let path = val.trim();
                        if path.starts_with('/') {
                            cookie.path = path.to_string();
                        }
                    }
                    "max-age" => {
                        if let Ok(secs) = val.trim().parse::<i64>() {
                            cookie.expires_at = Some(if secs <= 0 {
                                SystemTime::UNIX_EPOCH
                            } else {
                                SystemTime::now() + Duration::from_secs(secs as u64)
                            });
                        }
                    }
                    _ => {}
                }
            } else if part.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            }
        }

        Some(cookie)
    }

    /// Wire size counted against the 4 KB client limit.
    pub fn size(&self) -> usize {
        self.name.len() + 1 + self.value.len()
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| SystemTime::now() >= at)
    }

    fn matches(&self, url: &Url) -> bool {
        if self.is_expired() {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&host, &self.domain)
        };
        domain_ok && path_matches(url.path(), &self.path)
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')))
}

/// One session's cookies, with Xiino limit enforcement.
#[derive(Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
    next_seq: u64,
}

impl CookieJar {
    pub const MAX_TOTAL: usize = 40;
    pub const MAX_PER_SITE: usize = 20;
    pub const MAX_COOKIE_BYTES: usize = 4096;

    /// Store one `Set-Cookie` header; oversized cookies are refused and
    /// overflow evicts the least-recently-set cookie in scope.
    pub fn store(&mut self, header: &str, request_url: &Url) {
        let Some(mut cookie) = Cookie::parse(header, request_url) else {
            return;
        };
        if cookie.size() > Self::MAX_COOKIE_BYTES {
            tracing::warn!(name = %cookie.name, "Cookie exceeds size limit, dropped");
            return;
        }

        cookie.set_seq = self.next_seq;
        self.next_seq += 1;

        self.cookies.retain(|c| {
            !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        });

        // An expired replacement is a deletion.
        if cookie.is_expired() {
            return;
        }

        let domain = cookie.domain.clone();
        self.cookies.push(cookie);
        self.evict_over_limit(&domain);
    }

    fn evict_over_limit(&mut self, domain: &str) {
        while self
            .cookies
            .iter()
            .filter(|c| c.domain == domain)
            .count()
            > Self::MAX_PER_SITE
        {
            if let Some(pos) = self
                .cookies
                .iter()
                .enumerate()
                .filter(|(_, c)| c.domain == domain)
                .min_by_key(|(_, c)| c.set_seq)
                .map(|(i, _)| i)
            {
                self.cookies.remove(pos);
            }
        }
        while self.cookies.len() > Self::MAX_TOTAL {
            if let Some(pos) = self
                .cookies
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.set_seq)
                .map(|(i, _)| i)
            {
                self.cookies.remove(pos);
            }
        }
    }

    /// `Cookie` header value for an outbound upstream request.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let selected: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if selected.is_empty() {
            None
        } else {
            Some(selected.join("; "))
        }
    }

    /// `Set-Cookie` header values for the downstream client. The
    /// downstream wire is plain http, so secure cookies are withheld.
    pub fn downstream_set_cookies(&self, url: &Url) -> Vec<String> {
        self.cookies
            .iter()
            .filter(|c| !c.secure && !c.is_expired())
            .filter(|c| {
                url.host_str()
                    .map(|h| domain_matches(&h.to_ascii_lowercase(), &c.domain))
                    .unwrap_or(false)
            })
            .map(|c| format!("{}={}", c.name, c.value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn count_for_domain(&self, domain: &str) -> usize {
        self.cookies.iter().filter(|c| c.domain == domain).count()
    }
}

/// Process-wide session registry. Each jar is only touched by its owning
/// request task; the map itself is sharded.
#[derive(Default)]
pub struct CookieBridge {
    sessions: DashMap<SessionKey, CookieJar>,
}

impl CookieBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record upstream `Set-Cookie` headers against a session.
    pub fn store_response_cookies(&self, session: SessionKey, headers: &[String], url: &Url) {
        if headers.is_empty() {
            return;
        }
        let mut jar = self.sessions.entry(session).or_default();
        for header in headers {
            jar.store(header, url);
        }
    }

    /// Import the `Cookie` header a Palm client sent with its request.
    pub fn import_client_cookies(&self, session: SessionKey, header: &str, url: &Url) {
        let mut jar = self.sessions.entry(session).or_default();
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                jar.store(&format!("{}={}", name.trim(), value.trim()), url);
            }
        }
    }

    /// `Cookie` header for an outbound request, if the jar has matches.
    pub fn cookie_header(&self, session: SessionKey, url: &Url) -> Option<String> {
        self.sessions.get(&session)?.header_for(url)
    }

    /// `Set-Cookie` headers to return downstream for this URL.
    pub fn downstream_set_cookies(&self, session: SessionKey, url: &Url) -> Vec<String> {
        self.sessions
            .get(&session)
            .map(|jar| jar.downstream_set_cookies(url))
            .unwrap_or_default()
    }
}
