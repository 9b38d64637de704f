//! Response framing for the Xiino client.
//!
//! # Responsibilities
//! - Prefix every body with the preamble the client expects: twelve zero
//!   bytes followed by CR LF CR LF
//! - Encode bodies as ISO-8859-1, replacing unmappable characters
//! - Attach Set-Cookie headers from the session jar

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

/// Wire preamble preceding every page body.
pub const XIINO_PREAMBLE: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0D, 0x0A, 0x0D,
    0x0A,
];

/// Encode a string as ISO-8859-1, substituting `?` for anything outside
/// the Latin-1 range.
pub fn latin1(content: &str) -> Vec<u8> {
    content
        .chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

/// Preamble plus Latin-1 body bytes.
pub fn xiino_body(content: &str) -> Vec<u8> {
    let encoded = latin1(content);
    let mut body = Vec::with_capacity(XIINO_PREAMBLE.len() + encoded.len());
    body.extend_from_slice(&XIINO_PREAMBLE);
    body.extend_from_slice(&encoded);
    body
}

/// Build a complete downstream response for a rendered page.
pub fn page_response(status: StatusCode, content: &str, set_cookies: &[String]) -> Response {
    let mut response = Response::builder()
        .status(status)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=ISO-8859-1"),
        )
        .body(Body::from(xiino_body(content)))
        .expect("static response parts are valid");

    for cookie in set_cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response
                .headers_mut()
                .append(header::SET_COOKIE, value);
        }
    }
    response
}
