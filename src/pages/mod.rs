//! Built-in `.xiino` pages and error documents.
//!
//! # Responsibilities
//! - Serve the reserved `.xiino` pseudo-domains without any outbound fetch
//! - Render every error class as a page the client can actually display
//!
//! Templates emit Xiino-legal HTML directly; they never pass through the
//! transcoder.

use crate::config::ProxyConfig;
use crate::http::request::DeviceProfile;
use crate::palette::{palette_for, ColorMode};

/// Route a `.xiino` host to its page.
pub fn dispatch(host: &str, device: &DeviceProfile, config: &ProxyConfig) -> String {
    match host.trim_end_matches(".xiino") {
        "about" | "home" => about_page(config),
        "device" => device_page(device),
        "palette" => palette_page(device),
        other => not_found_page(&format!("http://{other}.xiino")),
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<HTML><HEAD><TITLE>{title}</TITLE></HEAD><BODY>{body}\
         <HR><P><A HREF=\"http://about.xiino\">XiinoProxy</A></P></BODY></HTML>"
    )
}

/// `about.xiino`: version and a configuration summary.
pub fn about_page(config: &ProxyConfig) -> String {
    let body = format!(
        "<H1>XiinoProxy</H1>\
         <P>Version {version}</P>\
         <P>A transcoding proxy for Xiino and Palmscape handheld browsers.</P>\
         <H3>Configuration</H3>\
         <P>Max page size: {page_kb} KB<BR>\
         Rate limit: {rate}/min<BR>\
         HTTPS upgrade: {upgrade}<BR>\
         Redirect cap: {redirects}<BR>\
         Image cap: {image_mb} MB, {max_pixels} px<BR>\
         Dither priority: {dither:?}</P>\
         <P>See also <A HREF=\"http://device.xiino\">device.xiino</A> and \
         <A HREF=\"http://palette.xiino\">palette.xiino</A>.</P>",
        version = env!("CARGO_PKG_VERSION"),
        page_kb = config.http.max_page_size_kb,
        rate = config.security.max_requests_per_min,
        upgrade = config.security.attempt_https_upgrade,
        redirects = config.security.max_redirects,
        image_mb = config.image.max_size_mb,
        max_pixels = config.image.max_pixels,
        dither = config.image.dither_priority,
    );
    page("About XiinoProxy", &body)
}

/// `device.xiino`: echo of the parsed device profile.
pub fn device_page(device: &DeviceProfile) -> String {
    let mode = match device.mode {
        ColorMode::Mono1 => "1-bit monochrome",
        ColorMode::Gray2 => "2-bit grayscale",
        ColorMode::Gray4 => "4-bit grayscale",
        ColorMode::Color8 => "8-bit color",
    };
    let body = format!(
        "<H1>Device Info</H1>\
         <P>Screen width: {width} px<BR>\
         Color mode: {mode}<BR>\
         Encoding: {encoding}</P>",
        width = device.screen_width,
        encoding = device.encoding.as_deref().unwrap_or("default"),
    );
    page("Device Info", &body)
}

/// `palette.xiino`: a swatch table of the device's palette.
pub fn palette_page(device: &DeviceProfile) -> String {
    let palette = palette_for(device.mode);
    let shown = palette.len().min(32);

    let mut rows = String::new();
    for row in 0..shown.div_ceil(8) {
        rows.push_str("<TR>");
        for col in 0..8 {
            let index = row * 8 + col;
            if index >= shown {
                break;
            }
            let [r, g, b] = palette.color(index as u8);
            rows.push_str(&format!(
                "<TD BGCOLOR=\"#{r:02X}{g:02X}{b:02X}\">{index}</TD>"
            ));
        }
        rows.push_str("</TR>");
    }

    let body = format!(
        "<H1>Palette Test</H1>\
         <P>First {shown} of {total} entries.</P>\
         <TABLE BORDER=\"1\">{rows}</TABLE>",
        total = palette.len(),
    );
    page("Palette Test", &body)
}

pub fn not_found_page(target: &str) -> String {
    page(
        "Not Found",
        &format!("<H1>Not Found</H1><P>No page at {target}.</P>"),
    )
}

pub fn rate_limited_page() -> String {
    page(
        "Slow Down",
        "<H1>Too Many Requests</H1><P>This device is requesting pages too \
         quickly. Wait a moment and try again.</P>",
    )
}

pub fn request_too_large_page() -> String {
    page(
        "Request Too Large",
        "<H1>Request Too Large</H1><P>The submitted request exceeds the \
         proxy's size limit.</P>",
    )
}

pub fn page_too_large_page(target: &str) -> String {
    page(
        "Page Too Large",
        &format!(
            "<H1>Page Too Large</H1><P>{target} is larger than this proxy \
             will deliver to a handheld.</P>"
        ),
    )
}

pub fn timeout_page(target: &str) -> String {
    page(
        "Timed Out",
        &format!("<H1>Timed Out</H1><P>{target} took too long to answer.</P>"),
    )
}

pub fn upstream_error_page(status: u16, target: &str) -> String {
    page(
        "Upstream Error",
        &format!(
            "<H1>Upstream Error</H1><P>{target} answered with status \
             {status}.</P>"
        ),
    )
}

pub fn bad_request_page() -> String {
    page(
        "Bad Request",
        "<H1>Bad Request</H1><P>The proxy could not understand this \
         request. Expected a target URL.</P>",
    )
}

pub fn internal_error_page() -> String {
    page(
        "Proxy Error",
        "<H1>Proxy Error</H1><P>Something went wrong inside the proxy.</P>",
    )
}

/// Wrapper for a directly requested image, already transcoded.
pub fn image_page(target: &str, image_markup: &str) -> String {
    page(
        "Image",
        &format!("<P>{target}</P><P>{image_markup}</P>"),
    )
}

/// Plaintext fallback when a document cannot be parsed.
pub fn plaintext_page(target: &str, text: &str) -> String {
    page(
        "Plain Text",
        &format!("<P><I>Stripped view of {target}</I></P><PRE>{text}</PRE>"),
    )
}
