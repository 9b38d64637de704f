//! Shared helpers for the integration suite: programmable loopback
//! upstream backends and a proxy instance on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use xiino_proxy::{HttpServer, ProxyConfig};

/// Serve a programmable upstream backend on an ephemeral loopback port.
pub async fn start_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Proxy configuration hardened for test stability.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    // The probe would stall every loopback fetch for up to 2 s.
    config.security.attempt_https_upgrade = false;
    config.http.timeout_secs = 5;
    config
}

/// Spawn the proxy and return its address.
pub async fn start_proxy(config: ProxyConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    tokio::spawn(async move {
        server.run(listener, std::future::pending()).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Non-pooled client so each test request is independent.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// The proxy-facing URL for a target, in the client's path form.
pub fn proxy_url(proxy: SocketAddr, target: &str) -> String {
    format!("http://{proxy}/{target}")
}

/// Response body with the 16-byte Xiino preamble stripped.
pub async fn body_text(response: reqwest::Response) -> String {
    let bytes = response.bytes().await.unwrap();
    assert!(bytes.len() >= 16, "body shorter than the Xiino preamble");
    assert_eq!(&bytes[..12], &[0u8; 12]);
    assert_eq!(&bytes[12..16], b"\r\n\r\n");
    String::from_utf8_lossy(&bytes[16..]).into_owned()
}

/// A solid-color JPEG of the given dimensions.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([180, 60, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// A tiny PNG as a base64 `data:` URL.
pub fn png_data_url(width: u32, height: u32) -> String {
    use base64::Engine;
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([20, 120, 220]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(out.into_inner())
    )
}
