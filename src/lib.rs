//! Transcoding HTTP proxy for Palm OS Xiino/Palmscape browsers.
//!
//! The proxy sits between a legacy handheld and the modern Web: it
//! fetches resources over HTTPS on the device's behalf, rewrites HTML to
//! the restricted tag set the client can parse, and re-encodes images
//! into the palette-indexed EBDImage format it renders inline.
//!
//! # Architecture Overview
//!
//! ```text
//!   Palm client ──▶ http (server + orchestrator)
//!                       │
//!                       ├─▶ security (rate limit, size caps)
//!                       ├─▶ pages (.xiino pseudo-domains, errors)
//!                       ├─▶ fetch (HTTPS upgrade, redirects, caps)
//!                       │      └─▶ cookies (session jars)
//!                       └─▶ html (ruleset traversal, serialization)
//!                              └─▶ image (decode, resize, dither)
//!                                     ├─▶ palette (LAB lookup cubes)
//!                                     └─▶ ebd (bitstream encoding)
//!
//!   Cross-cutting: config, budget, workers, observability, lifecycle
//! ```

// Core subsystems
pub mod config;
pub mod fetch;
pub mod html;
pub mod http;

// Transcoding pipeline
pub mod ebd;
pub mod image;
pub mod palette;

// Request-scoped state
pub mod budget;
pub mod cookies;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod pages;
pub mod security;
pub mod workers;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::HttpServer;
