//! Downstream HTTP surface: server, request parsing, response framing,
//! and the request orchestrator.

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use request::DeviceProfile;
pub use server::{AppState, HttpServer};
