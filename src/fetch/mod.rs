//! Upstream fetching.

pub mod client;

pub use client::{FetchedResponse, Fetcher};
