//! Network layer for Replay Zero
//!
//! A transparent HTTP/1 proxy that forwards traffic upstream and hands each
//! completed exchange to the capture pipeline.

mod client;
mod server;

pub use client::{target_uri, HttpClient};
pub use server::ProxyServer;
