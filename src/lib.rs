//! Replay Zero - capture HTTP traffic as test scenarios or framed stream records
//!
//! Events observed by the proxy are either buffered and rendered through a
//! template into scenario files, or split into bounded frames and pushed to a
//! size-limited record channel.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod event;
pub mod framing;
pub mod handler;
pub mod network;
pub mod pipeline;
pub mod render;
pub mod sink;
pub mod telemetry;

pub use error::{ReplayError, Result};
pub use event::{Header, HttpEvent};
pub use handler::EventHandler;
