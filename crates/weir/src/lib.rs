//! Single-process networking runtime: a poll-based reactor with timer
//! management, TLS-capable TCP links, a reliable transport over UDP,
//! an HTTP/1.x serving layer, and a TCP reverse proxy.
//!
//! The reactor owns every socket; callers post reads and writes as
//! pooled buffers and observe completions through
//! [`Reactor::poll_with`]. Protocol layers (TLS, HTTP, reliable UDP)
//! are transport-agnostic crates glued to handles here.

pub mod addr;
pub mod config;
mod error;
pub mod proxy;
mod reactor;
pub mod rudp_link;
pub mod tls_link;

pub use error::Error;
pub use reactor::{HandleId, Reactor, ReactorEvent, TimerSpec};
