//! Courier - Embeddable Single-Port TCP Ack Server
//!
//! Arsitektur:
//! - Readiness-based: mio Poll, satu thread event loop per server
//! - Non-blocking: accept/recv/send tidak pernah memblokir loop
//! - Lock-Free queue: pesan masuk di-antrikan untuk `pop_data()`
//! - Fail-fast setup: error bind/listen dikembalikan dari `start()`
//!
//! Setiap pesan yang diterima:
//! 1. Dibalas dengan `"OK\n"`
//! 2. Diteruskan ke callback
//! 3. Ditambahkan ke queue internal

pub mod config;
pub mod core;
pub mod error;
pub mod network;

pub use crate::config::ServerConfig;
pub use crate::core::{MessageQueue, ServerStats, StatsSnapshot};
pub use crate::error::{Result, ServerError};
pub use crate::network::{Callback, TcpServer, ACK};
