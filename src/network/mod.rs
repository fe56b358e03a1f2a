//! Network Layer: Readiness-Based TCP Server
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing (epoll/kqueue/IOCP).
//!
//! Fitur:
//! - Satu listener per server, dual-stack wildcard secara default
//! - Watch set dinamis tanpa batas ukuran descriptor set
//! - Satu thread event loop per server, stop kooperatif via waker

mod connection;
mod listener;
mod multiplexer;
mod server;

pub use connection::ACK;
pub use server::{Callback, TcpServer};
