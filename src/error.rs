//! Error types untuk Courier
//!
//! Hanya error setup (bind/listen/config) dan error fatal event loop yang
//! sampai ke pemilik server. Error I/O per-koneksi cukup di-log lalu dilewati.

use std::io;
use thiserror::Error;

/// Result type untuk operasi server
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error yang bisa dilihat oleh program yang meng-embed server
#[derive(Error, Debug)]
pub enum ServerError {
    /// No address candidate could be bound
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Socket bound but `listen()` failed
    #[error("failed to listen on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Readiness polling failed; the event loop cannot continue
    #[error("readiness poll failed: {0}")]
    Poll(#[source] io::Error),

    /// Other I/O errors during setup (poll creation, thread spawn)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config { message: String },

    /// `start()` called on a running server
    #[error("server on port {port} is already running")]
    AlreadyRunning { port: u16 },

    /// The event loop thread panicked (usually inside the callback)
    #[error("event loop thread panicked")]
    LoopPanicked,
}

impl ServerError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised before the event loop was spawned.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. } | Self::Listen { .. } | Self::Config { .. } | Self::AlreadyRunning { .. }
        )
    }
}
