//! Core module: Message Queue dan Statistics
//!
//! Prinsip desain:
//! - Lock-Free: Queue berbasis SegQueue, counter berbasis atomic
//! - Exactly-Once: Setiap pesan di-pop tepat satu kali, urutan FIFO
//! - Shared via Arc: Event loop menulis, pemilik server membaca

mod message_queue;
mod stats;

pub use message_queue::MessageQueue;
pub use stats::{ServerStats, StatsSnapshot};
