//! Pending Message Queue
//!
//! Antrian FIFO tak terbatas antara event loop (producer) dan pemilik
//! server (consumer). Dibangun di atas `SegQueue` sehingga push dan pop
//! lock-free dan aman dipanggil dari banyak thread sekaligus.

use crossbeam_queue::SegQueue;

/// FIFO queue of decoded messages
///
/// Every pushed message is popped exactly once, in push order.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: SegQueue<String>,
}

impl MessageQueue {
    /// Membuat queue kosong
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Append message (producer side)
    #[inline]
    pub fn push(&self, message: String) {
        self.inner.push(message);
    }

    /// Remove the oldest message. Never blocks.
    ///
    /// Returns `None` jika queue kosong.
    #[inline]
    pub fn pop(&self) -> Option<String> {
        self.inner.pop()
    }

    /// Jumlah pesan yang menunggu
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Cek apakah queue kosong
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
