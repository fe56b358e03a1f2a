//! Client connection dengan buffer terima tetap
//!
//! Satu read = satu pesan. Tidak ada framing: data yang terbaca dalam satu
//! panggilan `read()` (maksimal `capacity` bytes) langsung di-decode.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use tracing::debug;

/// Acknowledgment sent for every message, verbatim
pub const ACK: &[u8] = b"OK\n";

/// Accepted client connection
///
/// Buffer di-alokasi sekali saat accept, tidak ada alokasi per read
/// kecuali `String` hasil decode.
pub(crate) struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    read_buffer: Box<[u8]>,
    messages_received: u64,
}

impl Connection {
    /// Wrap an accepted (already non-blocking) stream
    pub fn new(stream: TcpStream, peer: SocketAddr, capacity: usize, nodelay: bool) -> Self {
        if nodelay {
            // Best effort: beberapa platform menolak opsi ini untuk socket tertentu
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "failed to set TCP_NODELAY");
            }
        }

        Self {
            stream,
            peer,
            read_buffer: vec![0u8; capacity].into_boxed_slice(),
            messages_received: 0,
        }
    }

    /// One `read()` into the internal buffer.
    ///
    /// `Ok(0)` berarti peer menutup koneksi. `WouldBlock` diteruskan apa adanya.
    #[inline]
    pub fn try_read(&mut self) -> io::Result<usize> {
        let n = self.stream.read(&mut self.read_buffer)?;
        if n > 0 {
            self.messages_received += 1;
        }
        Ok(n)
    }

    /// Decode the first `len` bytes of the last read
    #[inline]
    pub fn message(&self, len: usize) -> String {
        decode_message(&self.read_buffer[..len])
    }

    /// Send [`ACK`]. A short write counts as failure; no retry.
    pub fn send_ack(&mut self) -> io::Result<()> {
        match self.stream.write(ACK) {
            Ok(n) if n == ACK.len() => Ok(()),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short ack write ({} of {} bytes)", n, ACK.len()),
            )),
            Err(e) => Err(e),
        }
    }

    /// Underlying stream untuk register/deregister
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }
}

/// Decode one read: lossy UTF-8, with a single trailing `\n` stripped
pub(crate) fn decode_message(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
