//! Readiness Multiplexer
//!
//! Menggunakan mio (epoll/kqueue) sebagai pengganti descriptor set ukuran
//! tetap. Watch set = listener + tabel `Token -> Connection` + satu waker
//! untuk membangunkan poll saat server di-stop.
//!
//! Readiness di mio bersifat edge-triggered: setiap event harus dikuras
//! (accept/read sampai `WouldBlock`) supaya tidak ada data yang tertinggal.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use super::connection::Connection;
use crate::config::ServerConfig;
use crate::core::ServerStats;

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;
const EVENTS_CAPACITY: usize = 1024;

/// One entry of the ready subset returned by [`Multiplexer::poll_readiness`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Listener has pending connections
    Listener,
    /// Woken from another thread
    Waker,
    /// Client connection is readable (data or close)
    Client(Token),
}

/// Result of one receive attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Receive {
    /// Unknown token or nothing to read right now
    NotReady,
    /// Peer closed or read failed; connection removed from the watch set
    Closed,
    /// One decoded message
    Received(String),
}

/// Owner of the watch set
pub(crate) struct Multiplexer {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    connections: HashMap<Token, Connection>,
    waker: Arc<Waker>,
    next_token: usize,
    max_token: usize,
    recv_capacity: usize,
    nodelay: bool,
    stats: Arc<ServerStats>,
}

impl Multiplexer {
    /// Build the watch set around a bound, listening, non-blocking listener.
    pub fn new(
        listener: std::net::TcpListener,
        config: &ServerConfig,
        stats: Arc<ServerStats>,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let mut mux = Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener: None,
            connections: HashMap::new(),
            waker,
            next_token: FIRST_CLIENT_TOKEN,
            max_token: LISTENER_TOKEN.0,
            recv_capacity: config.recv_capacity,
            nodelay: config.nodelay,
            stats,
        };
        mux.init_watch_set(TcpListener::from_std(listener))?;

        Ok(mux)
    }

    /// Reset the table and register the listener as the only member
    fn init_watch_set(&mut self, mut listener: TcpListener) -> io::Result<()> {
        self.close_all();
        self.poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        self.listener = Some(listener);
        self.max_token = LISTENER_TOKEN.0;
        Ok(())
    }

    /// Handle untuk membangunkan `poll_readiness` dari thread lain
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Block until something in the watch set is ready or `timeout` elapses.
    ///
    /// `Interrupted` dianggap "tidak ada yang siap". Error lain fatal untuk loop.
    pub fn poll_readiness(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let ready = self
            .events
            .iter()
            .map(|event| match event.token() {
                LISTENER_TOKEN => Readiness::Listener,
                WAKER_TOKEN => Readiness::Waker,
                token => Readiness::Client(token),
            })
            .collect();

        Ok(ready)
    }

    /// Accept every pending connection and add it to the watch set.
    ///
    /// Returns the highest token handed out so far. Accept errors are logged
    /// and end the drain for this event.
    pub fn accept_ready(&mut self) -> usize {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => break,
            };

            match accepted {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);

                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(%peer, error = %e, "failed to register connection, dropping");
                        self.stats.record_io_error();
                        continue;
                    }

                    self.next_token += 1;
                    self.max_token = self.max_token.max(token.0);
                    self.connections.insert(
                        token,
                        Connection::new(stream, peer, self.recv_capacity, self.nodelay),
                    );
                    self.stats.record_accept();

                    info!(
                        peer = %peer.ip(),
                        family = family(&peer),
                        token = token.0,
                        "new connection"
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    self.stats.record_io_error();
                    break;
                }
            }
        }

        self.max_token
    }

    /// One read of at most `recv_capacity` bytes from a client.
    pub fn receive(&mut self, token: Token) -> Receive {
        let conn = match self.connections.get_mut(&token) {
            Some(c) => c,
            None => return Receive::NotReady,
        };

        loop {
            match conn.try_read() {
                Ok(0) => {
                    self.close(token);
                    return Receive::Closed;
                }
                Ok(n) => {
                    self.stats.record_message(n);
                    debug!(token = token.0, bytes = n, "message received");
                    return Receive::Received(conn.message(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Receive::NotReady,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(token = token.0, peer = %conn.peer(), error = %e, "read failed");
                    self.stats.record_io_error();
                    self.close(token);
                    return Receive::Closed;
                }
            }
        }
    }

    /// Best-effort acknowledgment. Failures are logged only.
    pub fn send_ack(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match conn.send_ack() {
            Ok(()) => self.stats.record_ack(true),
            Err(e) => {
                warn!(token = token.0, peer = %conn.peer(), error = %e, "ack send failed");
                self.stats.record_ack(false);
            }
        }
    }

    /// Remove a client from the watch set and close it
    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            self.stats.record_close();
            info!(
                peer = %conn.peer(),
                token = token.0,
                messages = conn.messages_received(),
                "connection closed"
            );
        }
    }

    /// Close every watched descriptor, listener included.
    ///
    /// Returns jumlah koneksi client yang ditutup.
    pub fn close_all(&mut self) -> usize {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        let closed = tokens.len();
        for token in tokens {
            self.close(token);
        }

        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }

        closed
    }

    /// Number of live client connections
    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

fn family(addr: &SocketAddr) -> &'static str {
    match addr {
        SocketAddr::V4(_) => "IPv4",
        SocketAddr::V6(_) => "IPv6",
    }
}
