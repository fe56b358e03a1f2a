//! Connection Lifecycle Controller
//!
//! `TcpServer` memiliki satu thread event loop, satu message queue, dan
//! callback dari pemilik. State hanya dua: Stopped dan Running.
//!
//! Alur per pesan: ack "OK\n" ke client -> callback -> push ke queue.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::{Token, Waker};
use tracing::{error, info, trace, warn};

use super::listener::bind_and_listen;
use super::multiplexer::{Multiplexer, Readiness, Receive};
use crate::config::ServerConfig;
use crate::core::{MessageQueue, ServerStats, StatsSnapshot};
use crate::error::{Result, ServerError};

/// Reads per connection per loop turn; keeps one busy peer from starving the rest
const READ_BUDGET: usize = 16;

/// Message handler invoked on the event loop thread for every message
pub type Callback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Handles owned by the owner while the loop runs
struct Running {
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
    local_addr: SocketAddr,
    handle: JoinHandle<Result<()>>,
}

/// Embeddable single-port TCP server
///
/// ```no_run
/// use courier::TcpServer;
///
/// let mut server = TcpServer::new(5555, |msg| println!("got {}", msg));
/// server.start()?;
/// // ...
/// while let Some(msg) = server.pop_data() {
///     println!("queued: {}", msg);
/// }
/// server.stop()?;
/// # Ok::<(), courier::ServerError>(())
/// ```
pub struct TcpServer {
    config: ServerConfig,
    callback: Callback,
    queue: Arc<MessageQueue>,
    stats: Arc<ServerStats>,
    running: Option<Running>,
}

impl TcpServer {
    /// Server dengan konfigurasi default pada `port`
    pub fn new<F>(port: u16, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::with_config(ServerConfig::new(port), callback)
    }

    pub fn with_config<F>(config: ServerConfig, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::from_parts(config, Arc::new(callback))
    }

    fn from_parts(config: ServerConfig, callback: Callback) -> Self {
        Self {
            config,
            callback,
            queue: Arc::new(MessageQueue::new()),
            stats: Arc::new(ServerStats::new()),
            running: None,
        }
    }

    /// Bind, listen, then spawn the event loop.
    ///
    /// Error setup (config, bind, listen) dikembalikan di sini sebelum thread
    /// apa pun dibuat.
    pub fn start(&mut self) -> Result<()> {
        if let Some(running) = &self.running {
            if !running.handle.is_finished() {
                return Err(ServerError::AlreadyRunning {
                    port: running.local_addr.port(),
                });
            }
        }

        // Loop yang sudah mati (poll error / callback panic) di-reap dulu
        if let Err(e) = self.stop() {
            warn!(error = %e, "previous event loop ended with error");
        }

        self.config.validate()?;

        let listener = bind_and_listen(self.config.port, self.config.backlog, self.config.host)?;
        let mux = Multiplexer::new(listener, &self.config, Arc::clone(&self.stats))?;
        let local_addr = mux.local_addr().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "listener has no local address")
        })?;
        let waker = mux.waker();
        let shutdown = Arc::new(AtomicBool::new(false));

        let event_loop = EventLoop {
            mux,
            shutdown: Arc::clone(&shutdown),
            queue: Arc::clone(&self.queue),
            callback: Arc::clone(&self.callback),
            poll_timeout: self.config.poll_timeout,
        };

        let handle = thread::Builder::new()
            .name(format!("courier-{}", local_addr.port()))
            .spawn(move || event_loop.run())?;

        info!(port = local_addr.port(), addr = %local_addr, "listening");

        self.running = Some(Running {
            shutdown,
            waker,
            local_addr,
            handle,
        });

        Ok(())
    }

    /// Request loop exit and wait for it.
    ///
    /// No-op saat server sudah berhenti. Mengembalikan error fatal dari loop
    /// (misalnya poll gagal) jika loop berhenti karena error.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.shutdown.store(true, Ordering::Release);

        // Tanpa wake, loop tetap keluar paling lambat satu poll_timeout
        if let Err(e) = running.waker.wake() {
            warn!(error = %e, "failed to wake event loop");
        }

        let result = match running.handle.join() {
            Ok(result) => result,
            Err(_) => Err(ServerError::LoopPanicked),
        };

        info!(port = running.local_addr.port(), "server stopped");
        result
    }

    /// Remove the oldest queued message. Never blocks.
    pub fn pop_data(&self) -> Option<String> {
        let message = self.queue.pop();
        match &message {
            Some(msg) => trace!(message = %msg, "pop"),
            None => trace!("pop on empty queue"),
        }
        message
    }

    /// Jumlah pesan yang belum di-pop
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// `false` once the loop thread has exited, even before `stop()` collects it
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Configured port (may be 0)
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Actual bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Snapshot of the instance counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Clone the callback capability (for a new server with the same handler)
    pub fn callback(&self) -> Callback {
        Arc::clone(&self.callback)
    }
}

/// Duplicates configuration and callback only.
///
/// Hasil clone selalu Stopped, queue kosong, counter nol, dan punya thread
/// sendiri setelah `start()`.
impl Clone for TcpServer {
    fn clone(&self) -> Self {
        Self::from_parts(self.config.clone(), Arc::clone(&self.callback))
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "event loop ended with error");
        }
    }
}

impl fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpServer")
            .field("config", &self.config)
            .field("local_addr", &self.local_addr())
            .field("pending", &self.queue.len())
            .finish_non_exhaustive()
    }
}

/// State yang dipindahkan ke thread event loop
struct EventLoop {
    mux: Multiplexer,
    shutdown: Arc<AtomicBool>,
    queue: Arc<MessageQueue>,
    callback: Callback,
    poll_timeout: Duration,
}

impl EventLoop {
    fn run(mut self) -> Result<()> {
        // Koneksi yang masih readable setelah budget habis, dilayani di iterasi berikutnya
        let mut carried: Vec<Token> = Vec::new();

        let result = loop {
            if self.shutdown.load(Ordering::Acquire) {
                break Ok(());
            }

            let timeout = if carried.is_empty() {
                self.poll_timeout
            } else {
                Duration::ZERO
            };

            let ready = match self.mux.poll_readiness(timeout) {
                Ok(ready) => ready,
                Err(e) => {
                    error!(error = %e, "readiness poll failed, stopping event loop");
                    break Err(ServerError::Poll(e));
                }
            };

            let mut work = std::mem::take(&mut carried);
            for readiness in ready {
                match readiness {
                    Readiness::Listener => {
                        self.mux.accept_ready();
                    }
                    // Flag dicek di awal iterasi berikutnya
                    Readiness::Waker => {}
                    Readiness::Client(token) => {
                        if !work.contains(&token) {
                            work.push(token);
                        }
                    }
                }
            }

            for token in work {
                if self.service(token) {
                    carried.push(token);
                }
            }
        };

        let closed = self.mux.close_all();
        info!(closed, "event loop exited, all descriptors closed");

        result
    }

    /// Read up to [`READ_BUDGET`] messages from one connection.
    ///
    /// Returns `true` when the budget ran out before the socket drained.
    fn service(&mut self, token: Token) -> bool {
        for _ in 0..READ_BUDGET {
            if self.shutdown.load(Ordering::Acquire) {
                return false;
            }

            match self.mux.receive(token) {
                Receive::Received(message) => {
                    self.mux.send_ack(token);
                    self.handle(message);
                }
                Receive::Closed | Receive::NotReady => return false,
            }
        }

        true
    }

    /// Callback dulu, lalu queue
    fn handle(&self, message: String) {
        (self.callback)(&message);
        self.queue.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr, TcpStream};
    use std::sync::Mutex;
    use std::time::Instant;

    use crate::network::ACK;

    const TICK: Duration = Duration::from_millis(50);

    fn bound_loop(
        config: &ServerConfig,
        queue: Arc<MessageQueue>,
        callback: Callback,
    ) -> (EventLoop, SocketAddr) {
        let listener = bind_and_listen(0, 5, Some(IpAddr::V4(Ipv4Addr::LOCALHOST))).unwrap();
        let addr = listener.local_addr().unwrap();
        let mux = Multiplexer::new(listener, config, Arc::new(ServerStats::new())).unwrap();
        let event_loop = EventLoop {
            mux,
            shutdown: Arc::new(AtomicBool::new(false)),
            queue,
            callback,
            poll_timeout: TICK,
        };
        (event_loop, addr)
    }

    /// Poll sampai ada entry ready yang cocok
    fn wait_ready<F>(event_loop: &mut EventLoop, pred: F) -> Readiness
    where
        F: Fn(&Readiness) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let ready = event_loop.mux.poll_readiness(TICK).unwrap();
            if let Some(r) = ready.into_iter().find(|r| pred(r)) {
                return r;
            }
        }
        panic!("readiness not observed before deadline");
    }

    /// Accepted client whose `payload` is already readable on the server side
    fn client_with_payload(
        event_loop: &mut EventLoop,
        addr: SocketAddr,
        payload: &[u8],
    ) -> (TcpStream, Token) {
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        wait_ready(event_loop, |r| *r == Readiness::Listener);
        event_loop.mux.accept_ready();

        client.write_all(payload).unwrap();
        let token = match wait_ready(event_loop, |r| matches!(r, Readiness::Client(_))) {
            Readiness::Client(token) => token,
            _ => unreachable!(),
        };
        // Loopback: beri waktu seluruh payload sampai
        thread::sleep(TICK);
        (client, token)
    }

    #[test]
    fn test_service_stops_at_read_budget() {
        let config = ServerConfig::default().recv_capacity(4);
        let queue = Arc::new(MessageQueue::new());
        let (mut event_loop, addr) =
            bound_loop(&config, Arc::clone(&queue), Arc::new(|_: &str| {}));

        let chunks = READ_BUDGET + 9;
        let (mut client, token) =
            client_with_payload(&mut event_loop, addr, &b"abcd".repeat(chunks));

        assert!(event_loop.service(token), "budget should run out first");
        assert_eq!(queue.len(), READ_BUDGET);

        // Giliran berikutnya menghabiskan sisanya
        assert!(!event_loop.service(token));
        assert_eq!(queue.len(), chunks);

        let mut acks = vec![0u8; chunks * ACK.len()];
        client.read_exact(&mut acks).unwrap();
        assert_eq!(acks, ACK.repeat(chunks));
    }

    #[test]
    fn test_service_yields_on_shutdown() {
        let config = ServerConfig::default().recv_capacity(4);
        let queue = Arc::new(MessageQueue::new());
        let (mut event_loop, addr) =
            bound_loop(&config, Arc::clone(&queue), Arc::new(|_: &str| {}));
        let (_client, token) = client_with_payload(&mut event_loop, addr, b"abcdabcd");

        event_loop.shutdown.store(true, Ordering::Release);
        assert!(!event_loop.service(token));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_callback_runs_before_queue_push() {
        let queue = Arc::new(MessageQueue::new());
        let observed = Arc::new(Mutex::new(Vec::new()));

        let callback: Callback = {
            let queue = Arc::clone(&queue);
            let observed = Arc::clone(&observed);
            Arc::new(move |msg: &str| {
                observed.lock().unwrap().push((msg.to_string(), queue.len()));
            })
        };
        let (mut event_loop, addr) =
            bound_loop(&ServerConfig::default(), Arc::clone(&queue), callback);
        let (_client, token) = client_with_payload(&mut event_loop, addr, b"first\n");

        assert!(!event_loop.service(token));
        event_loop.handle("second".to_string());

        // Callback melihat queue sebelum pesannya sendiri masuk
        assert_eq!(
            *observed.lock().unwrap(),
            vec![("first".to_string(), 0), ("second".to_string(), 1)]
        );
        assert_eq!(queue.pop().as_deref(), Some("first"));
        assert_eq!(queue.pop().as_deref(), Some("second"));
    }
}
