//! Shared helpers for server integration tests

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use courier::{ServerConfig, TcpServer};

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Loopback, ephemeral port, short poll so tests never wait long
pub fn test_config() -> ServerConfig {
    ServerConfig::new(0)
        .host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .poll_timeout(Duration::from_millis(100))
}

/// Callback that records every message it sees
pub fn recording_callback() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |msg: &str| sink.lock().unwrap().push(msg.to_string()))
}

/// Started server on an ephemeral loopback port, plus what its callback saw
pub fn start_recording_server() -> (TcpServer, Arc<Mutex<Vec<String>>>, SocketAddr) {
    init_test_logging();
    let (seen, callback) = recording_callback();
    let mut server = TcpServer::with_config(test_config(), callback);
    server.start().expect("server start");
    let addr = server.local_addr().expect("bound address");
    (server, seen, addr)
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.set_nodelay(true).ok();
    stream
}

/// Send one line and wait for its acknowledgment
pub fn send_and_ack(stream: &mut TcpStream, line: &str) -> io::Result<[u8; 3]> {
    stream.write_all(line.as_bytes())?;
    let mut ack = [0u8; 3];
    stream.read_exact(&mut ack)?;
    Ok(ack)
}

/// Poll `cond` until it holds or the deadline passes
pub fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}
