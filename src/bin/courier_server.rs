//! Courier Server Binary - Demo
//!
//! Menjalankan dua server sekaligus, masing-masing dengan callback sendiri,
//! lalu secara berkala mengambil pesan dari queue.
//!
//! Usage:
//!   cargo run --release --bin courier_server -- [OPTIONS]
//!
//! Coba dengan: `printf 'hello\n' | nc 127.0.0.1 5555`

use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use courier::{ServerConfig, TcpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "courier_server", about = "Single-port TCP ack server demo")]
struct Args {
    /// Port for the first server
    #[arg(short, long, default_value_t = 5555)]
    port: u16,

    /// Port for the second server
    #[arg(long, default_value_t = 3333)]
    port2: u16,

    /// Listen backlog
    #[arg(long, default_value_t = courier::config::DEFAULT_BACKLOG)]
    backlog: i32,

    /// Readiness poll timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    /// Maximum bytes per read (one read = one message)
    #[arg(long, default_value_t = courier::config::DEFAULT_RECV_CAPACITY)]
    capacity: usize,

    /// Seconds between queue drains
    #[arg(long, default_value_t = 5)]
    pop_interval_secs: u64,

    /// Stop the second server after this many seconds (0 = never)
    #[arg(long, default_value_t = 60)]
    stop_second_after_secs: u64,

    /// Total run time in seconds
    #[arg(long, default_value_t = 90)]
    duration_secs: u64,
}

impl Args {
    fn config(&self, port: u16) -> ServerConfig {
        ServerConfig::new(port)
            .backlog(self.backlog)
            .poll_timeout(Duration::from_millis(self.timeout_ms))
            .recv_capacity(self.capacity)
    }
}

fn drain(name: &str, server: &TcpServer) {
    let mut popped = 0;
    while let Some(message) = server.pop_data() {
        tracing::info!(server = name, %message, "pop");
        popped += 1;
    }
    if popped == 0 {
        tracing::info!(server = name, "no data in queue");
    }
}

fn run(args: Args) -> courier::Result<()> {
    let mut first = TcpServer::with_config(args.config(args.port), |msg| {
        tracing::info!(%msg, "callback (first)");
    });
    let mut second = TcpServer::with_config(args.config(args.port2), |msg| {
        tracing::info!(%msg, "callback (second)");
    });

    first.start()?;
    second.start()?;

    let started = Instant::now();
    let total = Duration::from_secs(args.duration_secs);
    let stop_second = Duration::from_secs(args.stop_second_after_secs);
    let interval = Duration::from_secs(args.pop_interval_secs.max(1));

    while started.elapsed() < total {
        thread::sleep(interval);

        drain("first", &first);
        drain("second", &second);

        if args.stop_second_after_secs > 0 && second.is_running() && started.elapsed() >= stop_second {
            second.stop()?;
            tracing::info!(port = args.port2, "second server stopped");
        }

        let stats = first.stats();
        tracing::info!(
            connections = stats.connections_active,
            messages = stats.messages_received,
            acks = stats.acks_sent,
            "first server stats"
        );
    }

    first.stop()?;
    second.stop()?;
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info,courier_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!(?args, "courier server starting");

    if let Err(e) = run(args) {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
