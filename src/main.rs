use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use fuzzyd::config::FuzzyConfig;
use fuzzyd::server::{FuzzyServer, ShutdownKind};

#[derive(Parser)]
#[command(name = "fuzzyd")]
#[command(version, about = "Fuzzy hash storage daemon", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:11335")]
    listen: SocketAddr,

    /// Path to the hash file; omit to run in-memory only
    #[arg(long)]
    hashfile: Option<PathBuf>,

    /// Record TTL in seconds
    #[arg(long, default_value_t = 172_800)]
    expire: u64,

    /// Per-connection read timeout in seconds
    #[arg(long, default_value_t = 5)]
    io_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FUZZYD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = FuzzyConfig::default()
        .listen(cli.listen)
        .expire(Duration::from_secs(cli.expire))
        .io_timeout(Duration::from_secs(cli.io_timeout));
    if let Some(path) = cli.hashfile {
        config = config.hashfile(path);
    }

    let server = FuzzyServer::bind(config).await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
    spawn_signal_listener(shutdown_tx)?;

    server.serve(shutdown_rx).await?;
    Ok(())
}

/// Translate Unix signals into shutdown requests: SIGTERM flushes and
/// exits, SIGUSR2 is the supervisor's reload (stop accepting, drain),
/// SIGINT is ignored since the supervisor follows it with SIGTERM anyway.
fn spawn_signal_listener(shutdown: mpsc::Sender<ShutdownKind>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;
    let mut int = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = term.recv() => {
                    let _ = shutdown.send(ShutdownKind::Terminate).await;
                }
                _ = usr2.recv() => {
                    let _ = shutdown.send(ShutdownKind::Reload).await;
                }
                _ = int.recv() => {
                    tracing::debug!("ignoring SIGINT, expecting SIGTERM from the supervisor");
                }
            }
        }
    });

    Ok(())
}
