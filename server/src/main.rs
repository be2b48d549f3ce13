mod config;
mod connection;
mod errors;
mod framing;
mod validator;

use clap::Parser;
use config::ServerConfig;
use joblib::{Executor, LocalExecutor};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run untrusted code on behalf of WebSocket clients
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    /// TOML configuration file; the built-in defaults are used when omitted
    #[clap(short = 'c', long = "config", env = "ATO_CONFIG")]
    config: Option<PathBuf>,
    /// Address to listen on, overriding the configuration file
    #[clap(short = 'l', long = "listen", env = "ATO_LISTEN")]
    listen: Option<SocketAddr>,
    /// Print the configured languages and exit
    #[clap(long = "list-languages")]
    list_languages: bool,
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    if args.list_languages {
        for (id, language) in &config.languages {
            println!("{}: {}", id, language);
        }
        return Ok(());
    }

    let listener = TcpListener::bind(config.listen).await?;
    info!(
        "listening on {} with {} languages",
        listener.local_addr()?,
        config.languages.len()
    );

    let executor: Arc<dyn Executor> = Arc::new(LocalExecutor);
    tokio::select! {
        _ = serve(listener, Arc::new(config), executor) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}

/// Accept connections forever. Each connection gets its own task.
async fn serve(listener: TcpListener, config: Arc<ServerConfig>, executor: Arc<dyn Executor>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                // usually a connection reset before accept or fd exhaustion
                warn!("failed to accept connection: {}", err);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            warn!(%peer, "failed to set TCP_NODELAY: {}", err);
        }
        tokio::spawn(connection::handle_connection(
            stream,
            peer,
            Arc::clone(&config),
            Arc::clone(&executor),
        ));
    }
}
