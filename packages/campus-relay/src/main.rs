//! Campus Relay Server
//!
//! Binary entry point: parses configuration, sets up logging, opens the
//! message store and serves the router until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use campus_core::Database;
use campus_relay::state::{
    RelayConfig, RelayState, DEFAULT_DATABASE_PATH, DEFAULT_HISTORY_PAGE_LIMIT,
    DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_PORT, DEFAULT_PRUNE_INTERVAL_SECS,
};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "campus-relay", version, about = "Campus messaging relay server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "CAMPUS_PORT")]
    port: u16,

    /// SQLite database file (":memory:" for a throwaway in-memory store)
    #[arg(long, default_value = DEFAULT_DATABASE_PATH, env = "CAMPUS_DATABASE_PATH")]
    database_path: String,

    /// Longest accepted message, in characters
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_LENGTH, env = "MAX_MESSAGE_LENGTH")]
    max_message_length: usize,

    /// Maximum messages returned by one history request
    #[arg(long, default_value_t = DEFAULT_HISTORY_PAGE_LIMIT, env = "HISTORY_PAGE_LIMIT")]
    history_page_limit: usize,

    /// Interval between sweeps for dead connections, in seconds
    #[arg(long, default_value_t = DEFAULT_PRUNE_INTERVAL_SECS, env = "PRUNE_INTERVAL_SECS")]
    prune_interval_secs: u64,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            port: self.port,
            database_path: self.database_path.clone(),
            max_message_length: self.max_message_length,
            history_page_limit: self.history_page_limit.max(1),
            prune_interval_secs: self.prune_interval_secs.max(1),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campus_relay=info,campus_core=info,tower_http=info".into());

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.relay_config();

    // ── Message Store ─────────────────────────────────────────────────────

    let path = match config.database_path.as_str() {
        ":memory:" => None,
        path => Some(path),
    };
    let db = Database::open(path)?;
    tracing::info!(path = %config.database_path, "Message store opened");

    let state = RelayState::new(config, Arc::new(db));

    // ── Background Tasks ──────────────────────────────────────────────────

    let prune_state = state.clone();
    let prune_interval = state.config.prune_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(prune_interval));
        loop {
            interval.tick().await;
            prune_state.registry.prune_closed();
        }
    });

    // ── Serve ─────────────────────────────────────────────────────────────

    let app = campus_relay::router(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.port);
    tracing::info!("Campus relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(
        online_clients = state.registry.online_count(),
        "Campus relay server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, keep serving
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["campus-relay"]).unwrap();
        let config = args.relay_config();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_path, "campus.db");
        assert_eq!(config.max_message_length, 4000);
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_args_override() {
        let args = Args::try_parse_from([
            "campus-relay",
            "--port",
            "9000",
            "--database-path",
            ":memory:",
            "--history-page-limit",
            "0",
            "--log-format",
            "json",
        ])
        .unwrap();
        let config = args.relay_config();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.history_page_limit, 1);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[tokio::test]
    async fn test_state_creation() {
        let db = Database::open(None).unwrap();
        let state = RelayState::new(RelayConfig::default(), Arc::new(db));
        assert_eq!(state.registry.online_count(), 0);
    }
}
