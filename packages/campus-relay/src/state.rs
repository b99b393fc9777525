//! Server state management.
//!
//! Holds the connection registry, the injected message store, and the
//! configuration. Cloned into every socket task and HTTP handler.

use std::sync::Arc;

use campus_core::{Error, MessageStore, Result};

use crate::registry::ConnectionRegistry;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default SQLite path. `:memory:` selects an in-memory database.
pub const DEFAULT_DATABASE_PATH: &str = "campus.db";

/// Default maximum message length in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

/// Default cap on messages returned by one history request.
pub const DEFAULT_HISTORY_PAGE_LIMIT: usize = 500;

/// Default interval between registry prune passes.
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub database_path: String,
    /// Longest accepted message body, counted in characters.
    pub max_message_length: usize,
    /// Upper bound on `limit` for history endpoints; also the default.
    pub history_page_limit: usize,
    pub prune_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            history_page_limit: DEFAULT_HISTORY_PAGE_LIMIT,
            prune_interval_secs: DEFAULT_PRUNE_INTERVAL_SECS,
        }
    }
}

impl RelayConfig {
    /// Clamp a requested history page size to the configured maximum.
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.history_page_limit)
            .min(self.history_page_limit)
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// User id → live socket.
    pub registry: ConnectionRegistry,

    /// Persistent message store.
    pub store: Arc<dyn MessageStore>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new relay state around the given store.
    pub fn new(config: RelayConfig, store: Arc<dyn MessageStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store,
            config,
        }
    }

    /// Run a store operation on the blocking pool.
    ///
    /// SQLite calls are synchronous; running them here keeps the socket
    /// tasks responsive. No registry entry is borrowed across the call.
    pub async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn MessageStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("Store task failed: {}", e)))?
    }
}
