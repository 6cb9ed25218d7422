//! Shared application state: configuration and the ticket store.
//!
//! One `Clone`-cheap struct threaded through every handler via axum's
//! `State` extractor.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tty_agent_core::config::Config;
use tty_agent_core::service::TicketStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ticket_store: Arc<TicketStore>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let ticket_store = Arc::new(TicketStore::new(config.ws.ticket_ttl_ms));
        Self {
            config,
            ticket_store,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flip readiness to true once startup (the ticket-store sweeper, the
    /// bound listener) has completed. `GET /readyz` reads this flag.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Per-connection heartbeat bookkeeping: updated by the reader task on every
/// inbound pong, read by the heartbeat task to decide whether the peer is
/// still alive.
pub struct ConnectionInfo {
    pub last_pong_ms: AtomicI64,
}

impl ConnectionInfo {
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            last_pong_ms: AtomicI64::new(now_ms),
        }
    }
}
