//! Single-use, TTL-bound ticket storage.
//!
//! A single-process store: this gateway has no Redis/multi-replica concern,
//! so records live behind a single `parking_lot::Mutex<HashMap<..>>` instead
//! of a shared cache. They're reclaimed by a periodic background sweeper
//! (see [`TicketStore::spawn_sweeper`]) rather than a sweep inline with every
//! call. An inline sweep-on-every-call would delete a just-used ticket's
//! tombstone before a replay attempt could observe it, which would make it
//! impossible to report "Ticket already used." instead of "Invalid or
//! expired ticket." for that replay case.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::GatewayError;
use crate::metrics;
use crate::model::{ExecTarget, PeerMeta, TicketRecord};

/// Random id length in bytes. 32 bytes = 256 bits, comfortably over the
/// spec's 122-bit entropy floor.
const TICKET_ID_BYTES: usize = 32;

enum TicketState {
    /// A live, unconsumed ticket.
    Active {
        record: TicketRecord,
        expires_at_ms: i64,
    },
    /// A consumed ticket, kept only so a replay attempt observes "used"
    /// rather than "invalid". The kubeconfig/target are dropped immediately
    /// on consumption; `expires_at_ms` is retained so the sweeper reclaims
    /// it at the same time it would have expired anyway.
    Used { expires_at_ms: i64 },
}

impl TicketState {
    fn expires_at_ms(&self) -> i64 {
        match self {
            TicketState::Active { expires_at_ms, .. } | TicketState::Used { expires_at_ms } => {
                *expires_at_ms
            }
        }
    }
}

pub struct TicketStore {
    records: Mutex<HashMap<String, TicketState>>,
    ticket_ttl_ms: u64,
}

impl TicketStore {
    #[must_use]
    pub fn new(ticket_ttl_ms: u64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ticket_ttl_ms,
        }
    }

    /// Issue a fresh, single-use ticket for the given kubeconfig/target pair.
    /// Returns the ticket id and its absolute expiry (ms since epoch).
    pub fn issue(
        &self,
        kubeconfig: String,
        target: ExecTarget,
        issuer: PeerMeta,
    ) -> (String, i64) {
        let ticket = Self::generate_ticket();
        let expires_at_ms = now_ms() + i64::try_from(self.ticket_ttl_ms).unwrap_or(i64::MAX);

        self.records.lock().insert(
            ticket.clone(),
            TicketState::Active {
                record: TicketRecord {
                    kubeconfig,
                    target,
                    issuer,
                },
                expires_at_ms,
            },
        );

        metrics::TICKETS_ISSUED_TOTAL.inc();
        debug!(ticket = %ticket, expires_at_ms, "ticket issued");

        (ticket, expires_at_ms)
    }

    /// Atomically validate and consume a ticket. A given ticket id succeeds
    /// at most once across all callers; the map mutex serializes concurrent
    /// attempts on the same key.
    pub fn consume(&self, ticket: &str, _consumer: PeerMeta) -> Result<(String, ExecTarget), GatewayError> {
        let mut records = self.records.lock();

        let outcome = match records.get_mut(ticket) {
            None => {
                debug!(ticket, "ticket not found");
                Err(GatewayError::TicketInvalid)
            }
            Some(TicketState::Used { .. }) => {
                debug!(ticket, "ticket already used");
                Err(GatewayError::TicketUsed)
            }
            Some(TicketState::Active { expires_at_ms, .. }) if *expires_at_ms <= now_ms() => {
                debug!(ticket, "ticket expired");
                Err(GatewayError::TicketExpired)
            }
            Some(state) => {
                let expires_at_ms = state.expires_at_ms();
                let previous = std::mem::replace(state, TicketState::Used { expires_at_ms });
                let TicketState::Active { record, .. } = previous else {
                    unreachable!("matched Active above")
                };
                debug!(ticket, "ticket consumed");
                Ok((record.kubeconfig, record.target))
            }
        };

        metrics::TICKETS_CONSUMED_TOTAL
            .with_label_values(&[outcome_label(&outcome)])
            .inc();

        outcome
    }

    /// Remove records past their expiry, whether used or not. Intended to
    /// run on a periodic background task (see [`Self::spawn_sweeper`]);
    /// calling it directly is also how tests exercise the sweep.
    pub fn sweep(&self) {
        let now = now_ms();
        self.records.lock().retain(|_, state| state.expires_at_ms() > now);
    }

    /// Spawn a background task that calls [`Self::sweep`] on an interval.
    /// The interval is half the ticket TTL (minimum one second), so a
    /// record is reclaimed shortly after it could no longer be validly
    /// replayed.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let interval_ms = (self.ticket_ttl_ms / 2).max(1000);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }

    fn generate_ticket() -> String {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; TICKET_ID_BYTES];
        rand::RngCore::fill_bytes(&mut rng, &mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

fn outcome_label(outcome: &Result<(String, ExecTarget), GatewayError>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(GatewayError::TicketInvalid) => "invalid",
        Err(GatewayError::TicketUsed) => "used",
        Err(GatewayError::TicketExpired) => "expired",
        Err(_) => "error",
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
