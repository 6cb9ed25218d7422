//! Domain error type shared by every component in this crate.
//!
//! Transport-agnostic: nothing in here knows about status codes. The
//! HTTP-aware wrapper lives separately in
//! `tty_agent_api::http::error::AppError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid or expired ticket.")]
    TicketInvalid,

    #[error("Ticket already used.")]
    TicketUsed,

    #[error("Ticket expired.")]
    TicketExpired,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large.")]
    PayloadTooLarge,

    #[error("kubeconfig too large.")]
    KubeconfigTooLarge,

    #[error("No shell found in container. Tried: {0}")]
    NoShellFound(String),

    #[error("{0}")]
    ExecFailed(String),

    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
