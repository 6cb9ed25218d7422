//! Domain crate for the terminal gateway: configuration, logging, metrics,
//! error types, and the stateful services (`TicketStore`, `SessionFsm`,
//! `ExecBridge`) that `tty-agent-api` wires up to axum and a real socket.
//!
//! Everything here is transport-agnostic, with no `axum` dependency.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod protocol;
pub mod service;
pub mod session;

pub use error::{GatewayError, Result};
