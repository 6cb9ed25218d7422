//! HTTP/WebSocket surface for the terminal gateway: request handlers, the
//! `/exec` WebSocket upgrade, router assembly, and shared application state.

pub mod http;
pub mod router;
pub mod state;
pub mod ws;

pub use state::AppState;
