//! Control-frame protocol: parsing/validation of client frames and encoding
//! of server frames.
//!
//! Frames are tagged JSON objects, using `serde_json` tagged enums for wire
//! messages. Binary WebSocket frames (raw stdin/stdout bytes) are handled
//! outside this module by the WebSocket gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames a client may send, as a JSON object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Auth {
        ticket: String,
    },
    Stdin {
        data: String,
    },
    Resize {
        cols: i64,
        rows: i64,
    },
    Ping,
}

/// Frames the server may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Ready,
    Authed,
    Started,
    Pong,
    Status { status: Value },
    Error { message: String },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    /// Encode as the JSON text sent over the WebSocket text-frame channel.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame always serializes")
    }
}

/// Parse and validate a client control frame, exactly as received in a
/// WebSocket text frame.
///
/// Malformed JSON or schema mismatches are reported via the returned `Err`;
/// the caller replies with a single `ServerFrame::Error` and must NOT
/// advance the session FSM.
pub fn parse_client_frame(raw: &str) -> Result<ClientFrame, FrameError> {
    let frame: ClientFrame = serde_json::from_str(raw).map_err(|e| FrameError(e.to_string()))?;

    match &frame {
        ClientFrame::Auth { ticket } if ticket.trim().is_empty() => {
            Err(FrameError("auth frame requires a non-empty ticket".into()))
        }
        ClientFrame::Resize { cols, rows } if *cols < 1 || *rows < 1 => Err(FrameError(
            "resize frame requires cols >= 1 and rows >= 1".into(),
        )),
        _ => Ok(normalize_auth_ticket(frame)),
    }
}

fn normalize_auth_ticket(frame: ClientFrame) -> ClientFrame {
    match frame {
        ClientFrame::Auth { ticket } => ClientFrame::Auth {
            ticket: ticket.trim().to_string(),
        },
        other => other,
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct FrameError(pub String);
