//! WebSocket ticket issuance: `POST /ws-ticket`.
//!
//! Request struct, `TicketResponse`, and `utoipa::path` annotation carry
//! this gateway's ticket payload (kubeconfig + exec target).

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequest, Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tty_agent_core::error::GatewayError;
use tty_agent_core::model::{ExecTarget, PeerMeta};

use super::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /ws-ticket`. The `kubeconfig` text is held only in memory
/// until the ticket is consumed or swept.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTicketRequest {
    pub kubeconfig: String,
    pub namespace: String,
    pub pod: String,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ok: bool,
    pub ticket: String,
    #[serde(rename = "expiresAt")]
    pub expires_at_ms: i64,
}

/// Wraps `Json<CreateTicketRequest>` so a body that trips
/// `DefaultBodyLimit` (exceeding the 16 KiB envelope margin) comes back as
/// this surface's `{ok:false,error}` envelope with `413 Payload too large.`,
/// instead of axum's own default rejection response. Malformed JSON / wrong
/// content-type still map to 400.
pub struct TicketBody(pub CreateTicketRequest);

impl<S> FromRequest<S> for TicketBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<CreateTicketRequest>::from_request(req, state).await {
            Ok(Json(body)) => Ok(TicketBody(body)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

fn map_json_rejection(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large("Payload too large.")
    } else {
        AppError::bad_request(rejection.body_text())
    }
}

/// Issue a single-use, TTL-bound ticket for a subsequent `/exec` WebSocket
/// connection.
///
/// Returns 400 for a malformed target, 413 if `kubeconfig` exceeds
/// `ws.ticket_max_kubeconfig_bytes`.
#[utoipa::path(
    post,
    path = "/ws-ticket",
    request_body = CreateTicketRequest,
    responses(
        (status = 200, description = "Ticket issued", body = TicketResponse),
        (status = 400, description = "Invalid request"),
        (status = 413, description = "kubeconfig too large"),
    )
)]
pub async fn create_ticket(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    TicketBody(req): TicketBody,
) -> AppResult<impl IntoResponse> {
    if req.kubeconfig.len() > state.config.ws.ticket_max_kubeconfig_bytes {
        return Err(GatewayError::KubeconfigTooLarge.into());
    }

    let target = ExecTarget::normalize(req.namespace, req.pod, req.container, req.command)?;

    let issuer = PeerMeta {
        remote_ip: Some(addr.ip().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let (ticket, expires_at_ms) = state.ticket_store.issue(req.kubeconfig, target, issuer);

    Ok((
        StatusCode::OK,
        Json(TicketResponse {
            ok: true,
            ticket,
            expires_at_ms,
        }),
    ))
}
