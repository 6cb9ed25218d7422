//! The `/exec` WebSocket gateway.
//!
//! `ws.on_upgrade` splits the socket (`socket.split()`): the sender half is
//! handed to a single writer task fed by an outbound channel, for the whole
//! connection's lifetime; the receiver half is driven inline during the
//! auth/resize handshake and, once the exec session starts, handed to its
//! own reader task running alongside independent output and heartbeat
//! tasks. Splitting the `Started` phase into independent tasks means a
//! stdin write blocked on upstream backpressure can never stall heartbeat
//! liveness checks or outbound exec output — the three run concurrently and
//! only share the outbound channel, not a single `select!` loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tty_agent_core::exec::{self, ExecCleanup, ExecInput, ExecOutcome, ExecOutput};
use tty_agent_core::metrics;
use tty_agent_core::model::{ExecTarget, PeerMeta, TerminalSize};
use tty_agent_core::protocol::{parse_client_frame, ServerFrame};
use tty_agent_core::session::{FrameAction, SessionFsm};

use crate::state::{AppState, ConnectionInfo};

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Outbound channel depth: big enough to absorb a burst of exec output
/// chunks plus a heartbeat ping without the producers blocking on the
/// writer under normal conditions.
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Query-string form of the ticket handshake: a ticket presented as
/// `?ticket=...` is consumed immediately on accept, before any frame is
/// read from the socket.
#[derive(Debug, Deserialize)]
pub struct ExecQuery {
    pub ticket: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/exec", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExecQuery>,
) -> Response {
    if !origin_allowed(&state, &headers) {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    let max_payload = state.config.ws.max_payload_bytes;
    ws.max_message_size(max_payload)
        .max_frame_size(max_payload)
        .on_upgrade(move |socket| handle_socket(socket, state, query.ticket))
}

/// Exact-match against `ws.allowed_origins`; an empty set means "allow any
/// origin". Unaffected by `server.development_mode`, which this surface
/// never reads.
fn origin_allowed(state: &AppState, headers: &HeaderMap) -> bool {
    if state.config.ws.allowed_origins.is_empty() {
        return true;
    }
    headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|origin| state.config.ws.allowed_origins.contains(origin))
}

/// Why the pump loop ended, decided up front so the single cleanup path at
/// the bottom of [`handle_socket`] can pick the right close code/reason.
enum PumpExit {
    ClientClosed,
    TransportError,
    ExecEnded(ExecOutcome),
}

async fn handle_socket(socket: WebSocket, state: AppState, query_ticket: Option<String>) {
    let connection_id = format!("exec_{}", nanoid::nanoid!(12));
    let info = Arc::new(ConnectionInfo::new(now_ms()));
    metrics::SESSIONS_ACTIVE.inc();

    let (sink, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);
    let writer = tokio::spawn(run_writer(sink, outbound_rx));

    let mut fsm = SessionFsm::new();

    // Heartbeat runs independently of the session pumps: this single
    // ticker, created once at accept and threaded through every phase
    // below, covers the whole connection lifetime (auth wait, first resize
    // wait, started pumping), not just the `Started` state.
    let heartbeat_interval_ms = state.config.ws.heartbeat_interval_ms;
    let mut heartbeat_ticker = tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
    heartbeat_ticker.tick().await; // first tick fires immediately; consume it

    if !send_frame(&outbound_tx, ServerFrame::Ready).await {
        finish(&connection_id, outbound_tx, writer, CLOSE_NORMAL, None).await;
        return;
    }
    let _ = fsm.mark_ready();

    let (kubeconfig, target) = match resolve_auth(
        &state,
        &outbound_tx,
        &mut receiver,
        &mut fsm,
        query_ticket,
        &mut heartbeat_ticker,
        &info,
        heartbeat_interval_ms,
    )
    .await
    {
        Ok(pair) => pair,
        Err(AuthFailure::Timeout) => {
            finish(&connection_id, outbound_tx, writer, CLOSE_POLICY_VIOLATION, Some("auth timeout")).await;
            return;
        }
        Err(AuthFailure::Rejected) => {
            finish(&connection_id, outbound_tx, writer, CLOSE_POLICY_VIOLATION, Some("auth rejected")).await;
            return;
        }
        Err(AuthFailure::Transport) => {
            finish(&connection_id, outbound_tx, writer, CLOSE_POLICY_VIOLATION, Some("transport closed")).await;
            return;
        }
        Err(AuthFailure::HeartbeatTimeout) => {
            finish(&connection_id, outbound_tx, writer, CLOSE_INTERNAL_ERROR, Some("heartbeat timeout")).await;
            return;
        }
    };

    // The upstream exec is not attached until at least one valid `resize`
    // has been observed after auth. The first resize's dimensions become
    // the initial TTY size.
    let initial_size = match run_await_first_resize(
        &outbound_tx,
        &mut receiver,
        &mut fsm,
        &mut heartbeat_ticker,
        &info,
        heartbeat_interval_ms,
    )
    .await
    {
        Ok(size) => size,
        Err(ResizeWaitFailure::Transport) => {
            finish(&connection_id, outbound_tx, writer, CLOSE_POLICY_VIOLATION, Some("transport closed")).await;
            return;
        }
        Err(ResizeWaitFailure::HeartbeatTimeout) => {
            finish(&connection_id, outbound_tx, writer, CLOSE_INTERNAL_ERROR, Some("heartbeat timeout")).await;
            return;
        }
    };

    let _ = fsm.mark_starting();

    let client = match exec::client_from_kubeconfig(&kubeconfig).await {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build kube client from kubeconfig");
            let _ = send_frame(&outbound_tx, ServerFrame::error(e.to_string())).await;
            finish(&connection_id, outbound_tx, writer, CLOSE_INTERNAL_ERROR, Some("exec setup failed")).await;
            return;
        }
    };

    let exec_session = match exec::start(&client, &target, initial_size).await {
        Ok(session) => {
            metrics::EXEC_ATTACH_TOTAL.with_label_values(&["started"]).inc();
            session
        }
        Err(e) => {
            metrics::EXEC_ATTACH_TOTAL.with_label_values(&["failed"]).inc();
            warn!(error = %e, "exec attach failed");
            // "No shell found" is a policy violation (1008); any other
            // exec-attach failure is an internal error (1011).
            let close_code = if matches!(&e, tty_agent_core::GatewayError::NoShellFound(_)) {
                CLOSE_POLICY_VIOLATION
            } else {
                CLOSE_INTERNAL_ERROR
            };
            let _ = send_frame(&outbound_tx, ServerFrame::error(e.to_string())).await;
            finish(&connection_id, outbound_tx, writer, close_code, Some("exec attach failed")).await;
            return;
        }
    };

    let (exec_input, exec_output, exec_cleanup) = exec_session.split();

    if let Ok(Some(buffered)) = fsm.mark_started() {
        let _ = exec_input.resize_tx.send(buffered);
    }
    if !send_frame(&outbound_tx, ServerFrame::Started).await {
        exec_cleanup.close();
        finish(&connection_id, outbound_tx, writer, CLOSE_NORMAL, None).await;
        return;
    }

    let exit = run_pump_loop(
        receiver,
        outbound_tx.clone(),
        fsm,
        exec_input,
        exec_output,
        info,
        heartbeat_interval_ms,
    )
    .await;
    exec_cleanup.close();

    let (code, reason) = match exit {
        PumpExit::ClientClosed => (CLOSE_NORMAL, None),
        PumpExit::TransportError => (CLOSE_INTERNAL_ERROR, Some("transport error")),
        PumpExit::ExecEnded(ExecOutcome::Success) => (CLOSE_NORMAL, Some("exec finished")),
        PumpExit::ExecEnded(ExecOutcome::Failure { message }) => {
            let _ = send_frame(&outbound_tx, ServerFrame::error(message.clone())).await;
            (CLOSE_INTERNAL_ERROR, Some("exec failed"))
        }
        PumpExit::ExecEnded(ExecOutcome::Unknown) => (CLOSE_INTERNAL_ERROR, Some("exec ended abnormally")),
    };

    finish(&connection_id, outbound_tx, writer, code, reason).await;
}

/// Why the auth phase ended without reaching `authed`: the caller uses this
/// to pick the close reason. `Transport` means the socket itself is already
/// gone (peer closed / read error) — no close frame needs sending.
enum AuthFailure {
    Timeout,
    Rejected,
    Transport,
    HeartbeatTimeout,
}

/// Resolve authentication either from a query-string ticket (consumed
/// immediately, before a single frame is read, to harden against ticket
/// replay) or, absent one, from the first in-band `auth` frame.
#[allow(clippy::too_many_arguments)]
async fn resolve_auth(
    state: &AppState,
    outbound: &mpsc::Sender<Message>,
    receiver: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    fsm: &mut SessionFsm,
    query_ticket: Option<String>,
    heartbeat_ticker: &mut tokio::time::Interval,
    info: &Arc<ConnectionInfo>,
    heartbeat_interval_ms: u64,
) -> Result<(String, ExecTarget), AuthFailure> {
    if let Some(ticket) = query_ticket.as_deref().map(str::trim) {
        if !ticket.is_empty() {
            return match state.ticket_store.consume(ticket, PeerMeta::default()) {
                Ok((kubeconfig, target)) => {
                    let _ = fsm.mark_authed();
                    if !send_frame(outbound, ServerFrame::Authed).await {
                        return Err(AuthFailure::Transport);
                    }
                    Ok((kubeconfig, target))
                }
                Err(e) => {
                    let _ = send_frame(outbound, ServerFrame::error(e.to_string())).await;
                    Err(AuthFailure::Rejected)
                }
            };
        }
    }

    run_auth_phase(state, outbound, receiver, fsm, heartbeat_ticker, info, heartbeat_interval_ms).await
}

/// Drive the handshake: reply to `ping`, consume the first `auth` frame via
/// `TicketStore::consume`, and enforce `ws.auth_timeout_ms`. Returns the
/// resolved `(kubeconfig, target)` pair on success. Any binary frame or text
/// `stdin`/`resize` frame received before `authed` is fatal: it is rejected
/// with an error frame and the session is torn down (close 1008) without a
/// single byte reaching the upstream exec.
#[allow(clippy::too_many_arguments)]
async fn run_auth_phase(
    state: &AppState,
    outbound: &mpsc::Sender<Message>,
    receiver: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    fsm: &mut SessionFsm,
    heartbeat_ticker: &mut tokio::time::Interval,
    info: &Arc<ConnectionInfo>,
    heartbeat_interval_ms: u64,
) -> Result<(String, tty_agent_core::model::ExecTarget), AuthFailure> {
    let deadline = tokio::time::sleep(Duration::from_millis(state.config.ws.auth_timeout_ms));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                let message = format!(
                    "Auth timeout: no ticket presented within {}ms",
                    state.config.ws.auth_timeout_ms
                );
                let _ = send_frame(outbound, ServerFrame::error(message)).await;
                return Err(AuthFailure::Timeout);
            }
            _ = heartbeat_ticker.tick() => {
                if !heartbeat_tick(outbound, info, heartbeat_interval_ms).await {
                    return Err(AuthFailure::HeartbeatTimeout);
                }
            }
            message = receiver.next() => {
                match message {
                    None | Some(Err(_)) => return Err(AuthFailure::Transport),
                    Some(Ok(Message::Close(_))) => return Err(AuthFailure::Transport),
                    Some(Ok(Message::Pong(_))) => {
                        info.last_pong_ms.store(now_ms(), Ordering::Relaxed);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let _ = send_frame(outbound, ServerFrame::error(
                            "stdin is not permitted before authentication",
                        ))
                        .await;
                        return Err(AuthFailure::Rejected);
                    }
                    Some(Ok(Message::Text(text))) => {
                        let frame = match parse_client_frame(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                let _ = send_frame(outbound, ServerFrame::error(e.to_string())).await;
                                continue;
                            }
                        };

                        match fsm.dispatch(frame) {
                            Ok(FrameAction::Authenticate(ticket)) => {
                                match state.ticket_store.consume(&ticket, PeerMeta::default()) {
                                    Ok((kubeconfig, target)) => {
                                        let _ = fsm.mark_authed();
                                        if !send_frame(outbound, ServerFrame::Authed).await {
                                            return Err(AuthFailure::Transport);
                                        }
                                        return Ok((kubeconfig, target));
                                    }
                                    Err(e) => {
                                        let _ = send_frame(outbound, ServerFrame::error(e.to_string())).await;
                                        return Err(AuthFailure::Rejected);
                                    }
                                }
                            }
                            Ok(FrameAction::Pong) => {
                                let _ = send_frame(outbound, ServerFrame::Pong).await;
                            }
                            Ok(_) => {
                                let _ = send_frame(outbound, ServerFrame::error(
                                    "must authenticate before sending input",
                                ))
                                .await;
                                return Err(AuthFailure::Rejected);
                            }
                            Err(e) => {
                                // Pre-auth `stdin`/`resize` frames land here
                                // (`SessionError::NotAuthenticated`, or
                                // `InvalidResize` for an out-of-range resize),
                                // treated the same as a pre-auth binary frame
                                // — fatal, close 1008.
                                let _ = send_frame(outbound, ServerFrame::error(e.to_string())).await;
                                return Err(AuthFailure::Rejected);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Why the first-resize wait ended without a resize.
enum ResizeWaitFailure {
    Transport,
    HeartbeatTimeout,
}

/// Block until the first valid `resize` frame arrives post-auth, replying to
/// `ping`/redundant `auth` frames in the meantime. The upstream exec must
/// not be attached before this resolves, and the returned size becomes the
/// TTY's initial window.
#[allow(clippy::too_many_arguments)]
async fn run_await_first_resize(
    outbound: &mpsc::Sender<Message>,
    receiver: &mut (impl Stream<Item = Result<Message, axum::Error>> + Unpin),
    fsm: &mut SessionFsm,
    heartbeat_ticker: &mut tokio::time::Interval,
    info: &Arc<ConnectionInfo>,
    heartbeat_interval_ms: u64,
) -> Result<TerminalSize, ResizeWaitFailure> {
    loop {
        tokio::select! {
            _ = heartbeat_ticker.tick() => {
                if !heartbeat_tick(outbound, info, heartbeat_interval_ms).await {
                    return Err(ResizeWaitFailure::HeartbeatTimeout);
                }
            }
            message = receiver.next() => {
                match message {
                    None | Some(Err(_)) => return Err(ResizeWaitFailure::Transport),
                    Some(Ok(Message::Close(_))) => return Err(ResizeWaitFailure::Transport),
                    Some(Ok(Message::Pong(_))) => {
                        info.last_pong_ms.store(now_ms(), Ordering::Relaxed);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let _ = send_frame(
                            outbound,
                            ServerFrame::error("stdin is not permitted before the exec session has started"),
                        )
                        .await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        let frame = match parse_client_frame(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                let _ = send_frame(outbound, ServerFrame::error(e.to_string())).await;
                                continue;
                            }
                        };

                        match fsm.dispatch(frame) {
                            Ok(FrameAction::BufferedResize(size)) => return Ok(size),
                            Ok(FrameAction::Pong) => {
                                let _ = send_frame(outbound, ServerFrame::Pong).await;
                            }
                            Ok(FrameAction::AlreadyAuthed) => {
                                let _ = send_frame(outbound, ServerFrame::Authed).await;
                            }
                            Ok(_) => {
                                let _ = send_frame(
                                    outbound,
                                    ServerFrame::error("must send resize before sending input"),
                                )
                                .await;
                            }
                            Err(e) => {
                                let _ = send_frame(outbound, ServerFrame::error(e.to_string())).await;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Drive the `Started` phase as three independent tasks — reader, output
/// forwarder, heartbeat — so that none of them can stall the others. The
/// first to decide the connection is over reports its [`PumpExit`]; the
/// remaining two are aborted rather than asked to wind down cooperatively,
/// since neither holds anything besides channel endpoints.
async fn run_pump_loop(
    receiver: SplitStream<WebSocket>,
    outbound: mpsc::Sender<Message>,
    fsm: SessionFsm,
    exec_input: ExecInput,
    exec_output: ExecOutput,
    info: Arc<ConnectionInfo>,
    heartbeat_interval_ms: u64,
) -> PumpExit {
    let (exit_tx, mut exit_rx) = mpsc::channel::<PumpExit>(3);

    let reader = tokio::spawn(run_reader(receiver, outbound.clone(), fsm, exec_input, info.clone(), exit_tx.clone()));
    let output = tokio::spawn(run_output_forwarder(exec_output, outbound.clone(), exit_tx.clone()));
    let heartbeat = tokio::spawn(run_heartbeat(outbound, info, heartbeat_interval_ms, exit_tx));

    let exit = exit_rx.recv().await.unwrap_or(PumpExit::TransportError);

    reader.abort();
    output.abort();
    heartbeat.abort();

    exit
}

/// Reads client frames for the `Started` phase: forwards `stdin` to the
/// exec session and applies `resize` immediately, independent of the
/// outbound side. A blocked `stdin` forward (upstream backpressure) only
/// blocks this task, never the heartbeat or output-forwarding tasks.
async fn run_reader(
    mut receiver: SplitStream<WebSocket>,
    outbound: mpsc::Sender<Message>,
    mut fsm: SessionFsm,
    exec_input: ExecInput,
    info: Arc<ConnectionInfo>,
    exit_tx: mpsc::Sender<PumpExit>,
) {
    loop {
        match receiver.next().await {
            None => {
                let _ = exit_tx.send(PumpExit::ClientClosed).await;
                return;
            }
            Some(Err(_)) => {
                let _ = exit_tx.send(PumpExit::TransportError).await;
                return;
            }
            Some(Ok(Message::Close(_))) => {
                let _ = exit_tx.send(PumpExit::ClientClosed).await;
                return;
            }
            Some(Ok(Message::Pong(_))) => {
                info.last_pong_ms.store(now_ms(), Ordering::Relaxed);
            }
            Some(Ok(Message::Binary(data))) => {
                if exec_input.stdin_tx.send(data.into()).await.is_err() {
                    let _ = exit_tx.send(PumpExit::TransportError).await;
                    return;
                }
            }
            Some(Ok(Message::Text(text))) => {
                if !dispatch_text_frame(&outbound, &mut fsm, &exec_input, text.as_str()).await {
                    let _ = exit_tx.send(PumpExit::TransportError).await;
                    return;
                }
            }
            Some(Ok(Message::Ping(_))) => {}
        }
    }
}

/// Forwards upstream exec output to the client, independent of inbound
/// reading. Reports the terminal [`ExecOutcome`] once the output channel
/// closes.
async fn run_output_forwarder(mut exec_output: ExecOutput, outbound: mpsc::Sender<Message>, exit_tx: mpsc::Sender<PumpExit>) {
    loop {
        match exec_output.output_rx.recv().await {
            Some(bytes) => {
                if outbound.send(Message::Binary(bytes.into())).await.is_err() {
                    let _ = exit_tx.send(PumpExit::TransportError).await;
                    return;
                }
            }
            None => {
                let outcome = exec_output.status_rx.try_recv().unwrap_or(ExecOutcome::Unknown);
                let _ = exit_tx.send(PumpExit::ExecEnded(outcome)).await;
                return;
            }
        }
    }
}

/// Pings on a fixed interval and reports a timeout once the peer has missed
/// two consecutive intervals without a pong. Runs independent of both the
/// reader and output-forwarder tasks, so neither stdin backpressure nor a
/// slow exec stream delays liveness detection.
async fn run_heartbeat(outbound: mpsc::Sender<Message>, info: Arc<ConnectionInfo>, heartbeat_interval_ms: u64, exit_tx: mpsc::Sender<PumpExit>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
    ticker.tick().await; // first tick fires immediately; consume it
    loop {
        ticker.tick().await;
        if !heartbeat_tick(&outbound, &info, heartbeat_interval_ms).await {
            let _ = exit_tx.send(PumpExit::TransportError).await;
            return;
        }
    }
}

/// Handle one text control frame during the `Started` phase. Returns
/// `false` only when the outbound channel itself has failed (the caller
/// should tear down); a rejected/invalid frame just yields an `error` reply
/// and keeps the session alive.
async fn dispatch_text_frame(
    outbound: &mpsc::Sender<Message>,
    fsm: &mut SessionFsm,
    exec_input: &ExecInput,
    text: &str,
) -> bool {
    let frame = match parse_client_frame(text) {
        Ok(frame) => frame,
        Err(e) => return send_frame(outbound, ServerFrame::error(e.to_string())).await,
    };

    match fsm.dispatch(frame) {
        Ok(FrameAction::ForwardStdin(data)) => exec_input.stdin_tx.send(data.into_bytes()).await.is_ok(),
        Ok(FrameAction::ApplyResize(size)) => {
            let _ = exec_input.resize_tx.send(size);
            true
        }
        Ok(FrameAction::BufferedResize(_)) => true,
        Ok(FrameAction::Pong) => send_frame(outbound, ServerFrame::Pong).await,
        Ok(FrameAction::AlreadyAuthed) => send_frame(outbound, ServerFrame::Authed).await,
        Ok(FrameAction::Authenticate(_)) => {
            send_frame(outbound, ServerFrame::error("session is already authenticated")).await
        }
        Err(e) => send_frame(outbound, ServerFrame::error(e.to_string())).await,
    }
}

/// One heartbeat tick. Returns `false` once the peer has missed two
/// consecutive intervals without a pong, or the ping send itself fails;
/// either way the caller tears the connection down.
async fn heartbeat_tick(outbound: &mpsc::Sender<Message>, info: &ConnectionInfo, heartbeat_interval_ms: u64) -> bool {
    let idle_ms = now_ms() - info.last_pong_ms.load(Ordering::Relaxed);
    if idle_ms > 2 * heartbeat_interval_ms as i64 {
        return false;
    }
    outbound.send(Message::Ping(Vec::<u8>::new().into())).await.is_ok()
}

/// Sends one server frame through the outbound channel. Returns `false` if
/// the writer task has already gone away (channel closed), which is
/// equivalent to a transport failure for every caller.
async fn send_frame(outbound: &mpsc::Sender<Message>, frame: ServerFrame) -> bool {
    outbound.send(Message::Text(frame.encode().into())).await.is_ok()
}

/// Owns the socket's write half for the whole connection lifetime, draining
/// the outbound channel in order. Exits once every `Sender` clone has been
/// dropped or a write fails.
async fn run_writer(mut sink: SplitSink<WebSocket, Message>, mut outbound_rx: mpsc::Receiver<Message>) {
    while let Some(message) = outbound_rx.recv().await {
        if sink.send(message).await.is_err() {
            break;
        }
    }
}

/// Send a close frame, drop the outbound sender, and wait for the writer
/// task to drain and exit before recording metrics/logs. Best-effort: if
/// the transport is already gone the close send simply fails silently, same
/// as every other frame send on this surface.
async fn finish(
    connection_id: &str,
    outbound_tx: mpsc::Sender<Message>,
    writer: tokio::task::JoinHandle<()>,
    close_code: u16,
    reason: Option<&str>,
) {
    let _ = outbound_tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code,
            reason: reason.unwrap_or("").into(),
        })))
        .await;
    drop(outbound_tx);
    let _ = writer.await;

    metrics::SESSIONS_ACTIVE.dec();
    metrics::SESSIONS_CLOSED_TOTAL
        .with_label_values(&[&close_code.to_string()])
        .inc();
    debug!(connection_id, close_code, reason, "session closed");
    info!(connection_id, "exec session ended");
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
