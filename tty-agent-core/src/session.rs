//! `SessionFsm`: the per-connection state machine gating which client
//! frames are accepted at each point in the handshake, independent of any
//! I/O. The WebSocket gateway (`tty-agent-api::ws`) owns the actual sockets
//! and exec pumps; this module only tracks "where are we" and "what's
//! allowed next", the state-machine-as-enum idiom used for connection and
//! session types elsewhere in this workspace.

use thiserror::Error;

use crate::model::TerminalSize;
use crate::protocol::ClientFrame;

/// Lifecycle states: `connecting → ready → authed → starting → started →
/// closed`, with an `error` side exit collapsing into `closed` from any
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// WebSocket accepted, the `ready` server frame not yet sent.
    Connecting,
    /// `ready` sent; waiting for an `auth` client frame.
    Ready,
    /// Ticket consumed successfully; exec attach not yet started.
    Authed,
    /// Exec attach in progress (shell fallback loop running).
    Starting,
    /// Exec attached; stdin/stdout are flowing.
    Started,
    /// Terminal state. Reached either cleanly or via the error side exit.
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is already authenticated")]
    AlreadyAuthenticated,
    #[error("must authenticate before sending input")]
    NotAuthenticated,
    #[error("session is closed")]
    SessionClosed,
    #[error("invalid resize dimensions")]
    InvalidResize,
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// What the gateway should do in response to a client frame, decided purely
/// from session state.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameAction {
    /// Hand the ticket to `TicketStore::consume` and, on success, call
    /// [`SessionFsm::mark_authed`].
    Authenticate(String),
    /// Forward these bytes to the exec stdin pipe.
    ForwardStdin(String),
    /// Apply this resize immediately (session already started).
    ApplyResize(TerminalSize),
    /// Resize arrived before the exec session started; buffered so it can be
    /// replayed as the initial terminal size once attach completes.
    BufferedResize(TerminalSize),
    /// A second `auth` frame arrived on an already-authenticated session
    /// (e.g. a query-ticket auth followed by a redundant in-band `auth`
    /// frame). Re-emits `authed` idempotently instead of attempting another
    /// consumption, to harden against ticket replay.
    AlreadyAuthed,
    /// Reply with a `pong` frame. Always permitted, at any state.
    Pong,
}

/// Pure state tracker for one WebSocket connection.
pub struct SessionFsm {
    state: SessionState,
    pending_resize: Option<TerminalSize>,
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFsm {
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            pending_resize: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The `ready` server frame has been written to the socket.
    pub fn mark_ready(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Connecting, SessionState::Ready)
    }

    /// `TicketStore::consume` succeeded for this connection's `auth` frame.
    pub fn mark_authed(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Ready, SessionState::Authed)
    }

    /// Exec attach has been kicked off (shell fallback loop running).
    pub fn mark_starting(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Authed, SessionState::Starting)
    }

    /// Exec attach succeeded. Returns the buffered resize (if any) so the
    /// caller can forward it as the session's first terminal size.
    pub fn mark_started(&mut self) -> Result<Option<TerminalSize>, SessionError> {
        self.transition(SessionState::Starting, SessionState::Started)?;
        Ok(self.pending_resize.take())
    }

    /// Terminal, idempotent: closing an already-closed session is a no-op.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
        self.pending_resize = None;
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Decide what the gateway should do with an inbound client frame given
    /// the current state, without mutating session-level auth/exec state
    /// (the caller drives those transitions based on the outcome).
    pub fn dispatch(&mut self, frame: ClientFrame) -> Result<FrameAction, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }

        match frame {
            ClientFrame::Ping => Ok(FrameAction::Pong),
            ClientFrame::Auth { ticket } => match self.state {
                SessionState::Ready => Ok(FrameAction::Authenticate(ticket)),
                SessionState::Authed | SessionState::Starting | SessionState::Started => {
                    Ok(FrameAction::AlreadyAuthed)
                }
                _ => Err(SessionError::AlreadyAuthenticated),
            },
            ClientFrame::Stdin { data } => {
                if self.state != SessionState::Started {
                    return Err(SessionError::NotAuthenticated);
                }
                Ok(FrameAction::ForwardStdin(data))
            }
            ClientFrame::Resize { cols, rows } => {
                let size = TerminalSize::validate(cols, rows).map_err(|_| SessionError::InvalidResize)?;
                match self.state {
                    SessionState::Started => Ok(FrameAction::ApplyResize(size)),
                    SessionState::Authed | SessionState::Starting => {
                        self.pending_resize = Some(size);
                        Ok(FrameAction::BufferedResize(size))
                    }
                    _ => Err(SessionError::NotAuthenticated),
                }
            }
        }
    }

    fn transition(
        &mut self,
        expected_from: SessionState,
        to: SessionState,
    ) -> Result<(), SessionError> {
        if self.state != expected_from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authed_fsm() -> SessionFsm {
        let mut fsm = SessionFsm::new();
        fsm.mark_ready().unwrap();
        fsm.mark_authed().unwrap();
        fsm
    }

    #[test]
    fn happy_path_transitions_in_order() {
        let mut fsm = SessionFsm::new();
        assert_eq!(fsm.state(), SessionState::Connecting);
        fsm.mark_ready().unwrap();
        fsm.mark_authed().unwrap();
        fsm.mark_starting().unwrap();
        let buffered = fsm.mark_started().unwrap();
        assert_eq!(fsm.state(), SessionState::Started);
        assert_eq!(buffered, None);
    }

    #[test]
    fn auth_frame_rejected_outside_ready_state() {
        let mut fsm = SessionFsm::new();
        let err = fsm
            .dispatch(ClientFrame::Auth {
                ticket: "t".into(),
            })
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyAuthenticated);
    }

    #[test]
    fn stdin_rejected_before_started() {
        let mut fsm = authed_fsm();
        let err = fsm
            .dispatch(ClientFrame::Stdin { data: "ls\n".into() })
            .unwrap_err();
        assert_eq!(err, SessionError::NotAuthenticated);
    }

    #[test]
    fn resize_before_started_is_buffered_and_replayed() {
        let mut fsm = authed_fsm();
        fsm.mark_starting().unwrap();
        let action = fsm
            .dispatch(ClientFrame::Resize { cols: 80, rows: 24 })
            .unwrap();
        assert_eq!(
            action,
            FrameAction::BufferedResize(TerminalSize { cols: 80, rows: 24 })
        );

        let replayed = fsm.mark_started().unwrap();
        assert_eq!(replayed, Some(TerminalSize { cols: 80, rows: 24 }));
    }

    #[test]
    fn out_of_range_resize_is_rejected_distinctly_from_not_authenticated() {
        let mut fsm = authed_fsm();
        fsm.mark_starting().unwrap();
        let err = fsm
            .dispatch(ClientFrame::Resize { cols: 99_999, rows: 24 })
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidResize);
    }

    #[test]
    fn resize_after_started_applies_immediately() {
        let mut fsm = authed_fsm();
        fsm.mark_starting().unwrap();
        fsm.mark_started().unwrap();
        let action = fsm
            .dispatch(ClientFrame::Resize { cols: 100, rows: 40 })
            .unwrap();
        assert_eq!(
            action,
            FrameAction::ApplyResize(TerminalSize { cols: 100, rows: 40 })
        );
    }

    #[test]
    fn redundant_auth_frame_after_authed_is_idempotent() {
        let mut fsm = authed_fsm();
        let action = fsm
            .dispatch(ClientFrame::Auth {
                ticket: "unused-second-ticket".into(),
            })
            .unwrap();
        assert_eq!(action, FrameAction::AlreadyAuthed);
        assert_eq!(fsm.state(), SessionState::Authed);
    }

    #[test]
    fn ping_allowed_in_any_non_closed_state() {
        let mut fsm = SessionFsm::new();
        assert_eq!(fsm.dispatch(ClientFrame::Ping).unwrap(), FrameAction::Pong);
    }

    #[test]
    fn dispatch_after_close_is_rejected() {
        let mut fsm = SessionFsm::new();
        fsm.close();
        assert!(fsm.is_closed());
        let err = fsm.dispatch(ClientFrame::Ping).unwrap_err();
        assert_eq!(err, SessionError::SessionClosed);
    }

    #[test]
    fn close_is_idempotent() {
        let mut fsm = authed_fsm();
        fsm.close();
        fsm.close();
        assert_eq!(fsm.state(), SessionState::Closed);
    }
}
