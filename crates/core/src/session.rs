//! Notarization session state machine.
//!
//! A session moves through a fixed sequence of states:
//!
//! ```text
//! Idle -> ConnectingNotary -> ExchangingKeys -> StreamingSession
//!      -> RequestingSignature -> AwaitingSignature -> Signed
//! ```
//!
//! Any non-terminal state may move to [`SessionState::Aborted`]. Terminal
//! states never transition again, sessions are never resumed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::ServerName;

/// State of a notarization session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing has happened yet.
    Idle,
    /// Opening the channel to the Notary.
    ConnectingNotary,
    /// Agreeing on session keys with the Notary.
    ExchangingKeys,
    /// Running the TLS session with the server while the Notary co-observes.
    StreamingSession,
    /// Sending the aggregate commitment to the Notary.
    RequestingSignature,
    /// Waiting for the Notary's signature.
    AwaitingSignature,
    /// A valid signature over the aggregate commitment was received.
    Signed,
    /// The session failed.
    Aborted(AbortReason),
}

impl SessionState {
    /// Returns the next state on the success path.
    pub fn advance(self) -> Result<Self, TransitionError> {
        use SessionState::*;

        let next = match self {
            Idle => ConnectingNotary,
            ConnectingNotary => ExchangingKeys,
            ExchangingKeys => StreamingSession,
            StreamingSession => RequestingSignature,
            RequestingSignature => AwaitingSignature,
            AwaitingSignature => Signed,
            Signed | Aborted(_) => return Err(TransitionError(self)),
        };

        Ok(next)
    }

    /// Returns the aborted state.
    pub fn abort(self, reason: AbortReason) -> Result<Self, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError(self));
        }

        Ok(SessionState::Aborted(reason))
    }

    /// Returns `true` if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Signed | SessionState::Aborted(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("Idle"),
            SessionState::ConnectingNotary => f.write_str("ConnectingNotary"),
            SessionState::ExchangingKeys => f.write_str("ExchangingKeys"),
            SessionState::StreamingSession => f.write_str("StreamingSession"),
            SessionState::RequestingSignature => f.write_str("RequestingSignature"),
            SessionState::AwaitingSignature => f.write_str("AwaitingSignature"),
            SessionState::Signed => f.write_str("Signed"),
            SessionState::Aborted(reason) => write!(f, "Aborted({reason})"),
        }
    }
}

/// Why a session was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AbortReason {
    ConnectError,
    NotaryUnreachable,
    TranscriptDesync,
    ProtocolViolation,
    PolicyConflict,
    Timeout,
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::ConnectError => "connect error",
            AbortReason::NotaryUnreachable => "notary unreachable",
            AbortReason::TranscriptDesync => "transcript desync",
            AbortReason::ProtocolViolation => "protocol violation",
            AbortReason::PolicyConflict => "policy conflict",
            AbortReason::Timeout => "timeout",
            AbortReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Error for an invalid state transition.
#[derive(Debug, thiserror::Error)]
#[error("session in terminal state {0} can not transition")]
pub struct TransitionError(SessionState);

impl TransitionError {
    /// Returns the state the transition was attempted from.
    pub fn state(&self) -> SessionState {
        self.0
    }
}

/// A recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State before the transition.
    pub from: SessionState,
    /// State after the transition.
    pub to: SessionState,
    /// UNIX time of the transition in milliseconds.
    pub at: u64,
}

/// One attempted proof run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    domain: ServerName,
    uri: String,
    notary_host: String,
    state: SessionState,
    started_at: Option<u64>,
    ended_at: Option<u64>,
    history: Vec<Transition>,
}

impl Session {
    /// Creates a new idle session.
    pub fn new(domain: ServerName, uri: impl Into<String>, notary_host: impl Into<String>) -> Self {
        Self {
            domain,
            uri: uri.into(),
            notary_host: notary_host.into(),
            state: SessionState::Idle,
            started_at: None,
            ended_at: None,
            history: Vec::new(),
        }
    }

    /// Returns the target domain.
    pub fn domain(&self) -> &ServerName {
        &self.domain
    }

    /// Returns the target URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the Notary host.
    pub fn notary_host(&self) -> &str {
        &self.notary_host
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the UNIX time in milliseconds at which the session left
    /// [`SessionState::Idle`].
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    /// Returns the UNIX time in milliseconds at which the session reached a
    /// terminal state.
    pub fn ended_at(&self) -> Option<u64> {
        self.ended_at
    }

    /// Returns the transitions taken so far.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Moves to the next state on the success path.
    pub fn advance(&mut self) -> Result<SessionState, TransitionError> {
        let from = self.state;
        let next = self.state.advance()?;
        self.transition(next);

        debug!(domain = %self.domain, %from, to = %next, "session transition");

        Ok(next)
    }

    /// Aborts the session.
    pub fn abort(&mut self, reason: AbortReason) -> Result<SessionState, TransitionError> {
        let from = self.state;
        let next = self.state.abort(reason)?;
        self.transition(next);

        warn!(domain = %self.domain, %from, %reason, "session aborted");

        Ok(next)
    }

    fn transition(&mut self, to: SessionState) {
        let at = now_millis();

        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
        if to.is_terminal() {
            self.ended_at = Some(at);
        }

        self.history.push(Transition {
            from: self.state,
            to,
            at,
        });
        self.state = to;
    }
}

fn now_millis() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn session() -> Session {
        Session::new(
            ServerName::try_from("www.example.com").unwrap(),
            "/",
            "notary.codes",
        )
    }

    #[test]
    fn test_success_path() {
        let mut session = session();

        let mut states = Vec::new();
        while !session.state().is_terminal() {
            states.push(session.advance().unwrap());
        }

        assert_eq!(
            states,
            vec![
                SessionState::ConnectingNotary,
                SessionState::ExchangingKeys,
                SessionState::StreamingSession,
                SessionState::RequestingSignature,
                SessionState::AwaitingSignature,
                SessionState::Signed,
            ]
        );
        assert_eq!(session.history().len(), 6);
        assert_eq!(session.history()[0].from, SessionState::Idle);
        assert!(session.started_at().is_some());
        assert!(session.ended_at().is_some());
    }

    #[rstest]
    #[case::idle(0)]
    #[case::connecting(1)]
    #[case::exchanging(2)]
    #[case::streaming(3)]
    #[case::requesting(4)]
    #[case::awaiting(5)]
    fn test_abort_from_any_state(#[case] steps: usize) {
        let mut session = session();
        for _ in 0..steps {
            session.advance().unwrap();
        }

        let state = session.abort(AbortReason::Timeout).unwrap();

        assert_eq!(state, SessionState::Aborted(AbortReason::Timeout));
        assert!(session.ended_at().is_some());
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        let mut session = session();
        session.abort(AbortReason::NotaryUnreachable).unwrap();

        let err = session.advance().unwrap_err();
        assert!(matches!(err.state(), SessionState::Aborted(_)));
        assert!(session.abort(AbortReason::Timeout).is_err());

        assert!(SessionState::Signed.advance().is_err());
        assert!(SessionState::Signed.abort(AbortReason::Cancelled).is_err());
    }
}
