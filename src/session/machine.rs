//! Session lifecycle state machine
//!
//! ```text
//! Detecting ─ inside ─► InsideMultiplexer ─ TunnelExited ─► Connected | Failed
//!     │
//!     └─ outside ─► Attaching ─ HandedOff ─► exit
//!                       │
//!                       └─ NoSuchSession ─► OutsideMultiplexer ─ HandedOff ─► exit
//! ```
//!
//! Detecting "outside" starts the attach attempt immediately.
//!
//! [`advance`] is pure. The controller executes the returned [`Directive`]
//! and feeds the result back as the next [`Event`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Detecting,
    OutsideMultiplexer,
    Attaching,
    InsideMultiplexer,
    Connected,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Detecting => "DETECTING",
            SessionState::OutsideMultiplexer => "OUTSIDE_MULTIPLEXER",
            SessionState::Attaching => "ATTACHING",
            SessionState::InsideMultiplexer => "INSIDE_MULTIPLEXER",
            SessionState::Connected => "CONNECTED",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Result of environment detection, either outside or inside
    Detected(SessionState),
    /// The terminal now belongs to the session
    HandedOff,
    /// The named session does not exist
    NoSuchSession,
    /// The tunnel process exited
    TunnelExited { success: bool },
}

/// What the controller must do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Start a fresh invocation in the existing session and bind the terminal to it
    Attach,
    /// Create the session with a fresh invocation as its initial command
    Create,
    /// Launch the tunnel in this process
    Launch,
    /// Nothing left to do in this process
    Exit,
}

/// Pair of state and event with no defined transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub state: SessionState,
    pub event: Event,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no transition from {} on {:?}", self.state, self.event)
    }
}

/// Compute the next state and the directive to execute
pub fn advance(
    state: SessionState,
    event: Event,
) -> Result<(SessionState, Directive), InvalidTransition> {
    use Directive::*;
    use SessionState::*;

    let next = match (state, event) {
        (Detecting, Event::Detected(OutsideMultiplexer)) => (Attaching, Attach),
        (Detecting, Event::Detected(InsideMultiplexer)) => (InsideMultiplexer, Launch),
        (Attaching, Event::NoSuchSession) => (OutsideMultiplexer, Create),
        (Attaching, Event::HandedOff) => (Attaching, Exit),
        (OutsideMultiplexer, Event::HandedOff) => (OutsideMultiplexer, Exit),
        (InsideMultiplexer, Event::TunnelExited { success: true }) => (Connected, Exit),
        (InsideMultiplexer, Event::TunnelExited { success: false }) => (Failed, Exit),
        _ => return Err(InvalidTransition { state, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_launches() {
        let detected = Event::Detected(SessionState::InsideMultiplexer);
        let (state, directive) = advance(SessionState::Detecting, detected).unwrap();
        assert_eq!(state, SessionState::InsideMultiplexer);
        assert_eq!(directive, Directive::Launch);
    }

    #[test]
    fn test_outside_attaches_first() {
        let detected = Event::Detected(SessionState::OutsideMultiplexer);
        let (state, directive) = advance(SessionState::Detecting, detected).unwrap();
        assert_eq!(state, SessionState::Attaching);
        assert_eq!(directive, Directive::Attach);
    }

    #[test]
    fn test_missing_session_creates() {
        let (state, directive) = advance(SessionState::Attaching, Event::NoSuchSession).unwrap();
        assert_eq!(state, SessionState::OutsideMultiplexer);
        assert_eq!(directive, Directive::Create);

        let (state, directive) = advance(state, Event::HandedOff).unwrap();
        assert_eq!(state, SessionState::OutsideMultiplexer);
        assert_eq!(directive, Directive::Exit);
    }

    #[test]
    fn test_attach_hands_off() {
        let (state, directive) = advance(SessionState::Attaching, Event::HandedOff).unwrap();
        assert_eq!(state, SessionState::Attaching);
        assert_eq!(directive, Directive::Exit);
    }

    #[test]
    fn test_tunnel_outcomes() {
        let exited = |success| Event::TunnelExited { success };

        let (state, _) = advance(SessionState::InsideMultiplexer, exited(true)).unwrap();
        assert_eq!(state, SessionState::Connected);

        let (state, _) = advance(SessionState::InsideMultiplexer, exited(false)).unwrap();
        assert_eq!(state, SessionState::Failed);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(advance(SessionState::OutsideMultiplexer, Event::NoSuchSession).is_err());
        assert!(advance(SessionState::Attaching, Event::TunnelExited { success: true }).is_err());
        let detected = Event::Detected(SessionState::Connected);
        assert!(advance(SessionState::Detecting, detected).is_err());
        assert!(advance(SessionState::Connected, Event::HandedOff).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::OutsideMultiplexer.to_string(), "OUTSIDE_MULTIPLEXER");
        let err = InvalidTransition {
            state: SessionState::Failed,
            event: Event::NoSuchSession,
        };
        assert_eq!(err.to_string(), "no transition from FAILED on NoSuchSession");
    }
}
