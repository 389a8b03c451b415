//! Session lifecycle.
//!
//! ```text
//! idle --start--> requesting --granted--> listening --task--> processing
//! processing --action--> guiding --advance--> processing
//! processing --done--> finished
//! requesting | listening | processing | guiding --failure--> error
//! any non-idle --stop--> idle
//! idle | finished | error --start--> requesting (full reset)
//! ```

use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionHistory};
use crate::environment::CaptureHandle;
use crate::error::{ErrorRecord, InvalidTransition, OperatorError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Environment permission is being requested.
    Requesting,
    /// Surface is live, no task yet.
    Listening,
    /// A frame is being captured and judged.
    Processing,
    /// An action was produced and awaits execution or confirmation.
    Guiding,
    Finished,
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Error)
    }

    /// States in which the surface is held and work may be under way.
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle) && !self.is_terminal()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Guiding => "guiding",
            SessionState::Finished => "finished",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Where a task came from. Both channels end in the same transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskInput {
    Typed(String),
    /// Text produced by a speech-to-text engine.
    Transcribed(String),
}

impl TaskInput {
    pub fn text(&self) -> &str {
        match self {
            TaskInput::Typed(t) | TaskInput::Transcribed(t) => t.trim(),
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            TaskInput::Typed(_) => "typed",
            TaskInput::Transcribed(_) => "voice",
        }
    }
}

/// One end-to-end run of the operator, from start to a terminal state.
///
/// The session owns its history and its capture handle; the driver only
/// borrows it for the duration of a call.
#[derive(Debug, Default)]
pub struct Session {
    id: String,
    state: SessionState,
    task: String,
    history: ActionHistory,
    last_action: Option<Action>,
    last_error: Option<ErrorRecord>,
    capture: Option<CaptureHandle>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.last_action.as_ref()
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    pub fn capture(&self) -> Option<&CaptureHandle> {
        self.capture.as_ref()
    }

    fn reject(&self, event: &'static str) -> InvalidTransition {
        warn!(session = %self.id, state = %self.state, event, "invalid session transition");
        InvalidTransition { from: self.state, event }
    }

    fn enter(&mut self, next: SessionState) {
        debug!(session = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
    }

    /// Begins a fresh session. Legal from `idle`, `finished` and `error`;
    /// every piece of previous session data is dropped.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        if self.state.is_active() {
            return Err(self.reject("start"));
        }
        *self = Session {
            id: nanoid!(12),
            ..Session::default()
        };
        info!(session = %self.id, "session started");
        self.enter(SessionState::Requesting);
        Ok(())
    }

    /// The environment granted access.
    pub fn grant(&mut self, capture: CaptureHandle) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Requesting {
            return Err(self.reject("grant"));
        }
        self.capture = Some(capture);
        self.enter(SessionState::Listening);
        Ok(())
    }

    /// The environment refused access or could not be opened.
    pub fn deny(&mut self, err: &OperatorError) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Requesting {
            return Err(self.reject("deny"));
        }
        self.last_error = Some(err.into());
        self.enter(SessionState::Error);
        Ok(())
    }

    pub fn submit_task(&mut self, input: &TaskInput) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Listening {
            return Err(self.reject("submit a task"));
        }
        if input.text().is_empty() {
            return Err(self.reject("submit an empty task"));
        }
        self.task = input.text().to_string();
        info!(session = %self.id, channel = input.channel(), task = %self.task, "task accepted");
        self.enter(SessionState::Processing);
        Ok(())
    }

    /// Records the oracle's decision. `done` finishes the session, anything
    /// else moves it to `guiding`.
    pub fn record_action(&mut self, action: Action) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Processing {
            return Err(self.reject("record an action"));
        }
        let next = if action.is_done() {
            SessionState::Finished
        } else {
            SessionState::Guiding
        };
        self.history.push(action.clone());
        self.last_action = Some(action);
        self.enter(next);
        Ok(())
    }

    /// Confirmation or auto-advance: go round the loop again.
    pub fn advance(&mut self) -> Result<(), InvalidTransition> {
        if self.state != SessionState::Guiding {
            return Err(self.reject("advance"));
        }
        self.enter(SessionState::Processing);
        Ok(())
    }

    /// Unrecoverable failure. Legal from any active state.
    pub fn fail(&mut self, err: &OperatorError) -> Result<(), InvalidTransition> {
        if !self.state.is_active() {
            return Err(self.reject("fail"));
        }
        warn!(session = %self.id, state = %self.state, kind = %err.kind(), error = %err, "session failed");
        self.last_error = Some(err.into());
        self.enter(SessionState::Error);
        Ok(())
    }

    /// Hands the capture handle over for release, leaving the session
    /// without one. Returns `None` if it was already taken.
    pub fn take_capture(&mut self) -> Option<CaptureHandle> {
        self.capture.take()
    }

    /// Returns the session to `idle`, clearing task and history. The capture
    /// handle, if still held, is returned so the caller can release it.
    pub fn stop(&mut self) -> Result<Option<CaptureHandle>, InvalidTransition> {
        if self.state == SessionState::Idle {
            return Err(self.reject("stop"));
        }
        let capture = self.capture.take();
        self.task.clear();
        self.history.clear();
        self.last_action = None;
        info!(session = %self.id, from = %self.state, "session stopped");
        self.enter(SessionState::Idle);
        Ok(capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Coordinates;
    use crate::error::OracleError;

    fn click() -> Action {
        Action::Click { thought: "c".into(), coordinates: Coordinates::new(1.0, 2.0) }
    }

    fn listening() -> Session {
        let mut s = Session::new();
        s.start().unwrap();
        s.grant(CaptureHandle::new()).unwrap();
        s
    }

    #[test]
    fn idle_only_accepts_start() {
        let mut s = Session::new();
        let task = TaskInput::Typed("t".into());
        assert!(s.grant(CaptureHandle::new()).is_err());
        assert!(s.submit_task(&task).is_err());
        assert!(s.record_action(click()).is_err());
        assert!(s.advance().is_err());
        assert!(s.fail(&OracleError::Transport("x".into()).into()).is_err());
        assert!(s.stop().is_err());
        assert_eq!(s.state(), SessionState::Idle);

        s.start().unwrap();
        assert_eq!(s.state(), SessionState::Requesting);
    }

    #[test]
    fn happy_path_reaches_finished() {
        let mut s = listening();
        s.submit_task(&TaskInput::Transcribed("  search for X ".into())).unwrap();
        assert_eq!(s.task(), "search for X");
        s.record_action(click()).unwrap();
        assert_eq!(s.state(), SessionState::Guiding);
        s.advance().unwrap();
        s.record_action(Action::Done { thought: "d".into(), summary: "ok".into() }).unwrap();
        assert_eq!(s.state(), SessionState::Finished);
        assert_eq!(s.history().len(), 2);
        assert!(s.history().last().unwrap().is_done());
    }

    #[test]
    fn invalid_event_leaves_state_untouched() {
        let mut s = listening();
        s.submit_task(&TaskInput::Typed("t".into())).unwrap();
        let err = s.submit_task(&TaskInput::Typed("again".into())).unwrap_err();
        assert_eq!(err.from, SessionState::Processing);
        assert_eq!(s.state(), SessionState::Processing);
        assert_eq!(s.task(), "t");
    }

    #[test]
    fn empty_task_is_rejected() {
        let mut s = listening();
        assert!(s.submit_task(&TaskInput::Typed("   ".into())).is_err());
        assert_eq!(s.state(), SessionState::Listening);
    }

    #[test]
    fn terminal_states_only_restart() {
        let mut s = listening();
        s.submit_task(&TaskInput::Typed("t".into())).unwrap();
        s.record_action(click()).unwrap();
        s.fail(&OracleError::Decode("bad".into()).into()).unwrap();
        assert_eq!(s.state(), SessionState::Error);

        assert!(s.advance().is_err());
        assert!(s.record_action(click()).is_err());
        assert!(s.fail(&OracleError::Decode("bad".into()).into()).is_err());
        assert_eq!(s.state(), SessionState::Error);
        assert_eq!(s.history().len(), 1);

        let old = s.id().to_string();
        s.start().unwrap();
        assert_ne!(s.id(), old);
        assert!(s.history().is_empty());
        assert!(s.last_error().is_none());
    }

    #[test]
    fn stop_clears_and_hands_back_capture() {
        let mut s = listening();
        s.submit_task(&TaskInput::Typed("t".into())).unwrap();
        s.record_action(click()).unwrap();

        let capture = s.stop().unwrap();
        assert!(capture.is_some());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.history().is_empty());
        assert!(s.task().is_empty());
        assert!(s.capture().is_none());
    }

    #[test]
    fn denied_permission_records_kind() {
        let mut s = Session::new();
        s.start().unwrap();
        let err = crate::error::EnvironmentError::PermissionDenied("declined".into()).into();
        s.deny(&err).unwrap();
        assert_eq!(s.state(), SessionState::Error);
        assert_eq!(
            s.last_error().unwrap().kind,
            crate::error::ErrorKind::PermissionDenied
        );
    }
}
