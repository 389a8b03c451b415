#![allow(dead_code)]

use async_trait::async_trait;
use cua_operator::action::{Action, ActionHistory, Coordinates};
use cua_operator::environment::{CaptureHandle, CoordinateSpace, Environment, Frame};
use cua_operator::error::{EnvironmentError, OracleError};
use cua_operator::operator::ControlHandle;
use cua_operator::oracle::DecisionOracle;
use cua_operator::sinks::Narrator;
use cua_operator::OperatorConfig;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Click(f64, f64),
    Move(f64, f64),
    Scroll(f64, f64, i32),
    Type(String),
    Key(String),
    Wait(Duration),
}

/// In-memory surface that records every primitive it is asked to perform.
#[derive(Default)]
pub struct RecordingEnvironment {
    pub calls: Mutex<Vec<Call>>,
    pub captures: Mutex<Vec<CaptureHandle>>,
    pub frames_taken: Mutex<usize>,
    pub stop_calls: Mutex<usize>,
    pub releases: Mutex<usize>,
    pub deny_capture: Option<EnvironmentError>,
    pub reject_typing: bool,
    /// Notified after every input primitive.
    pub acted: Notify,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> usize {
        *self.stop_calls.lock().unwrap()
    }

    pub fn releases(&self) -> usize {
        *self.releases.lock().unwrap()
    }

    pub fn frames_taken(&self) -> usize {
        *self.frames_taken.lock().unwrap()
    }

    pub fn last_capture(&self) -> Option<CaptureHandle> {
        self.captures.lock().unwrap().last().cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        self.acted.notify_one();
    }
}

#[async_trait]
impl Environment for RecordingEnvironment {
    fn coordinate_space(&self) -> CoordinateSpace {
        CoordinateSpace::Pixels
    }

    async fn start_capture(&self) -> Result<CaptureHandle, EnvironmentError> {
        if let Some(err) = &self.deny_capture {
            return Err(err.clone());
        }
        let handle = CaptureHandle::new();
        self.captures.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    async fn capture_frame(&self, handle: &CaptureHandle) -> Result<Frame, EnvironmentError> {
        handle.ensure_live()?;
        *self.frames_taken.lock().unwrap() += 1;
        Ok(Frame {
            bytes: vec![0x89, b'P', b'N', b'G'],
            width: 1280,
            height: 800,
            mime_type: "image/png".into(),
            capture_id: handle.id().to_string(),
        })
    }

    async fn pointer_click(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        self.record(Call::Click(at.x, at.y));
        Ok(())
    }

    async fn pointer_move(&self, at: Coordinates) -> Result<(), EnvironmentError> {
        self.record(Call::Move(at.x, at.y));
        Ok(())
    }

    async fn pointer_scroll(&self, at: Coordinates, delta_y: i32) -> Result<(), EnvironmentError> {
        self.record(Call::Scroll(at.x, at.y, delta_y));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), EnvironmentError> {
        if self.reject_typing {
            return Err(EnvironmentError::InputRejected("nothing focused".into()));
        }
        self.record(Call::Type(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, name: &str) -> Result<(), EnvironmentError> {
        self.record(Call::Key(name.to_string()));
        Ok(())
    }

    async fn wait(&self, duration: Duration) -> Result<(), EnvironmentError> {
        self.record(Call::Wait(duration));
        Ok(())
    }

    async fn stop_capture(&self, handle: &CaptureHandle) -> Result<(), EnvironmentError> {
        *self.stop_calls.lock().unwrap() += 1;
        if handle.release() {
            *self.releases.lock().unwrap() += 1;
        }
        Ok(())
    }
}

/// What the oracle was shown on one call.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub task: String,
    pub history: Vec<Action>,
}

/// Oracle that replays a fixed script of decisions.
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Action, OracleError>>>,
    /// Replayed once the script runs dry.
    repeat: Option<Action>,
    delay: Option<Duration>,
    /// Stopped right as each decision is handed back.
    pub stop_on_answer: Option<ControlHandle>,
    pub queries: Mutex<Vec<Query>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<Action, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn actions(actions: Vec<Action>) -> Self {
        Self::new(actions.into_iter().map(Ok).collect())
    }

    pub fn repeating(action: Action) -> Self {
        Self {
            repeat: Some(action),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration, action: Action) -> Self {
        Self {
            repeat: Some(action),
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn stopping(mut self, handle: ControlHandle) -> Self {
        self.stop_on_answer = Some(handle);
        self
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn next_action(
        &self,
        task: &str,
        history: &ActionHistory,
        _frame: &cua_operator::Frame,
    ) -> Result<Action, OracleError> {
        self.queries.lock().unwrap().push(Query {
            task: task.to_string(),
            history: history.as_slice().to_vec(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(handle) = &self.stop_on_answer {
            handle.stop();
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(decision) => decision,
            None => match &self.repeat {
                Some(action) => Ok(action.clone()),
                None => Err(OracleError::Transport("script exhausted".into())),
            },
        }
    }
}

/// Keeps every announcement in order.
#[derive(Default)]
pub struct RecordingNarrator {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingNarrator {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Narrator for RecordingNarrator {
    fn announce(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

pub fn fast_config() -> OperatorConfig {
    OperatorConfig {
        settle_delay_ms: 0,
        ..OperatorConfig::default()
    }
}

pub fn click(x: f64, y: f64) -> Action {
    Action::Click {
        thought: "click the target".into(),
        coordinates: Coordinates::new(x, y),
    }
}

pub fn type_text(text: &str) -> Action {
    Action::Type {
        thought: "type the query".into(),
        text: text.into(),
    }
}

pub fn keypress(key: &str) -> Action {
    Action::Keypress {
        thought: "submit".into(),
        key: key.into(),
    }
}

pub fn done(summary: &str) -> Action {
    Action::Done {
        thought: "finished".into(),
        summary: summary.into(),
    }
}

pub fn unknown(kind: &str) -> Action {
    Action::Unknown { kind: kind.into() }
}
