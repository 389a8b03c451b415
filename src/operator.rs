//! Control loop: settle, capture, decide, record, act.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::{OperatingMode, OperatorConfig};
use crate::environment::{CaptureHandle, Environment};
use crate::error::{
    EnvironmentError, ErrorRecord, InvalidTransition, OperatorError, OracleError,
};
use crate::executor::ActionExecutor;
use crate::oracle::DecisionOracle;
use crate::session::{Session, SessionState, TaskInput};
use crate::sinks::{FrameStore, LogNarrator, Narrator};

/// Messages from the user side of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Submit(TaskInput),
    /// Go ahead with the next cycle in guided and advisory modes.
    Confirm,
}

/// The operator's end of the user controls.
pub struct SessionControls {
    cancel: CancellationToken,
    commands: mpsc::Receiver<Command>,
}

/// The user's end: submit tasks, confirm steps, stop the session.
#[derive(Clone)]
pub struct ControlHandle {
    cancel: CancellationToken,
    commands: mpsc::Sender<Command>,
}

/// A connected pair of controls for one session.
pub fn controls() -> (ControlHandle, SessionControls) {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(16);
    (
        ControlHandle { cancel: cancel.clone(), commands: tx },
        SessionControls { cancel, commands: rx },
    )
}

impl ControlHandle {
    /// Returns `false` if the operator side is gone.
    pub async fn submit(&self, task: TaskInput) -> bool {
        self.commands.send(Command::Submit(task)).await.is_ok()
    }

    pub async fn confirm(&self) -> bool {
        self.commands.send(Command::Confirm).await.is_ok()
    }

    /// Stops the session at the next suspension point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    UserStop,
    SurfaceEnded,
}

/// How a session run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Finished { summary: String },
    Failed(ErrorRecord),
    Stopped { reason: StopReason },
}

enum Cycle {
    Next,
    Done(String),
}

enum Interrupt {
    Stopped(StopReason),
    Failed(OperatorError),
}

impl From<OperatorError> for Interrupt {
    fn from(err: OperatorError) -> Self {
        Interrupt::Failed(err)
    }
}

struct Signals {
    cancel: CancellationToken,
    ended: CancellationToken,
}

impl Signals {
    fn check(&self) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            Some(StopReason::UserStop)
        } else if self.ended.is_cancelled() {
            Some(StopReason::SurfaceEnded)
        } else {
            None
        }
    }

    /// Runs `fut` unless a stop arrives first.
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Stopped(StopReason::UserStop)),
            _ = self.ended.cancelled() => Err(Interrupt::Stopped(StopReason::SurfaceEnded)),
            out = fut => Ok(out),
        }
    }
}

/// Drives one environment toward a task with decisions from one oracle.
pub struct Operator<E, O> {
    env: E,
    oracle: O,
    executor: ActionExecutor,
    cfg: OperatorConfig,
    narrator: Arc<dyn Narrator>,
    frames: Option<Arc<dyn FrameStore>>,
}

impl<E, O> Operator<E, O>
where
    E: Environment,
    O: DecisionOracle,
{
    pub fn new(env: E, oracle: O, cfg: OperatorConfig) -> Self {
        Self {
            env,
            oracle,
            executor: ActionExecutor::from_config(&cfg),
            cfg,
            narrator: Arc::new(LogNarrator),
            frames: None,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn with_frame_store(mut self, store: Arc<dyn FrameStore>) -> Self {
        self.frames = Some(store);
        self
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.cfg
    }

    /// Resets `session` and asks the environment for access. On success the
    /// session is `listening`; otherwise it is `error` and the cause is
    /// returned.
    pub async fn start(&self, session: &mut Session) -> Result<(), OperatorError> {
        if !session.state().is_active() {
            if let Some(stale) = session.take_capture() {
                self.release(&stale).await;
            }
        }
        session.start()?;
        match self.env.start_capture().await {
            Ok(handle) => {
                session.grant(handle)?;
                self.narrator
                    .announce("Operator mode activated. Awaiting your command.");
                Ok(())
            }
            Err(e) => {
                let err = OperatorError::from(e);
                session.deny(&err)?;
                Err(err)
            }
        }
    }

    /// Returns `session` to idle and releases its capture.
    pub async fn stop(&self, session: &mut Session) -> Result<(), InvalidTransition> {
        if let Some(handle) = session.stop()? {
            self.release(&handle).await;
        }
        Ok(())
    }

    /// Waits in `listening` for a task from `controls`, then runs it to a
    /// terminal state. A stop or the surface ending while waiting returns the
    /// session to idle.
    pub async fn serve(
        &self,
        session: &mut Session,
        controls: &mut SessionControls,
    ) -> Result<SessionOutcome, InvalidTransition> {
        if session.state() != SessionState::Listening {
            return Err(InvalidTransition { from: session.state(), event: "serve" });
        }
        let signals = self.signals(session, controls);
        loop {
            let command = match signals.guard(controls.commands.recv()).await {
                Ok(command) => command,
                Err(Interrupt::Stopped(reason)) => return self.halt(session, reason).await,
                Err(Interrupt::Failed(err)) => return self.fail(session, err).await,
            };
            match command {
                Some(Command::Submit(task)) => {
                    if session.submit_task(&task).is_ok() {
                        return self.drive(session, controls).await;
                    }
                }
                Some(Command::Confirm) => {
                    debug!(session = %session.id(), "confirmation while listening ignored");
                }
                None => return self.halt(session, StopReason::UserStop).await,
            }
        }
    }

    /// Submits `task` directly and runs the loop to a terminal state.
    pub async fn run_task(
        &self,
        session: &mut Session,
        task: TaskInput,
        controls: &mut SessionControls,
    ) -> Result<SessionOutcome, InvalidTransition> {
        session.submit_task(&task)?;
        self.drive(session, controls).await
    }

    fn signals(&self, session: &Session, controls: &SessionControls) -> Signals {
        let ended = match session.capture() {
            Some(handle) => handle.ended().clone(),
            None => CancellationToken::new(),
        };
        Signals { cancel: controls.cancel.clone(), ended }
    }

    async fn drive(
        &self,
        session: &mut Session,
        controls: &mut SessionControls,
    ) -> Result<SessionOutcome, InvalidTransition> {
        self.narrator.announce(&format!(
            "Understood. Your task is: {}. Starting analysis.",
            session.task()
        ));
        let capture = match session.capture() {
            Some(handle) => handle.clone(),
            None => {
                let err = EnvironmentError::CaptureUnavailable("session holds no capture".into());
                return self.fail(session, err.into()).await;
            }
        };
        let signals = self.signals(session, controls);
        let mut step: u32 = 0;

        loop {
            if let Err(Interrupt::Stopped(reason)) =
                signals.guard(sleep(self.cfg.settle_delay())).await
            {
                return self.halt(session, reason).await;
            }
            if let Some(reason) = signals.check() {
                return self.halt(session, reason).await;
            }
            if let Some(max) = self.cfg.max_steps {
                if step >= max {
                    return self.fail(session, OperatorError::StepLimitExceeded(max)).await;
                }
            }
            step += 1;

            match self.cycle(session, &capture, &signals, step).await {
                Ok(Cycle::Done(summary)) => return self.finish(session, summary).await,
                Ok(Cycle::Next) => {}
                Err(Interrupt::Stopped(reason)) => return self.halt(session, reason).await,
                Err(Interrupt::Failed(err)) => return self.fail(session, err).await,
            }

            if self.cfg.mode != OperatingMode::Autonomous {
                if let Err(reason) = self.await_confirmation(session, controls, &signals).await {
                    return self.halt(session, reason).await;
                }
            }
            session.advance()?;
        }
    }

    async fn cycle(
        &self,
        session: &mut Session,
        capture: &CaptureHandle,
        signals: &Signals,
        step: u32,
    ) -> Result<Cycle, Interrupt> {
        let frame = signals
            .guard(self.env.capture_frame(capture))
            .await?
            .map_err(OperatorError::from)?;
        debug!(session = %session.id(), step, width = frame.width, height = frame.height, "frame captured");
        if let Some(store) = &self.frames {
            match store.save(session.id(), step as usize, &frame).await {
                Ok(path) => debug!(path = %path.display(), "frame archived"),
                Err(e) => warn!(session = %session.id(), step, error = %e, "failed to archive frame"),
            }
        }

        let limit = self.cfg.oracle_timeout();
        let decision = signals
            .guard(timeout(
                limit,
                self.oracle.next_action(session.task(), session.history(), &frame),
            ))
            .await?;
        let action = match decision {
            Ok(result) => result.map_err(OperatorError::from)?,
            Err(_) => {
                return Err(OperatorError::from(OracleError::Transport(format!(
                    "no decision within {}ms",
                    limit.as_millis()
                )))
                .into())
            }
        };
        info!(session = %session.id(), step, action = %action, "decision received");

        session.record_action(action.clone()).map_err(OperatorError::from)?;
        match &action {
            Action::Done { .. } => {}
            other => {
                if let Some(thought) = other.thought() {
                    self.narrator.announce(thought);
                }
            }
        }

        if let Some(limit) = self.cfg.max_consecutive_unknown {
            let streak = session.history().trailing_unknown() as u32;
            if streak > limit {
                return Err(OperatorError::UnknownActionLimit(streak).into());
            }
        }

        // Already finished; a late stop must not reset it.
        if let Action::Done { summary, .. } = &action {
            return Ok(Cycle::Done(summary.clone()));
        }
        if self.cfg.mode == OperatingMode::Advisory {
            return Ok(Cycle::Next);
        }

        match signals.guard(self.executor.execute(&self.env, &action)).await? {
            Ok(exec) if !exec.continue_loop => Ok(Cycle::Done(exec.summary.unwrap_or_default())),
            Ok(_) => Ok(Cycle::Next),
            Err(failed) if self.cfg.execution_failure_is_fatal => {
                Err(OperatorError::from(failed).into())
            }
            Err(failed) => {
                warn!(session = %session.id(), step, error = %failed, "continuing after failed action");
                Ok(Cycle::Next)
            }
        }
    }

    async fn await_confirmation(
        &self,
        session: &Session,
        controls: &mut SessionControls,
        signals: &Signals,
    ) -> Result<(), StopReason> {
        debug!(session = %session.id(), state = %session.state(), "awaiting confirmation");
        loop {
            match signals.guard(controls.commands.recv()).await {
                Ok(Some(Command::Confirm)) => return Ok(()),
                Ok(Some(Command::Submit(_))) => {
                    warn!(session = %session.id(), state = %session.state(), "task submitted mid-session ignored");
                }
                Ok(None) => return Err(StopReason::UserStop),
                Err(Interrupt::Stopped(reason)) => return Err(reason),
                Err(Interrupt::Failed(_)) => return Err(StopReason::UserStop),
            }
        }
    }

    async fn finish(
        &self,
        session: &mut Session,
        summary: String,
    ) -> Result<SessionOutcome, InvalidTransition> {
        if let Some(handle) = session.take_capture() {
            self.release(&handle).await;
        }
        info!(session = %session.id(), steps = session.history().len(), summary = %summary, "session finished");
        self.narrator.announce(&summary);
        Ok(SessionOutcome::Finished { summary })
    }

    async fn fail(
        &self,
        session: &mut Session,
        err: OperatorError,
    ) -> Result<SessionOutcome, InvalidTransition> {
        session.fail(&err)?;
        if let Some(handle) = session.take_capture() {
            self.release(&handle).await;
        }
        let record = ErrorRecord::from(&err);
        Ok(SessionOutcome::Failed(record))
    }

    async fn halt(
        &self,
        session: &mut Session,
        reason: StopReason,
    ) -> Result<SessionOutcome, InvalidTransition> {
        info!(session = %session.id(), ?reason, "session halted");
        self.stop(session).await?;
        Ok(SessionOutcome::Stopped { reason })
    }

    async fn release(&self, handle: &CaptureHandle) {
        if let Err(e) = self.env.stop_capture(handle).await {
            warn!(capture = handle.id(), error = %e, "failed to release capture");
        }
    }
}
