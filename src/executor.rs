use std::time::Duration;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::OperatorConfig;
use crate::environment::Environment;
use crate::error::{EnvironmentError, ExecutionFailed};

/// What executing one action means for the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    /// `false` only after a `done` action.
    pub continue_loop: bool,
    /// Completion message of a `done` action.
    pub summary: Option<String>,
}

impl Execution {
    fn proceed() -> Self {
        Self { continue_loop: true, summary: None }
    }
}

/// Resolves typed actions into environment primitives.
#[derive(Clone, Debug)]
pub struct ActionExecutor {
    scroll_delta: i32,
    default_wait: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::from_config(&OperatorConfig::default())
    }
}

impl ActionExecutor {
    pub fn new(scroll_delta: i32, default_wait: Duration) -> Self {
        Self { scroll_delta, default_wait }
    }

    pub fn from_config(cfg: &OperatorConfig) -> Self {
        Self::new(cfg.scroll_delta, cfg.default_wait())
    }

    /// Runs `action` against `env`.
    ///
    /// Environment failures come back as [`ExecutionFailed`] carrying the
    /// original cause; whether that ends the session is the caller's call.
    pub async fn execute<E>(&self, env: &E, action: &Action) -> Result<Execution, ExecutionFailed>
    where
        E: Environment + ?Sized,
    {
        debug!(action = %action, "executing");
        self.dispatch(env, action).await.map_err(|source| {
            warn!(action = action.kind(), error = %source, "action failed");
            ExecutionFailed {
                action: action.kind().to_string(),
                source,
            }
        })
    }

    async fn dispatch<E>(&self, env: &E, action: &Action) -> Result<Execution, EnvironmentError>
    where
        E: Environment + ?Sized,
    {
        match action {
            Action::Click { coordinates, .. } => {
                env.pointer_click(*coordinates).await?;
            }
            Action::Type { text, .. } => {
                env.type_text(text).await?;
            }
            Action::Scroll { coordinates, direction, .. } => {
                env.pointer_move(*coordinates).await?;
                env.pointer_scroll(*coordinates, direction.delta(self.scroll_delta))
                    .await?;
            }
            Action::Keypress { key, .. } => {
                env.press_key(key).await?;
            }
            Action::Wait { .. } => {
                let pause = action.wait_duration(self.default_wait).unwrap_or(self.default_wait);
                env.wait(pause).await?;
            }
            Action::Done { summary, .. } => {
                info!(summary = %summary, "task reported done");
                return Ok(Execution {
                    continue_loop: false,
                    summary: Some(summary.clone()),
                });
            }
            Action::Unknown { kind } => {
                warn!(kind = %kind, "skipping unrecognized action");
            }
        }
        Ok(Execution::proceed())
    }
}
