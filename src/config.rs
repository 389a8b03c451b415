use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::action::DEFAULT_WAIT_MS;

/// How the loop proceeds once an action has been produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Execute the action and start the next cycle straight away.
    #[default]
    Autonomous,
    /// Execute the action, then wait for an explicit confirmation.
    Guided,
    /// Announce the action for a human to perform; nothing is executed.
    Advisory,
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autonomous" | "auto" => Ok(OperatingMode::Autonomous),
            "guided" => Ok(OperatingMode::Guided),
            "advisory" => Ok(OperatingMode::Advisory),
            other => Err(format!("unknown operating mode `{other}`")),
        }
    }
}

/// Settings for the control loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub mode: OperatingMode,

    /// Pause before each capture so the surface can settle.
    /// Default: 1000
    pub settle_delay_ms: u64,

    /// Upper bound on one oracle call; expiry counts as a transport error.
    /// Default: 60000
    pub oracle_timeout_ms: u64,

    /// Cycles allowed before the session fails. `None` means unbounded.
    /// Default: 50
    pub max_steps: Option<u32>,

    /// Consecutive unrecognized actions tolerated. `None` disables the check.
    /// Default: 5
    pub max_consecutive_unknown: Option<u32>,

    /// Whether a failed environment primitive ends the session.
    /// Default: true
    pub execution_failure_is_fatal: bool,

    /// Wheel delta for one scroll action, sign set by direction.
    /// Default: 100
    pub scroll_delta: i32,

    /// Pause for `wait` actions that do not declare a duration.
    /// Default: 2000
    pub default_wait_ms: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Autonomous,
            settle_delay_ms: 1000,
            oracle_timeout_ms: 60_000,
            max_steps: Some(50),
            max_consecutive_unknown: Some(5),
            execution_failure_is_fatal: true,
            scroll_delta: 100,
            default_wait_ms: DEFAULT_WAIT_MS,
        }
    }
}

impl OperatorConfig {
    /// Defaults overridden by `OPERATOR_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(mode) = env_parse::<OperatingMode>("OPERATOR_MODE") {
            cfg.mode = mode;
        }
        if let Some(ms) = env_parse("OPERATOR_SETTLE_MS") {
            cfg.settle_delay_ms = ms;
        }
        if let Some(ms) = env_parse("OPERATOR_ORACLE_TIMEOUT_MS") {
            cfg.oracle_timeout_ms = ms;
        }
        if let Some(steps) = env_parse::<u32>("OPERATOR_MAX_STEPS") {
            cfg.max_steps = (steps > 0).then_some(steps);
        }
        cfg
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring invalid setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_loop_timings() {
        let cfg = OperatorConfig::default();
        assert_eq!(cfg.settle_delay(), Duration::from_millis(1000));
        assert_eq!(cfg.default_wait(), Duration::from_millis(2000));
        assert_eq!(cfg.scroll_delta, 100);
        assert!(cfg.execution_failure_is_fatal);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let cfg: OperatorConfig =
            serde_json::from_str(r#"{ "mode": "guided", "max_steps": null }"#).unwrap();
        assert_eq!(cfg.mode, OperatingMode::Guided);
        assert_eq!(cfg.max_steps, None);
        assert_eq!(cfg.oracle_timeout_ms, 60_000);
    }

    #[test]
    fn mode_parses_loosely() {
        assert_eq!("Advisory".parse::<OperatingMode>(), Ok(OperatingMode::Advisory));
        assert_eq!(" auto ".parse::<OperatingMode>(), Ok(OperatingMode::Autonomous));
        assert!("pilot".parse::<OperatingMode>().is_err());
    }
}
