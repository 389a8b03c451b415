use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default pause for a `wait` action that does not declare its own duration.
pub const DEFAULT_WAIT_MS: u64 = 2000;

/// A point in the coordinate space of the most recently captured frame.
///
/// Whether the values are device pixels or fractions of the frame is fixed
/// per environment, see [`crate::environment::CoordinateSpace`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Signed wheel delta for a scroll of `magnitude` pixels in this direction.
    pub fn delta(self, magnitude: i32) -> i32 {
        match self {
            ScrollDirection::Down => magnitude.abs(),
            ScrollDirection::Up => -magnitude.abs(),
        }
    }
}

/// One discrete instruction chosen by the oracle.
///
/// The serialized shape is the one replayed to the oracle as history, so the
/// field names follow the oracle's response schema.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum Action {
    Click {
        thought: String,
        coordinates: Coordinates,
    },
    Type {
        thought: String,
        #[serde(rename = "text_to_type")]
        text: String,
    },
    Scroll {
        thought: String,
        coordinates: Coordinates,
        #[serde(rename = "scroll_direction")]
        direction: ScrollDirection,
    },
    Keypress {
        thought: String,
        key: String,
    },
    Wait {
        thought: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    Done {
        thought: String,
        summary: String,
    },
    /// An action kind the executor does not recognize. Only the attempted
    /// kind is kept, for diagnostics.
    Unknown {
        #[serde(rename = "attempted_action_type")]
        kind: String,
    },
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Keypress { .. } => "keypress",
            Action::Wait { .. } => "wait",
            Action::Done { .. } => "done",
            Action::Unknown { .. } => "unknown",
        }
    }

    pub fn thought(&self) -> Option<&str> {
        match self {
            Action::Click { thought, .. }
            | Action::Type { thought, .. }
            | Action::Scroll { thought, .. }
            | Action::Keypress { thought, .. }
            | Action::Wait { thought, .. }
            | Action::Done { thought, .. } => Some(thought),
            Action::Unknown { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Action::Unknown { .. })
    }

    /// Pause a `wait` action asks for, falling back to `default` when the
    /// oracle did not declare one. `None` for every other kind.
    pub fn wait_duration(&self, default: Duration) -> Option<Duration> {
        match self {
            Action::Wait { duration_ms, .. } => {
                Some(duration_ms.map(Duration::from_millis).unwrap_or(default))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { coordinates, .. } => {
                write!(f, "click({}, {})", coordinates.x, coordinates.y)
            }
            Action::Type { text, .. } => write!(f, "type({:?})", text),
            Action::Scroll { coordinates, direction, .. } => write!(
                f,
                "scroll({}, {}, {:?})",
                coordinates.x, coordinates.y, direction
            ),
            Action::Keypress { key, .. } => write!(f, "keypress({})", key),
            Action::Wait { duration_ms, .. } => match duration_ms {
                Some(ms) => write!(f, "wait({}ms)", ms),
                None => write!(f, "wait"),
            },
            Action::Done { summary, .. } => write!(f, "done({:?})", summary),
            Action::Unknown { kind } => write!(f, "unknown({})", kind),
        }
    }
}

/// Ordered, append-only record of the actions taken in one session.
///
/// It is handed to the oracle by shared reference on every cycle; only the
/// session that owns it can append or reset it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionHistory {
    actions: Vec<Action>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    /// Number of trailing `unknown` actions.
    pub fn trailing_unknown(&self) -> usize {
        self.actions.iter().rev().take_while(|a| a.is_unknown()).count()
    }

    pub(crate) fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub(crate) fn clear(&mut self) {
        self.actions.clear();
    }
}

impl<'a> IntoIterator for &'a ActionHistory {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
