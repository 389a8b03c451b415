pub mod action;
pub mod browser;
pub mod config;
pub mod environment;
pub mod error;
pub mod executor;
pub mod operator;
pub mod oracle;
pub mod session;
pub mod sinks;

pub use action::{Action, ActionHistory, Coordinates, ScrollDirection};
pub use browser::{BrowserConfig, ChromiumEnvironment, DomConfig, DomEnvironment};
pub use config::{OperatingMode, OperatorConfig};
pub use environment::{CaptureHandle, CoordinateSpace, Environment, Frame};
pub use error::{ErrorKind, ErrorRecord, OperatorError};
pub use executor::{ActionExecutor, Execution};
pub use operator::{controls, ControlHandle, Operator, SessionControls, SessionOutcome, StopReason};
pub use oracle::{DecisionOracle, GeminiOracle, OracleConfig};
pub use session::{Session, SessionState, TaskInput};
