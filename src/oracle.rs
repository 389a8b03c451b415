use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use tracing::debug;

use crate::action::{Action, ActionHistory, Coordinates, ScrollDirection};
use crate::environment::Frame;
use crate::error::OracleError;

/// Chooses the single next action from the task, what has been done so far
/// and what the surface looks like now.
///
/// Implementations issue exactly one request per call, never retry on their
/// own, and only read `history`.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn next_action(
        &self,
        task: &str,
        history: &ActionHistory,
        frame: &Frame,
    ) -> Result<Action, OracleError>;
}

#[async_trait]
impl<O: DecisionOracle + ?Sized> DecisionOracle for Arc<O> {
    async fn next_action(
        &self,
        task: &str,
        history: &ActionHistory,
        frame: &Frame,
    ) -> Result<Action, OracleError> {
        (**self).next_action(task, history, frame).await
    }
}

#[derive(Clone)]
pub struct OracleConfig {
    pub api_base: String, // e.g. "https://generativelanguage.googleapis.com/v1beta"
    pub api_key: String,  // env GEMINI_API_KEY
    pub model: String,    // e.g. "gemini-2.5-flash"
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_base: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into()),
            temperature: 0.2,
        }
    }
}

/// Oracle backed by a hosted multimodal model's `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiOracle {
    http: Client,
    cfg: OracleConfig,
}

impl GeminiOracle {
    pub fn new(cfg: OracleConfig) -> Result<Self, OracleError> {
        if cfg.api_key.is_empty() {
            return Err(OracleError::Unavailable("GEMINI_API_KEY missing".into()));
        }
        Ok(Self {
            http: Client::new(),
            cfg,
        })
    }

    fn compose_prompt(task: &str, history: &ActionHistory) -> Result<String, OracleError> {
        let history = if history.is_empty() {
            "None".to_string()
        } else {
            serde_json::to_string(history)
                .map_err(|e| OracleError::Transport(format!("failed to encode history: {e}")))?
        };
        Ok(format!(
            "You are an expert computer-using agent. You will be given a screenshot of the screen and a goal.\n\
             Determine the very next, single, atomic action to take to progress toward the goal.\n\
             Respond ONLY with a JSON object matching the provided schema.\n\
             Keep actions simple: one click, one short phrase, one key. Use `done` with a summary once the goal is met.\n\
             The goal is: \"{task}\".\n\
             The history of actions taken so far is: {history}.\n\
             Analyze the screenshot and determine the next best action."
        ))
    }

    fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "thought": { "type": "STRING", "description": "Reasoning for the action, addressed to the user." },
                "action_type": { "type": "STRING", "description": "One of: click, type, scroll, keypress, wait, done." },
                "coordinates": {
                    "type": "OBJECT",
                    "description": "Target point in the screenshot. Required for click and scroll.",
                    "properties": { "x": { "type": "NUMBER" }, "y": { "type": "NUMBER" } },
                    "required": ["x", "y"]
                },
                "text_to_type": { "type": "STRING", "description": "Text to type. Required for type." },
                "scroll_direction": { "type": "STRING", "description": "up or down. Required for scroll." },
                "key": { "type": "STRING", "description": "Key name such as Enter. Required for keypress." },
                "duration_ms": { "type": "NUMBER", "description": "Optional pause length for wait." },
                "summary": { "type": "STRING", "description": "Summary of the completed task. Required for done." }
            },
            "required": ["thought", "action_type"]
        })
    }

    pub(crate) fn build_request(
        &self,
        task: &str,
        history: &ActionHistory,
        frame: &Frame,
    ) -> Result<Value, OracleError> {
        if task.trim().is_empty() {
            return Err(OracleError::Unavailable("no task to decide on".into()));
        }
        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": Self::compose_prompt(task, history)? },
                    { "inline_data": { "mime_type": frame.mime_type, "data": STANDARD.encode(&frame.bytes) } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": Self::response_schema(),
                "temperature": self.cfg.temperature
            }
        }))
    }

    /// Pulls the model's JSON answer out of a `generateContent` response.
    pub(crate) fn parse_response(v: &Value) -> Result<Action, OracleError> {
        let text = v
            .pointer("/candidates/0/content/parts")
            .and_then(|x| x.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                let reason = v
                    .pointer("/candidates/0/finishReason")
                    .or_else(|| v.pointer("/promptFeedback/blockReason"))
                    .and_then(|x| x.as_str())
                    .unwrap_or("no candidates");
                OracleError::Decode(format!("response carried no text ({reason})"))
            })?;
        let body: Value = serde_json::from_str(strip_fences(&text))
            .map_err(|e| OracleError::Decode(format!("response is not JSON: {e}")))?;
        decode_action(&body)
    }
}

#[async_trait]
impl DecisionOracle for GeminiOracle {
    async fn next_action(
        &self,
        task: &str,
        history: &ActionHistory,
        frame: &Frame,
    ) -> Result<Action, OracleError> {
        let url = format!("{}/models/{}:generateContent", self.cfg.api_base, self.cfg.model);
        let req = self.build_request(task, history, frame)?;
        debug!(history = history.len(), bytes = frame.bytes.len(), "querying oracle");

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.cfg.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(OracleError::Transport(format!("oracle error {}: {}", status, text)));
        }
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| OracleError::Decode(format!("failed to parse response JSON: {e}")))?;
        Self::parse_response(&v)
    }
}

fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .unwrap_or(t);
    t.strip_suffix("```").unwrap_or(t).trim()
}

fn required_str<'a>(v: &'a Value, field: &str, kind: &str) -> Result<&'a str, OracleError> {
    v.get(field)
        .and_then(|x| x.as_str())
        .ok_or_else(|| OracleError::Decode(format!("`{kind}` action is missing `{field}`")))
}

fn coordinates(v: &Value, kind: &str) -> Result<Coordinates, OracleError> {
    // Some responses put x/y at the top level instead of under `coordinates`.
    let point = match v.get("coordinates") {
        Some(c) => c,
        None if v.get("x").is_some() || v.get("y").is_some() => v,
        None => {
            return Err(OracleError::Decode(format!(
                "`{kind}` action is missing `coordinates`"
            )))
        }
    };
    let x = point.get("x").and_then(|x| x.as_f64());
    let y = point.get("y").and_then(|y| y.as_f64());
    match (x, y) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Coordinates { x, y }),
        _ => Err(OracleError::Decode(format!("`{kind}` action has malformed coordinates"))),
    }
}

/// Decodes one action object in the oracle's response schema.
///
/// An unrecognized `action_type` is not an error; it becomes
/// [`Action::Unknown`] so the loop can skip it.
pub fn decode_action(v: &Value) -> Result<Action, OracleError> {
    if !v.is_object() {
        return Err(OracleError::Decode("action is not an object".into()));
    }
    let kind = v
        .get("action_type")
        .or_else(|| v.get("type"))
        .and_then(|x| x.as_str())
        .ok_or_else(|| OracleError::Decode("missing `action_type`".into()))?
        .trim()
        .to_ascii_lowercase();

    let thought = || required_str(v, "thought", &kind).map(str::to_string);

    let action = match kind.as_str() {
        "click" => Action::Click {
            thought: thought()?,
            coordinates: coordinates(v, &kind)?,
        },
        "type" => {
            let text = required_str(v, "text_to_type", &kind)
                .or_else(|_| required_str(v, "text", &kind))?;
            if text.chars().any(char::is_control) {
                return Err(OracleError::Decode(
                    "`type` text contains control characters".into(),
                ));
            }
            Action::Type {
                thought: thought()?,
                text: text.to_string(),
            }
        }
        "scroll" => {
            let direction = match required_str(v, "scroll_direction", &kind)
                .or_else(|_| required_str(v, "direction", &kind))?
                .to_ascii_lowercase()
                .as_str()
            {
                "up" => ScrollDirection::Up,
                "down" => ScrollDirection::Down,
                other => {
                    return Err(OracleError::Decode(format!(
                        "unsupported scroll direction `{other}`"
                    )))
                }
            };
            Action::Scroll {
                thought: thought()?,
                coordinates: coordinates(v, &kind)?,
                direction,
            }
        }
        "keypress" | "key" => {
            let key = required_str(v, "key", &kind)?;
            if key.trim().is_empty() {
                return Err(OracleError::Decode("`keypress` action has an empty key".into()));
            }
            Action::Keypress {
                thought: thought()?,
                key: key.to_string(),
            }
        }
        "wait" => Action::Wait {
            thought: thought()?,
            duration_ms: v.get("duration_ms").and_then(|x| x.as_f64()).and_then(|ms| {
                (ms.is_finite() && ms >= 0.0).then_some(ms as u64)
            }),
        },
        "done" => Action::Done {
            thought: thought()?,
            summary: v
                .get("summary")
                .and_then(|x| x.as_str())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("Task completed.")
                .to_string(),
        },
        _ => Action::Unknown { kind: kind.clone() },
    };
    Ok(action)
}
