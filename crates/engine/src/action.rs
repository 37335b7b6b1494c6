//! Action-protocol parser for tool-calling completions.
//!
//! A completion is scanned line-by-line for the protocol markers:
//!
//! ```text
//! Thought: <free text, optional>
//! Action: {"tool": "<name>", "input": <json>}
//! Output: <terminal answer, toolkit steps only>
//! ```
//!
//! If several `Action:` lines appear in one completion, only the last is
//! honored (models sometimes echo earlier turns). The canonical action
//! dialect is `{tool, input}`; the historical `{tool, action, value}`
//! dialect is accepted as a legacy fallback.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

/// Tool name that terminates the loop successfully.
pub const EXIT_TOOL: &str = "exit";

/// Tool name recorded on substeps created by the self-correction path.
pub const ERROR_TOOL: &str = "error";

static THOUGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Thought:\s*(.*)$").expect("static pattern"));
static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Action:\s*(\{.*\})\s*$").expect("static pattern"));

/// The protocol markers found in one completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCompletion {
    /// The last `Thought:` line, if any
    pub thought: Option<String>,

    /// The JSON payload of the last `Action:` line, unparsed
    pub action_json: Option<String>,

    /// Everything after the first `Output:` marker, if any
    pub output: Option<String>,
}

/// A parsed action: which tool to run with what input.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub tool: String,
    pub input: Value,
}

/// Why an action payload could not be parsed.
#[derive(Debug, Clone, Error)]
pub enum ActionParseError {
    #[error("malformed action JSON: {0}")]
    Json(String),

    #[error("action is not a JSON object")]
    NotAnObject,

    #[error("action object has no 'tool' field")]
    MissingTool,
}

/// Scan a completion for protocol markers.
pub fn parse_completion(text: &str) -> ParsedCompletion {
    let mut thought = None;
    let mut action_json = None;

    for line in text.lines() {
        if let Some(caps) = THOUGHT_RE.captures(line) {
            thought = Some(caps[1].trim_end().to_string());
        }
        if let Some(caps) = ACTION_RE.captures(line) {
            action_json = Some(caps[1].to_string());
        }
    }

    ParsedCompletion {
        thought,
        action_json,
        output: parse_output(text),
    }
}

/// Capture everything after the first `Output:` marker, spanning lines.
fn parse_output(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("Output:") {
            let mut out = rest.strip_prefix(' ').unwrap_or(rest).to_string();
            for tail in &lines[i + 1..] {
                out.push('\n');
                out.push_str(tail);
            }
            return Some(out);
        }
    }
    None
}

/// Parse an action JSON payload in either dialect.
///
/// Canonical: `{"tool": <name>, "input": <json>}`. Legacy fallback:
/// `{"tool": <name>, "action": <op>, "value": <json>}`, folded into an
/// input of `{"action": <op>, "value": <json>}` (or the bare value when
/// no operation is named). A bare `{"tool": <name>}` yields null input.
pub fn parse_action(raw: &str) -> Result<Action, ActionParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ActionParseError::Json(e.to_string()))?;
    let object = value.as_object().ok_or(ActionParseError::NotAnObject)?;

    let tool = object
        .get("tool")
        .and_then(|v| v.as_str())
        .ok_or(ActionParseError::MissingTool)?
        .to_string();

    if let Some(input) = object.get("input") {
        return Ok(Action {
            tool,
            input: input.clone(),
        });
    }

    if object.contains_key("action") || object.contains_key("value") {
        let operation = object.get("action").cloned().unwrap_or(Value::Null);
        let payload = object.get("value").cloned().unwrap_or(Value::Null);
        let input = match operation {
            Value::Null => payload,
            op => serde_json::json!({ "action": op, "value": payload }),
        };
        return Ok(Action { tool, input });
    }

    Ok(Action {
        tool,
        input: Value::Null,
    })
}
