//! Typed events parsed from logical frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error_handling::FrameError;
use crate::frame::{LogicalFrame, MarkerKind};

/// Lifecycle status carried by a tool event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Started,
    Completed,
    Error,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Started => "started",
            ToolStatus::Completed => "completed",
            ToolStatus::Error => "error",
        }
    }
}

/// Latest known state of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEventRecord {
    pub tool: String,
    pub status: ToolStatus,
    /// ISO-8601 emission time. Informational only; arrival order wins.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolEventRecord {
    pub fn new(tool: impl Into<String>, status: ToolStatus) -> Self {
        Self {
            tool: tool.into(),
            status,
            timestamp: String::new(),
            message: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Normalized result of parsing one [`LogicalFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    TextDelta(String),
    ReasoningDelta { text: String, replace: bool },
    ToolEvent(ToolEventRecord),
    Done { thread_id: Option<String> },
    Error { message: String },
    /// Full content so far; replaces accumulated text.
    ContentSnapshot { text: String, thread_id: Option<String> },
    Ignored,
}

impl ParsedEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParsedEvent::Done { .. } | ParsedEvent::Error { .. })
    }
}

/// Wire shape of a tool event payload.
#[derive(Debug, Deserialize)]
struct ToolEventPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    tool: String,
    status: ToolStatus,
    #[serde(default)]
    timestamp: String,
    message: Option<String>,
}

/// Parse a frame into an event. Never fails: malformed payloads are logged
/// and become [`ParsedEvent::Ignored`].
pub fn parse(frame: LogicalFrame) -> ParsedEvent {
    match frame {
        LogicalFrame::PlainText(text) => {
            if text.trim().is_empty() {
                ParsedEvent::Ignored
            } else {
                ParsedEvent::TextDelta(text)
            }
        }
        LogicalFrame::Marked {
            kind: MarkerKind::ToolEvent,
            payload,
        } => match parse_tool_event(&payload) {
            Ok(record) => ParsedEvent::ToolEvent(record),
            Err(e) => {
                warn!("Dropping malformed tool event: {} (payload: {:?})", e, payload);
                ParsedEvent::Ignored
            }
        },
        LogicalFrame::Marked {
            kind: MarkerKind::ReasoningReplace,
            payload,
        } => ParsedEvent::ReasoningDelta {
            text: payload,
            replace: true,
        },
        LogicalFrame::JsonEnvelope(value) => parse_envelope(&value),
    }
}

pub fn parse_tool_event(payload: &str) -> Result<ToolEventRecord, FrameError> {
    let wire: ToolEventPayload = serde_json::from_str(payload)?;
    if let Some(kind) = wire.kind.filter(|k| k != "tool_event") {
        return Err(FrameError::UnexpectedType(kind));
    }
    if wire.tool.trim().is_empty() {
        return Err(FrameError::EmptyToolName);
    }
    Ok(ToolEventRecord {
        tool: wire.tool,
        status: wire.status,
        timestamp: wire.timestamp,
        message: wire.message.filter(|m| !m.is_empty()),
    })
}

/// Envelope precedence: done, error, reasoning update, content snapshot.
fn parse_envelope(value: &Value) -> ParsedEvent {
    let kind = value.get("type").and_then(Value::as_str);

    if kind == Some("done") {
        return ParsedEvent::Done {
            thread_id: thread_id(value),
        };
    }

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return ParsedEvent::Error {
            message: error_message(error),
        };
    }

    if kind == Some("error") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("An error occurred during streaming");
        return ParsedEvent::Error {
            message: message.to_string(),
        };
    }

    if kind == Some("reasoning_update") {
        return match value.get("reasoning").and_then(Value::as_str) {
            Some(text) => ParsedEvent::ReasoningDelta {
                text: text.to_string(),
                replace: false,
            },
            None => {
                debug!("reasoning_update envelope without reasoning text");
                ParsedEvent::Ignored
            }
        };
    }

    if let Some(text) = snapshot_content(value) {
        return ParsedEvent::ContentSnapshot {
            text: text.to_string(),
            thread_id: thread_id(value),
        };
    }

    debug!("Ignoring unrecognized envelope: {}", value);
    ParsedEvent::Ignored
}

fn thread_id(value: &Value) -> Option<String> {
    value
        .get("thread_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// `choices[0].messages[*]` where `role == "assistant"`.
fn snapshot_content(value: &Value) -> Option<&str> {
    value
        .get("choices")?
        .as_array()?
        .first()?
        .get("messages")?
        .as_array()?
        .iter()
        .find(|message| message.get("role").and_then(Value::as_str) == Some("assistant"))?
        .get("content")?
        .as_str()
}
