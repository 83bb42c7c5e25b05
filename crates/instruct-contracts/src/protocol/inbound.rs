use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use super::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Starting,
    Running,
    Waiting,
    Finished,
    Aborted,
    Error,
}

impl TaskStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "finished" => Some(Self::Finished),
            // Older pages spelled it "abort".
            "aborted" | "abort" => Some(Self::Aborted),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Starting,
    Running { tokens: String },
    Waiting { queue_pos: Option<u32> },
    Finished,
    Aborted,
    Error { message: Option<String> },
}

impl EventKind {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Starting => TaskStatus::Starting,
            Self::Running { .. } => TaskStatus::Running,
            Self::Waiting { .. } => TaskStatus::Waiting,
            Self::Finished => TaskStatus::Finished,
            Self::Aborted => TaskStatus::Aborted,
            Self::Error { .. } => TaskStatus::Error,
        }
    }
}

/// One decoded status frame pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub task_id: Option<RequestId>,
    pub kind: EventKind,
}

impl ServerEvent {
    pub fn new(task_id: Option<&str>, kind: EventKind) -> Self {
        Self {
            task_id: task_id.map(RequestId::new),
            kind,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.kind.status()
    }

    /// Binary frames must still be UTF-8 JSON; nothing is decoded lossily.
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, DecodeError> {
        let text =
            std::str::from_utf8(raw).map_err(|err| DecodeError::InvalidUtf8(err.to_string()))?;
        Self::decode(text)
    }

    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let frame: RawFrame =
            serde_json::from_str(raw).map_err(|err| DecodeError::Json(err.to_string()))?;
        let Some(label) = frame.status else {
            return Err(DecodeError::MissingStatus);
        };
        let Some(status) = TaskStatus::parse(label.trim()) else {
            return Err(DecodeError::UnknownStatus(label));
        };

        let kind = match status {
            TaskStatus::Starting => EventKind::Starting,
            TaskStatus::Running => {
                let tokens = frame
                    .tokens
                    .as_ref()
                    .and_then(Value::as_str)
                    .ok_or(DecodeError::MissingField {
                        status,
                        field: "tokens",
                    })?;
                EventKind::Running {
                    tokens: tokens.to_string(),
                }
            }
            TaskStatus::Waiting => EventKind::Waiting {
                queue_pos: frame.queue_pos.as_ref().and_then(value_to_queue_pos),
            },
            TaskStatus::Finished => EventKind::Finished,
            TaskStatus::Aborted => EventKind::Aborted,
            TaskStatus::Error => EventKind::Error {
                message: frame
                    .message
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
            },
        };

        Ok(Self {
            task_id: frame.task_id.as_ref().and_then(value_to_task_id),
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    status: Option<String>,
    task_id: Option<Value>,
    tokens: Option<Value>,
    queue_pos: Option<Value>,
    message: Option<Value>,
}

fn value_to_task_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(RequestId::new(text.trim())),
        Value::Number(number) => Some(RequestId::new(number.to_string())),
        _ => None,
    }
}

fn value_to_queue_pos(value: &Value) -> Option<u32> {
    if let Some(number) = value.as_u64() {
        return u32::try_from(number).ok();
    }
    value
        .as_str()
        .and_then(|text| text.trim().parse::<u32>().ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    InvalidUtf8(String),
    Json(String),
    MissingStatus,
    UnknownStatus(String),
    MissingField {
        status: TaskStatus,
        field: &'static str,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8(err) => write!(f, "frame is not valid UTF-8: {err}"),
            Self::Json(err) => write!(f, "frame is not a JSON object: {err}"),
            Self::MissingStatus => f.write_str("frame has no status"),
            Self::UnknownStatus(label) => write!(f, "unknown status '{label}'"),
            Self::MissingField { status, field } => {
                write!(f, "'{}' frame is missing '{field}'", status.as_str())
            }
        }
    }
}

impl std::error::Error for DecodeError {}
