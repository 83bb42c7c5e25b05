use crate::protocol::{DecodeError, RequestId, TaskStatus};
use crate::request::{GenerationRequest, ParameterName};

use super::state::{InputMode, Phase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Aborted,
    Error(Option<String>),
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Aborted,
    Failed(Option<String>),
    ConnectionLost,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Aborted => "aborted",
            Self::Failed(_) => "error",
            Self::ConnectionLost => "connection_lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Busy(Phase),
    Disconnected,
    NotCancellable(Phase),
}

/// Presentation instructions for whatever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewIntent {
    SetInput(InputMode),
    ShowUserMessage {
        prompt: String,
        system_prompt: Option<String>,
        has_image: bool,
    },
    AppendText(String),
    ShowQueuePosition(Option<u32>),
    ShowBanner(Banner),
    GenerationEnded(Outcome),
    Rejected(RejectReason),
    ConnectionChanged(bool),
    // Emitted by the driver rather than the machine.
    Notice(String),
    Parameters(Vec<(ParameterName, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NoActiveRequest,
    ForeignTaskId { expected: RequestId, got: RequestId },
    RetiredTaskId(RequestId),
    MissingTaskId,
    Duplicate(TaskStatus),
    Malformed(DecodeError),
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoActiveRequest => "no_active_request",
            Self::ForeignTaskId { .. } => "foreign_task_id",
            Self::RetiredTaskId(_) => "retired_task_id",
            Self::MissingTaskId => "missing_task_id",
            Self::Duplicate(_) => "duplicate",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Everything a transition asks the outside world to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    View(ViewIntent),
    Transmit(GenerationRequest),
    SendCancel(RequestId),
    Bound(RequestId),
    Dropped(DropReason),
}
