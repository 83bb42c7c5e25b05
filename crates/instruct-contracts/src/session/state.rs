use crate::protocol::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    Queued,
    Streaming,
    Aborting,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Queued => "queued",
            Self::Streaming => "streaming",
            Self::Aborting => "aborting",
        }
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Queued | Self::Streaming | Self::Aborting)
    }
}

/// What the single input control offers. Derived from the session, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Submit,
    /// Waiting for the server to accept the request.
    Disabled,
    Cancel,
    /// A cancel was sent. The control is re-enabled at once and resends it;
    /// it never waits on the cancel call's response.
    RetryCancel,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRequest {
    pub id: RequestId,
    /// False while `id` is still the client-minted provisional id.
    pub bound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub(super) phase: Phase,
    pub(super) active: Option<ActiveRequest>,
    pub(super) accumulated: Vec<String>,
    pub(super) queue_position: Option<u32>,
    pub(super) connected: bool,
}

impl SessionState {
    pub(super) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            active: None,
            accumulated: Vec::new(),
            queue_position: None,
            connected: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active_request(&self) -> Option<&ActiveRequest> {
        self.active.as_ref()
    }

    pub fn active_request_id(&self) -> Option<&RequestId> {
        self.active.as_ref().map(|active| &active.id)
    }

    pub fn fragments(&self) -> &[String] {
        &self.accumulated
    }

    pub fn accumulated_text(&self) -> String {
        self.accumulated.concat()
    }

    pub fn queue_position(&self) -> Option<u32> {
        self.queue_position
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn input_mode(&self) -> InputMode {
        if !self.connected {
            return InputMode::Offline;
        }
        match self.phase {
            Phase::Idle => InputMode::Submit,
            Phase::Submitting => InputMode::Disabled,
            Phase::Queued | Phase::Streaming => InputMode::Cancel,
            Phase::Aborting => InputMode::RetryCancel,
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.active.is_some() != (self.phase != Phase::Idle) {
            return Err(format!(
                "active request presence disagrees with phase {}",
                self.phase.as_str()
            ));
        }
        if self.queue_position.is_some() && self.phase != Phase::Queued {
            return Err(format!(
                "queue position set outside queued phase ({})",
                self.phase.as_str()
            ));
        }
        if self.phase == Phase::Idle && !self.accumulated.is_empty() {
            return Err("idle session still holds streamed text".to_string());
        }
        if !self.connected && self.phase != Phase::Idle {
            return Err("disconnected session has an active request".to_string());
        }
        Ok(())
    }
}
