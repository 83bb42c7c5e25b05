use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::intents::{Banner, DropReason, Effect, Outcome, RejectReason, ViewIntent};
use super::state::{ActiveRequest, Phase, SessionState};
use crate::protocol::{DecodeError, EventKind, RequestId, ServerEvent, TaskStatus};
use crate::request::GenerationRequest;

/// Ids of finished requests remembered so late frames for them can't bind a
/// new provisional request.
const RETIRED_ID_LIMIT: usize = 32;

/// Owns the session state. Every input returns the effects the caller must
/// carry out; nothing here performs I/O.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    retired: VecDeque<RequestId>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    /// A fresh session starts idle and offline.
    pub fn new() -> Self {
        Self {
            state: SessionState::new(),
            retired: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn accepts_submit(&self) -> Result<(), RejectReason> {
        if !self.state.connected {
            return Err(RejectReason::Disconnected);
        }
        if self.state.phase != Phase::Idle {
            return Err(RejectReason::Busy(self.state.phase));
        }
        Ok(())
    }

    pub fn connection_established(&mut self) -> Vec<Effect> {
        self.transition(|machine, effects| {
            if machine.state.connected {
                return;
            }
            machine.state.connected = true;
            effects.push(Effect::View(ViewIntent::ConnectionChanged(true)));
        })
    }

    /// Ends any active request; submits are refused until reconnected.
    pub fn connection_lost(&mut self) -> Vec<Effect> {
        self.transition(|machine, effects| {
            if !machine.state.connected {
                return;
            }
            if machine.state.phase != Phase::Idle {
                effects.push(Effect::View(ViewIntent::ShowBanner(Banner::ConnectionLost)));
                machine.finish(Outcome::ConnectionLost, effects);
            }
            machine.state.connected = false;
            effects.push(Effect::View(ViewIntent::ConnectionChanged(false)));
        })
    }

    pub fn submit(&mut self, request: GenerationRequest) -> Vec<Effect> {
        self.transition(move |machine, effects| {
            if let Err(reason) = machine.accepts_submit() {
                debug!(?reason, "submit rejected");
                effects.push(Effect::View(ViewIntent::Rejected(reason)));
                return;
            }

            let id = RequestId::provisional();
            info!(request_id = %id, "submitting generation request");
            machine.state.phase = Phase::Submitting;
            machine.state.active = Some(ActiveRequest { id, bound: false });
            machine.state.accumulated.clear();
            machine.state.queue_position = None;

            let system_prompt = Some(request.parameters.system_prompt.clone())
                .filter(|text| !text.trim().is_empty());
            effects.push(Effect::View(ViewIntent::ShowUserMessage {
                prompt: request.prompt.clone(),
                system_prompt,
                has_image: request.image.is_some(),
            }));
            effects.push(Effect::Transmit(request));
        })
    }

    /// Advisory: sends the cancel call and waits for the stream to end.
    pub fn request_cancel(&mut self) -> Vec<Effect> {
        self.transition(|machine, effects| {
            let phase = machine.state.phase;
            let active_id = machine.state.active_request_id().cloned();
            let (true, Some(id)) = (phase.is_cancellable(), active_id) else {
                effects.push(Effect::View(ViewIntent::Rejected(
                    RejectReason::NotCancellable(phase),
                )));
                return;
            };
            if phase != Phase::Aborting {
                machine.state.phase = Phase::Aborting;
                machine.state.queue_position = None;
            }
            info!(request_id = %id, "cancel requested");
            effects.push(Effect::SendCancel(id));
        })
    }

    pub fn handle_frame(&mut self, raw: &str) -> Vec<Effect> {
        self.handle_decoded(ServerEvent::decode(raw))
    }

    /// Binary frames go through the same path; invalid UTF-8 is malformed.
    pub fn handle_frame_bytes(&mut self, raw: &[u8]) -> Vec<Effect> {
        self.handle_decoded(ServerEvent::decode_bytes(raw))
    }

    fn handle_decoded(&mut self, decoded: Result<ServerEvent, DecodeError>) -> Vec<Effect> {
        match decoded {
            Ok(event) => self.handle_event(event),
            Err(err) => {
                warn!(error = %err, "dropping malformed server frame");
                vec![Effect::Dropped(DropReason::Malformed(err))]
            }
        }
    }

    pub fn handle_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        self.transition(move |machine, effects| {
            let status = event.status();
            match machine.admit(&event) {
                Ok(Some(bound)) => {
                    debug!(task_id = %bound, "request bound to server task");
                    effects.push(Effect::Bound(bound));
                }
                Ok(None) => {}
                Err(reason) => {
                    debug!(status = status.as_str(), reason = reason.as_str(), "dropping server event");
                    effects.push(Effect::Dropped(reason));
                    return;
                }
            }
            machine.apply_event(event.kind, effects);
        })
    }

    fn admit(&mut self, event: &ServerEvent) -> Result<Option<RequestId>, DropReason> {
        let Some(active) = self.state.active.as_mut() else {
            return Err(DropReason::NoActiveRequest);
        };
        match &event.task_id {
            // The server reports failures without a task id.
            None if event.status() == TaskStatus::Error => Ok(None),
            None => Err(DropReason::MissingTaskId),
            Some(id) if active.bound => {
                if *id == active.id {
                    Ok(None)
                } else {
                    Err(DropReason::ForeignTaskId {
                        expected: active.id.clone(),
                        got: id.clone(),
                    })
                }
            }
            Some(id) if self.retired.contains(id) => Err(DropReason::RetiredTaskId(id.clone())),
            Some(id) => {
                active.id = id.clone();
                active.bound = true;
                Ok(Some(id.clone()))
            }
        }
    }

    fn apply_event(&mut self, kind: EventKind, effects: &mut Vec<Effect>) {
        let phase = self.state.phase;
        match kind {
            EventKind::Starting => {
                if phase == Phase::Submitting {
                    self.state.phase = Phase::Streaming;
                } else {
                    effects.push(Effect::Dropped(DropReason::Duplicate(TaskStatus::Starting)));
                }
            }
            EventKind::Waiting { queue_pos } => {
                if phase != Phase::Aborting {
                    self.state.phase = Phase::Queued;
                    self.state.queue_position = queue_pos;
                }
                effects.push(Effect::View(ViewIntent::ShowQueuePosition(queue_pos)));
            }
            EventKind::Running { tokens } => {
                if phase != Phase::Aborting {
                    self.state.phase = Phase::Streaming;
                    self.state.queue_position = None;
                }
                if !tokens.is_empty() {
                    self.state.accumulated.push(tokens.clone());
                    effects.push(Effect::View(ViewIntent::AppendText(tokens)));
                }
            }
            EventKind::Finished => self.finish(Outcome::Finished, effects),
            EventKind::Aborted => {
                effects.push(Effect::View(ViewIntent::ShowBanner(Banner::Aborted)));
                self.finish(Outcome::Aborted, effects);
            }
            EventKind::Error { message } => {
                effects.push(Effect::View(ViewIntent::ShowBanner(Banner::Error(
                    message.clone(),
                ))));
                self.finish(Outcome::Failed(message), effects);
            }
        }
    }

    fn finish(&mut self, outcome: Outcome, effects: &mut Vec<Effect>) {
        if let Some(active) = self.state.active.take() {
            if active.bound {
                self.retired.push_back(active.id);
                while self.retired.len() > RETIRED_ID_LIMIT {
                    self.retired.pop_front();
                }
            }
        }
        self.state.phase = Phase::Idle;
        self.state.accumulated.clear();
        self.state.queue_position = None;
        info!(outcome = outcome.as_str(), "generation ended");
        effects.push(Effect::View(ViewIntent::GenerationEnded(outcome)));
    }

    fn transition(&mut self, step: impl FnOnce(&mut Self, &mut Vec<Effect>)) -> Vec<Effect> {
        let before = self.state.input_mode();
        let mut effects = Vec::new();
        step(self, &mut effects);
        let after = self.state.input_mode();
        if after != before {
            effects.push(Effect::View(ViewIntent::SetInput(after)));
        }
        debug_assert_eq!(self.state.check_invariants(), Ok(()));
        effects
    }
}
