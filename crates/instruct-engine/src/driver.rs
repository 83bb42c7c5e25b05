use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use instruct_contracts::events::{
    EventWriter, CANCEL_OUTCOME, CANCEL_SENT, CONNECTED, CONNECTION_LOST, EVENT_DROPPED,
    GENERATION_ENDED, REQUEST_BOUND, REQUEST_SUBMITTED,
};
use instruct_contracts::protocol::RequestId;
use instruct_contracts::request::{Composer, ComposerEdit, GenerationRequest, SamplingDefaults};
use instruct_contracts::session::{Effect, Outcome, Phase, SessionMachine, ViewIntent};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::transport::{CancelOutcome, StreamConnection, Transport, TransportError};

const IDLE_POLL: Duration = Duration::from_millis(200);
const CANCEL_GRACE_DEFAULT: Duration = Duration::from_secs(2);

/// Renders view intents. Implementations decide the presentation.
pub trait ViewProjector {
    fn project(&mut self, intent: &ViewIntent) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Submit { prompt: String },
    Cancel,
    Compose(ComposerEdit),
    ShowParameters,
    Reconnect,
    /// Text for the view that changes nothing in the session.
    Notice(String),
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct CancelReport {
    task_id: RequestId,
    result: Result<CancelOutcome, TransportError>,
}

/// Single-threaded owner of the connection, the session machine and the
/// composer. Cancel calls run on worker threads and report back through a
/// channel that the loop drains.
pub struct SessionDriver<T: Transport, V: ViewProjector> {
    transport: Arc<T>,
    connection: Option<T::Connection>,
    machine: SessionMachine,
    composer: Composer,
    view: V,
    events: Option<EventWriter>,
    cancel_tx: mpsc::Sender<CancelReport>,
    cancel_rx: mpsc::Receiver<CancelReport>,
    cancels_in_flight: usize,
    cancel_grace: Duration,
}

impl<T: Transport, V: ViewProjector> SessionDriver<T, V> {
    pub fn new(transport: T, defaults: SamplingDefaults, view: V) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        Self {
            transport: Arc::new(transport),
            connection: None,
            machine: SessionMachine::new(),
            composer: Composer::new(defaults),
            view,
            events: None,
            cancel_tx,
            cancel_rx,
            cancels_in_flight: 0,
            cancel_grace: CANCEL_GRACE_DEFAULT,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// How long shutdown waits for outstanding cancel calls.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Opens the stream. A failed attempt is reported to the view and leaves
    /// the session offline; `Ok(false)` in that case.
    pub fn connect(&mut self) -> Result<bool> {
        match self.transport.connect() {
            Ok(connection) => {
                self.connection = Some(connection);
                info!("stream connected");
                self.record(CONNECTED, Value::Null);
                let effects = self.machine.connection_established();
                self.apply(effects)?;
                Ok(true)
            }
            Err(err) => {
                warn!(error = %err, kind = err.kind().as_str(), "stream connect failed");
                self.view
                    .project(&ViewIntent::Notice(format!("connection failed: {err}")))?;
                Ok(false)
            }
        }
    }

    pub fn reconnect(&mut self) -> Result<bool> {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
            self.record(CONNECTION_LOST, json!({"reason": "reconnect"}));
            let effects = self.machine.connection_lost();
            self.apply(effects)?;
        }
        self.connect()
    }

    pub fn handle_action(&mut self, action: UserAction) -> Result<Flow> {
        match action {
            UserAction::Submit { prompt } => {
                if let Err(reason) = self.machine.accepts_submit() {
                    debug!(?reason, "submit refused");
                    self.view.project(&ViewIntent::Rejected(reason))?;
                    return Ok(Flow::Continue);
                }
                self.composer.apply(ComposerEdit::Prompt(prompt));
                let request = self.composer.take_request();
                let effects = self.machine.submit(request);
                self.apply(effects)?;
            }
            UserAction::Cancel => {
                let effects = self.machine.request_cancel();
                self.apply(effects)?;
            }
            UserAction::Compose(edit) => self.composer.apply(edit),
            UserAction::ShowParameters => {
                let entries = self.composer.parameters().entries();
                self.view.project(&ViewIntent::Parameters(entries))?;
            }
            UserAction::Reconnect => {
                self.reconnect()?;
            }
            UserAction::Notice(text) => self.view.project(&ViewIntent::Notice(text))?,
            UserAction::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Reads at most one frame. Returns whether a frame was handled.
    pub fn pump(&mut self) -> Result<bool> {
        self.drain_cancel_reports();
        let Some(connection) = self.connection.as_mut() else {
            return Ok(false);
        };
        match connection.poll_frame() {
            Ok(Some(frame)) => {
                let effects = self.machine.handle_frame_bytes(&frame);
                self.apply(effects)?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                self.handle_connection_loss(err)?;
                Ok(false)
            }
        }
    }

    /// Pumps until the active generation, if any, has ended.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while self.machine.state().phase() != Phase::Idle {
            self.pump()?;
        }
        self.drain_cancel_reports();
        Ok(())
    }

    /// Interleaves queued user actions with stream frames until `Quit`.
    /// Once the action channel closes, the loop finishes the current
    /// generation and returns.
    pub fn run(&mut self, actions: &mpsc::Receiver<UserAction>) -> Result<()> {
        let mut inputs_closed = false;
        loop {
            while !inputs_closed {
                match actions.try_recv() {
                    Ok(action) => {
                        if self.handle_action(action)? == Flow::Quit {
                            return self.shutdown();
                        }
                    }
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => inputs_closed = true,
                }
            }
            if inputs_closed && self.machine.state().phase() == Phase::Idle {
                return self.shutdown();
            }

            if self.connection.is_some() {
                self.pump()?;
                continue;
            }
            // Offline: block on input instead of spinning.
            match actions.recv_timeout(IDLE_POLL) {
                Ok(action) => {
                    if self.handle_action(action)? == Flow::Quit {
                        return self.shutdown();
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => self.drain_cancel_reports(),
                Err(mpsc::RecvTimeoutError::Disconnected) => inputs_closed = true,
            }
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.wait_for_cancels(self.cancel_grace);
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        Ok(())
    }

    pub fn drain_cancel_reports(&mut self) {
        while let Ok(report) = self.cancel_rx.try_recv() {
            self.finish_cancel_report(report);
        }
    }

    /// Returns whether every cancel call reported back in time.
    pub fn wait_for_cancels(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.cancels_in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(pending = self.cancels_in_flight, "cancel calls still in flight");
                return false;
            }
            match self.cancel_rx.recv_timeout(remaining) {
                Ok(report) => self.finish_cancel_report(report),
                Err(_) => continue,
            }
        }
        true
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Result<()> {
        let mut send_failure: Option<TransportError> = None;
        for effect in effects {
            match effect {
                Effect::View(intent) => {
                    if let ViewIntent::GenerationEnded(outcome) = &intent {
                        let mut payload = json!({"outcome": outcome.as_str()});
                        if let Outcome::Failed(Some(message)) = outcome {
                            payload["message"] = json!(message);
                        }
                        self.record(GENERATION_ENDED, payload);
                    }
                    self.view.project(&intent)?;
                }
                Effect::Transmit(request) => {
                    if let Err(err) = self.transmit(&request) {
                        send_failure = Some(err);
                    }
                }
                Effect::SendCancel(task_id) => self.spawn_cancel(task_id),
                Effect::Bound(task_id) => {
                    self.record(REQUEST_BOUND, json!({"request_id": task_id.as_str()}));
                }
                Effect::Dropped(reason) => {
                    debug!(reason = reason.as_str(), "server event dropped");
                    self.record(EVENT_DROPPED, json!({"reason": reason.as_str()}));
                }
            }
        }
        if let Some(err) = send_failure {
            self.handle_connection_loss(err)?;
        }
        Ok(())
    }

    fn transmit(&mut self, request: &GenerationRequest) -> Result<(), TransportError> {
        let request_id = self
            .machine
            .state()
            .active_request_id()
            .map(|id| id.as_str().to_string());
        self.record(
            REQUEST_SUBMITTED,
            json!({
                "request_id": request_id,
                "prompt_chars": request.prompt.chars().count(),
                "has_image": request.image.is_some(),
            }),
        );
        match self.connection.as_mut() {
            Some(connection) => connection.send_request(request),
            None => Err(TransportError::closed("no open stream")),
        }
    }

    fn handle_connection_loss(&mut self, err: TransportError) -> Result<()> {
        warn!(error = %err, kind = err.kind().as_str(), "stream lost");
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.record(
            CONNECTION_LOST,
            json!({"reason": err.kind().as_str(), "error": err.message()}),
        );
        let effects = self.machine.connection_lost();
        self.apply(effects)
    }

    fn spawn_cancel(&mut self, task_id: RequestId) {
        info!(task_id = %task_id, "sending cancel");
        self.record(CANCEL_SENT, json!({"request_id": task_id.as_str()}));
        let transport = Arc::clone(&self.transport);
        let tx = self.cancel_tx.clone();
        self.cancels_in_flight += 1;
        thread::spawn(move || {
            let result = transport.cancel(&task_id);
            let _ = tx.send(CancelReport { task_id, result });
        });
    }

    fn finish_cancel_report(&mut self, report: CancelReport) {
        self.cancels_in_flight = self.cancels_in_flight.saturating_sub(1);
        let request_id = report.task_id.as_str();
        let payload = match &report.result {
            Ok(outcome) if outcome.is_success() => {
                info!(task_id = request_id, status = outcome.status, "cancel acknowledged");
                json!({"request_id": request_id, "status": outcome.status, "body": outcome.body})
            }
            Ok(outcome) => {
                warn!(task_id = request_id, status = outcome.status, body = %outcome.body, "cancel refused");
                json!({"request_id": request_id, "status": outcome.status, "body": outcome.body})
            }
            Err(err) => {
                warn!(task_id = request_id, error = %err, "cancel failed");
                json!({"request_id": request_id, "error": err.message()})
            }
        };
        self.record(CANCEL_OUTCOME, payload);
    }

    fn record(&self, event_type: &str, payload: Value) {
        let Some(writer) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = writer.emit_json(event_type, payload) {
            warn!(error = %err, event_type, "failed to write session event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use instruct_contracts::events::{read_events, EventWriter};
    use instruct_contracts::protocol::RequestId;
    use instruct_contracts::request::{ComposerEdit, GenerationRequest, SamplingDefaults};
    use instruct_contracts::session::{
        Banner, InputMode, Outcome, Phase, RejectReason, ViewIntent,
    };

    use super::{Flow, SessionDriver, UserAction, ViewProjector};
    use crate::transport::{CancelOutcome, StreamConnection, Transport, TransportError};

    #[derive(Default)]
    struct Shared {
        polls: VecDeque<Result<Option<Vec<u8>>, TransportError>>,
        sent: Vec<GenerationRequest>,
        cancels: Vec<RequestId>,
        cancel_replies: VecDeque<Result<CancelOutcome, TransportError>>,
        connects: usize,
        refuse_connect: bool,
    }

    #[derive(Clone, Default)]
    struct FakeTransport {
        shared: Arc<Mutex<Shared>>,
    }

    impl FakeTransport {
        fn push_frame(&self, frame: &str) {
            self.push_bytes(frame.as_bytes());
        }

        fn push_bytes(&self, frame: &[u8]) {
            self.shared
                .lock()
                .unwrap()
                .polls
                .push_back(Ok(Some(frame.to_vec())));
        }

        fn push_error(&self, err: TransportError) {
            self.shared.lock().unwrap().polls.push_back(Err(err));
        }
    }

    struct FakeConnection {
        shared: Arc<Mutex<Shared>>,
    }

    impl StreamConnection for FakeConnection {
        fn send_request(&mut self, request: &GenerationRequest) -> Result<(), TransportError> {
            self.shared.lock().unwrap().sent.push(request.clone());
            Ok(())
        }

        fn poll_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            self.shared.lock().unwrap().polls.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {}
    }

    impl Transport for FakeTransport {
        type Connection = FakeConnection;

        fn connect(&self) -> Result<FakeConnection, TransportError> {
            let mut shared = self.shared.lock().unwrap();
            if shared.refuse_connect {
                return Err(TransportError::connect("refused"));
            }
            shared.connects += 1;
            Ok(FakeConnection {
                shared: Arc::clone(&self.shared),
            })
        }

        fn cancel(&self, task_id: &RequestId) -> Result<CancelOutcome, TransportError> {
            let mut shared = self.shared.lock().unwrap();
            shared.cancels.push(task_id.clone());
            shared.cancel_replies.pop_front().unwrap_or(Ok(CancelOutcome {
                status: 200,
                body: "{}".to_string(),
            }))
        }
    }

    #[derive(Default)]
    struct RecordingView {
        intents: Vec<ViewIntent>,
    }

    impl RecordingView {
        fn text(&self) -> String {
            self.intents
                .iter()
                .filter_map(|intent| match intent {
                    ViewIntent::AppendText(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        }

        fn outcomes(&self) -> Vec<Outcome> {
            self.intents
                .iter()
                .filter_map(|intent| match intent {
                    ViewIntent::GenerationEnded(outcome) => Some(outcome.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl ViewProjector for RecordingView {
        fn project(&mut self, intent: &ViewIntent) -> anyhow::Result<()> {
            self.intents.push(intent.clone());
            Ok(())
        }
    }

    fn connected_driver() -> (FakeTransport, SessionDriver<FakeTransport, RecordingView>) {
        let transport = FakeTransport::default();
        let mut driver = SessionDriver::new(
            transport.clone(),
            SamplingDefaults::default(),
            RecordingView::default(),
        );
        assert!(driver.connect().unwrap());
        (transport, driver)
    }

    fn submit(prompt: &str) -> UserAction {
        UserAction::Submit {
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn submit_streams_tokens_until_finished() -> anyhow::Result<()> {
        let (transport, mut driver) = connected_driver();
        driver.handle_action(UserAction::Compose(ComposerEdit::SystemPrompt(
            "Be brief.".to_string(),
        )))?;
        driver.handle_action(submit("hello"))?;

        transport.push_frame(r#"{"status":"starting","task_id":"t1"}"#);
        transport.push_frame(r#"{"status":"running","task_id":"t1","tokens":"Hi"}"#);
        transport.push_frame(r#"{"status":"running","task_id":"t1","tokens":" there"}"#);
        transport.push_frame(r#"{"status":"finished","task_id":"t1"}"#);
        driver.run_until_idle()?;

        let shared = transport.shared.lock().unwrap();
        assert_eq!(shared.sent.len(), 1);
        assert_eq!(shared.sent[0].prompt, "hello");
        assert_eq!(shared.sent[0].parameters.system_prompt, "Be brief.");
        assert_eq!(driver.view().text(), "Hi there");
        assert_eq!(driver.view().outcomes(), vec![Outcome::Finished]);
        assert_eq!(driver.composer().system_prompt(), "");
        assert_eq!(
            driver.view().intents.last(),
            Some(&ViewIntent::SetInput(InputMode::Submit))
        );
        Ok(())
    }

    #[test]
    fn cancel_posts_bound_task_id_off_thread() -> anyhow::Result<()> {
        let (transport, mut driver) = connected_driver();
        driver.handle_action(submit("hello"))?;
        transport.push_frame(r#"{"status":"starting","task_id":"t7"}"#);
        assert!(driver.pump()?);

        driver.handle_action(UserAction::Cancel)?;
        assert_eq!(driver.machine().state().phase(), Phase::Aborting);
        assert!(driver.wait_for_cancels(Duration::from_secs(5)));
        assert_eq!(
            transport.shared.lock().unwrap().cancels,
            vec![RequestId::new("t7")]
        );

        transport.push_frame(r#"{"status":"aborted","task_id":"t7"}"#);
        driver.run_until_idle()?;
        assert!(driver
            .view()
            .intents
            .contains(&ViewIntent::ShowBanner(Banner::Aborted)));
        assert_eq!(driver.view().outcomes(), vec![Outcome::Aborted]);
        Ok(())
    }

    #[test]
    fn failed_cancel_is_only_traced() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.jsonl");
        let transport = FakeTransport::default();
        {
            let mut shared = transport.shared.lock().unwrap();
            shared
                .cancel_replies
                .push_back(Err(TransportError::cancel("connection refused")));
            shared.cancel_replies.push_back(Ok(CancelOutcome {
                status: 404,
                body: "unknown task".to_string(),
            }));
        }
        let mut driver = SessionDriver::new(
            transport.clone(),
            SamplingDefaults::default(),
            RecordingView::default(),
        )
        .with_events(EventWriter::new(&path, "session-test"));
        driver.connect()?;
        driver.handle_action(submit("hello"))?;
        transport.push_frame(r#"{"status":"starting","task_id":"t9"}"#);
        assert!(driver.pump()?);

        driver.handle_action(UserAction::Cancel)?;
        let projected = driver.view().intents.len();
        assert!(driver.wait_for_cancels(Duration::from_secs(5)));
        driver.handle_action(UserAction::Cancel)?;
        assert!(driver.wait_for_cancels(Duration::from_secs(5)));

        assert_eq!(driver.machine().state().phase(), Phase::Aborting);
        assert_eq!(driver.view().intents.len(), projected);
        assert_eq!(
            driver.view().intents.last(),
            Some(&ViewIntent::SetInput(InputMode::RetryCancel))
        );

        transport.push_frame(r#"{"status":"aborted","task_id":"t9"}"#);
        driver.run_until_idle()?;
        assert_eq!(driver.machine().state().phase(), Phase::Idle);
        assert_eq!(driver.view().outcomes(), vec![Outcome::Aborted]);

        let outcomes: Vec<_> = read_events(&path)?
            .into_iter()
            .filter(|event| event["type"] == "cancel_outcome")
            .collect();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0]["request_id"], "t9");
        assert_eq!(outcomes[0]["error"], "connection refused");
        assert_eq!(outcomes[1]["status"], 404);
        assert_eq!(outcomes[1]["body"], "unknown task");
        Ok(())
    }

    #[test]
    fn undecodable_binary_frame_is_dropped() -> anyhow::Result<()> {
        let (transport, mut driver) = connected_driver();
        driver.handle_action(submit("hello"))?;
        transport.push_frame(r#"{"status":"starting","task_id":"t1"}"#);
        let invalid: &[u8] = b"{\"status\":\"running\",\"task_id\":\"t1\",\"tokens\":\"ab\xFF\"}";
        transport.push_bytes(invalid);
        transport.push_bytes(br#"{"status":"running","task_id":"t1","tokens":"ok"}"#);
        transport.push_frame(r#"{"status":"finished","task_id":"t1"}"#);
        driver.run_until_idle()?;

        assert_eq!(driver.view().text(), "ok");
        assert_eq!(driver.view().outcomes(), vec![Outcome::Finished]);
        Ok(())
    }

    #[test]
    fn rejected_submit_leaves_composer_untouched() -> anyhow::Result<()> {
        let (_transport, mut driver) = connected_driver();
        driver.handle_action(submit("first"))?;
        driver.handle_action(UserAction::Compose(ComposerEdit::SystemPrompt(
            "keep me".to_string(),
        )))?;

        driver.handle_action(submit("second"))?;
        assert!(driver
            .view()
            .intents
            .contains(&ViewIntent::Rejected(RejectReason::Busy(Phase::Submitting))));
        assert_eq!(driver.composer().system_prompt(), "keep me");
        assert_eq!(driver.composer().prompt(), "");
        Ok(())
    }

    #[test]
    fn stream_loss_ends_generation_until_reconnect() -> anyhow::Result<()> {
        let (transport, mut driver) = connected_driver();
        driver.handle_action(submit("hello"))?;
        transport.push_frame(r#"{"status":"running","task_id":"t1","tokens":"par"}"#);
        transport.push_error(TransportError::closed("server closed the stream"));
        driver.run_until_idle()?;

        assert!(!driver.is_connected());
        assert_eq!(driver.view().text(), "par");
        assert_eq!(driver.view().outcomes(), vec![Outcome::ConnectionLost]);

        driver.handle_action(submit("again"))?;
        assert_eq!(
            driver.view().intents.last(),
            Some(&ViewIntent::Rejected(RejectReason::Disconnected))
        );

        driver.handle_action(UserAction::Reconnect)?;
        assert!(driver.is_connected());
        assert_eq!(transport.shared.lock().unwrap().connects, 2);
        assert_eq!(
            driver.view().intents.last(),
            Some(&ViewIntent::SetInput(InputMode::Submit))
        );
        Ok(())
    }

    #[test]
    fn failed_connect_is_reported_not_raised() -> anyhow::Result<()> {
        let transport = FakeTransport::default();
        transport.shared.lock().unwrap().refuse_connect = true;
        let mut driver = SessionDriver::new(
            transport,
            SamplingDefaults::default(),
            RecordingView::default(),
        );
        assert!(!driver.connect()?);
        assert!(matches!(
            driver.view().intents.as_slice(),
            [ViewIntent::Notice(text)] if text.contains("refused")
        ));
        Ok(())
    }

    #[test]
    fn show_parameters_lists_raw_values() -> anyhow::Result<()> {
        let (_transport, mut driver) = connected_driver();
        driver.handle_action(UserAction::Compose(ComposerEdit::Parameter {
            name: instruct_contracts::request::ParameterName::Temperature,
            value: "0.7x".to_string(),
        }))?;
        driver.handle_action(UserAction::ShowParameters)?;
        let Some(ViewIntent::Parameters(entries)) = driver.view().intents.last() else {
            anyhow::bail!("no parameters intent");
        };
        assert_eq!(entries.len(), 6);
        assert!(entries.iter().any(|(_, value)| value == "0.7x"));
        Ok(())
    }

    #[test]
    fn run_drains_actions_then_finishes_generation() -> anyhow::Result<()> {
        let (transport, mut driver) = connected_driver();
        transport.push_frame(r#"{"status":"starting","task_id":"t1"}"#);
        transport.push_frame(r#"{"status":"running","task_id":"t1","tokens":"ok"}"#);
        transport.push_frame(r#"{"status":"finished","task_id":"t1"}"#);

        let (tx, rx) = mpsc::channel();
        tx.send(submit("hello"))?;
        drop(tx);
        driver.run(&rx)?;

        assert_eq!(driver.view().text(), "ok");
        assert_eq!(driver.view().outcomes(), vec![Outcome::Finished]);
        assert!(!driver.is_connected());
        Ok(())
    }

    #[test]
    fn quit_stops_the_loop() -> anyhow::Result<()> {
        let (_transport, mut driver) = connected_driver();
        assert_eq!(driver.handle_action(UserAction::Quit)?, Flow::Quit);

        let (tx, rx) = mpsc::channel();
        tx.send(UserAction::Quit)?;
        driver.run(&rx)?;
        assert!(!driver.is_connected());
        Ok(())
    }

    #[test]
    fn session_trace_records_lifecycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.jsonl");
        let transport = FakeTransport::default();
        let mut driver = SessionDriver::new(
            transport.clone(),
            SamplingDefaults::default(),
            RecordingView::default(),
        )
        .with_events(EventWriter::new(&path, "session-test"));
        driver.connect()?;
        driver.handle_action(submit("hello"))?;
        transport.push_frame(r#"{"status":"starting","task_id":"t1"}"#);
        transport.push_frame(r#"{"status":"running","task_id":"zzz","tokens":"x"}"#);
        transport.push_frame(r#"{"status":"error","message":"boom"}"#);
        driver.run_until_idle()?;

        let events = read_events(&path)?;
        let types: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "connected",
                "request_submitted",
                "request_bound",
                "event_dropped",
                "generation_ended",
            ]
        );
        assert_eq!(events[3]["reason"], "foreign_task_id");
        assert_eq!(events[4]["outcome"], "error");
        assert_eq!(events[4]["message"], "boom");
        Ok(())
    }
}
