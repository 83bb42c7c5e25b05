use std::io::Write;

use anyhow::Result;
use instruct_contracts::session::{Banner, InputMode, Outcome, Phase, RejectReason, ViewIntent};
use instruct_engine::ViewProjector;

/// Streams generated text to `transcript` and everything else, bracketed,
/// to `status`.
pub struct TerminalProjector<W: Write, S: Write> {
    transcript: W,
    status: S,
    input_mode: InputMode,
    line_open: bool,
    last_outcome: Option<Outcome>,
}

impl<W: Write, S: Write> TerminalProjector<W, S> {
    pub fn new(transcript: W, status: S) -> Self {
        Self {
            transcript,
            status,
            input_mode: InputMode::Offline,
            line_open: false,
            last_outcome: None,
        }
    }

    #[cfg(test)]
    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (W, S) {
        (self.transcript, self.status)
    }

    fn close_line(&mut self) -> Result<()> {
        if self.line_open {
            writeln!(self.transcript)?;
            self.transcript.flush()?;
            self.line_open = false;
        }
        Ok(())
    }

    fn status_line(&mut self, text: &str) -> Result<()> {
        self.close_line()?;
        writeln!(self.status, "{text}")?;
        self.status.flush()?;
        Ok(())
    }
}

impl<W: Write, S: Write> ViewProjector for TerminalProjector<W, S> {
    fn project(&mut self, intent: &ViewIntent) -> Result<()> {
        match intent {
            ViewIntent::SetInput(mode) => {
                let entering_retry =
                    *mode == InputMode::RetryCancel && self.input_mode != InputMode::RetryCancel;
                self.input_mode = *mode;
                if entering_retry {
                    self.status_line("[cancel sent; /cancel again to retry]")?;
                }
            }
            ViewIntent::ShowUserMessage {
                system_prompt,
                has_image,
                ..
            } => {
                if let Some(system_prompt) = system_prompt {
                    self.status_line(&format!("[system: {system_prompt}]"))?;
                }
                if *has_image {
                    self.status_line("[image attached]")?;
                }
            }
            ViewIntent::AppendText(text) => {
                write!(self.transcript, "{text}")?;
                self.transcript.flush()?;
                self.line_open = true;
            }
            ViewIntent::ShowQueuePosition(Some(position)) => {
                self.status_line(&format!("[queue position {position}]"))?;
            }
            ViewIntent::ShowQueuePosition(None) => self.status_line("[queued]")?,
            ViewIntent::ShowBanner(banner) => {
                let text = match banner {
                    Banner::Aborted => "[aborted]".to_string(),
                    Banner::Error(Some(message)) => format!("[error: {message}]"),
                    Banner::Error(None) => "[error]".to_string(),
                    Banner::ConnectionLost => {
                        "[connection lost: /reconnect to retry]".to_string()
                    }
                };
                self.status_line(&text)?;
            }
            ViewIntent::GenerationEnded(outcome) => {
                self.close_line()?;
                self.last_outcome = Some(outcome.clone());
            }
            ViewIntent::Rejected(reason) => {
                let text = match reason {
                    RejectReason::Busy(phase) => {
                        format!("[busy: generation {}; /cancel to stop it]", phase.as_str())
                    }
                    RejectReason::Disconnected => "[not connected: /reconnect first]".to_string(),
                    RejectReason::NotCancellable(Phase::Idle) => "[nothing to cancel]".to_string(),
                    RejectReason::NotCancellable(phase) => {
                        format!("[cannot cancel while {}]", phase.as_str())
                    }
                };
                self.status_line(&text)?;
            }
            ViewIntent::ConnectionChanged(true) => self.status_line("[connected]")?,
            ViewIntent::ConnectionChanged(false) => self.status_line("[disconnected]")?,
            ViewIntent::Notice(text) => self.status_line(text)?,
            ViewIntent::Parameters(entries) => {
                for (name, value) in entries {
                    self.status_line(&format!("{} = {value}", name.wire_name()))?;
                }
            }
        }
        Ok(())
    }
}

/// `run` exit status: 0 finished, 1 error, 2 aborted, 3 no connection.
pub fn exit_code(outcome: Option<&Outcome>) -> i32 {
    match outcome {
        Some(Outcome::Finished) => 0,
        Some(Outcome::Failed(_)) => 1,
        Some(Outcome::Aborted) => 2,
        Some(Outcome::ConnectionLost) | None => 3,
    }
}

#[cfg(test)]
mod tests {
    use instruct_contracts::request::ParameterName;
    use instruct_contracts::session::{
        Banner, InputMode, Outcome, Phase, RejectReason, ViewIntent,
    };
    use instruct_engine::ViewProjector;

    use super::{exit_code, TerminalProjector};

    fn render(intents: &[ViewIntent]) -> anyhow::Result<(String, String)> {
        let mut projector = TerminalProjector::new(Vec::new(), Vec::new());
        for intent in intents {
            projector.project(intent)?;
        }
        let (transcript, status) = projector.into_parts();
        Ok((String::from_utf8(transcript)?, String::from_utf8(status)?))
    }

    #[test]
    fn streamed_text_goes_to_transcript_and_ends_with_newline() -> anyhow::Result<()> {
        let (transcript, status) = render(&[
            ViewIntent::AppendText("Hi".to_string()),
            ViewIntent::AppendText(" there".to_string()),
            ViewIntent::GenerationEnded(Outcome::Finished),
        ])?;
        assert_eq!(transcript, "Hi there\n");
        assert_eq!(status, "");
        Ok(())
    }

    #[test]
    fn banner_follows_partial_output() -> anyhow::Result<()> {
        let (transcript, status) = render(&[
            ViewIntent::AppendText("partial".to_string()),
            ViewIntent::ShowBanner(Banner::Error(Some("boom".to_string()))),
            ViewIntent::GenerationEnded(Outcome::Failed(Some("boom".to_string()))),
        ])?;
        assert_eq!(transcript, "partial\n");
        assert_eq!(status, "[error: boom]\n");
        Ok(())
    }

    #[test]
    fn status_lines_for_queue_rejections_and_parameters() -> anyhow::Result<()> {
        let (_, status) = render(&[
            ViewIntent::ShowQueuePosition(Some(3)),
            ViewIntent::Rejected(RejectReason::Busy(Phase::Streaming)),
            ViewIntent::Rejected(RejectReason::NotCancellable(Phase::Idle)),
            ViewIntent::Parameters(vec![(ParameterName::TopP, "0.95".to_string())]),
        ])?;
        assert_eq!(
            status,
            "[queue position 3]\n[busy: generation streaming; /cancel to stop it]\n[nothing to cancel]\ntop_p = 0.95\n"
        );
        Ok(())
    }

    #[test]
    fn tracks_input_mode_and_outcome() -> anyhow::Result<()> {
        let mut projector = TerminalProjector::new(Vec::new(), Vec::new());
        assert_eq!(projector.input_mode(), InputMode::Offline);
        projector.project(&ViewIntent::SetInput(InputMode::Cancel))?;
        projector.project(&ViewIntent::GenerationEnded(Outcome::Aborted))?;
        assert_eq!(projector.input_mode(), InputMode::Cancel);
        assert_eq!(projector.last_outcome(), Some(&Outcome::Aborted));
        Ok(())
    }

    #[test]
    fn cancel_keeps_a_retry_affordance() -> anyhow::Result<()> {
        let mut projector = TerminalProjector::new(Vec::new(), Vec::new());
        projector.project(&ViewIntent::SetInput(InputMode::Cancel))?;
        projector.project(&ViewIntent::SetInput(InputMode::RetryCancel))?;
        projector.project(&ViewIntent::SetInput(InputMode::RetryCancel))?;
        assert_eq!(projector.input_mode(), InputMode::RetryCancel);

        let (_, status) = projector.into_parts();
        assert_eq!(
            String::from_utf8(status)?,
            "[cancel sent; /cancel again to retry]\n"
        );
        Ok(())
    }

    #[test]
    fn exit_codes_per_outcome() {
        assert_eq!(exit_code(Some(&Outcome::Finished)), 0);
        assert_eq!(exit_code(Some(&Outcome::Failed(None))), 1);
        assert_eq!(exit_code(Some(&Outcome::Aborted)), 2);
        assert_eq!(exit_code(Some(&Outcome::ConnectionLost)), 3);
        assert_eq!(exit_code(None), 3);
    }
}
