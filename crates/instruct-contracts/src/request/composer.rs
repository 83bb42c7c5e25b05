use super::{
    build_request, GenerationRequest, ImageAttachment, ParameterName, RawParameters, RequestDraft,
    SamplingDefaults,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ComposerEdit {
    Prompt(String),
    SystemPrompt(String),
    ReplyPrefix(String),
    Attach(ImageAttachment),
    Detach,
    Parameter { name: ParameterName, value: String },
    ResetParameters,
}

/// Form state behind the input box.
///
/// Prompt, system prompt, reply prefix and the attachment are transient and
/// are cleared once a request is taken. Parameter fields persist across
/// submissions.
#[derive(Debug, Clone)]
pub struct Composer {
    prompt: String,
    system_prompt: String,
    reply_prefix: String,
    image: Option<ImageAttachment>,
    parameters: RawParameters,
    defaults: SamplingDefaults,
}

impl Composer {
    pub fn new(defaults: SamplingDefaults) -> Self {
        Self {
            prompt: String::new(),
            system_prompt: defaults.system_prompt.clone(),
            reply_prefix: String::new(),
            image: None,
            parameters: RawParameters::from_defaults(&defaults),
            defaults,
        }
    }

    pub fn apply(&mut self, edit: ComposerEdit) {
        match edit {
            ComposerEdit::Prompt(text) => self.prompt = text,
            ComposerEdit::SystemPrompt(text) => self.system_prompt = text,
            ComposerEdit::ReplyPrefix(text) => self.reply_prefix = text,
            ComposerEdit::Attach(image) => self.image = Some(image),
            ComposerEdit::Detach => self.image = None,
            ComposerEdit::Parameter { name, value } => self.parameters.set(name, value),
            ComposerEdit::ResetParameters => self.reset_parameters(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn reply_prefix(&self) -> &str {
        &self.reply_prefix
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    pub fn parameters(&self) -> &RawParameters {
        &self.parameters
    }

    /// Restores parameter fields and the system prompt to the defaults.
    pub fn reset_parameters(&mut self) {
        self.parameters = RawParameters::from_defaults(&self.defaults);
        self.system_prompt = self.defaults.system_prompt.clone();
    }

    pub fn draft(&self) -> RequestDraft<'_> {
        RequestDraft {
            prompt: &self.prompt,
            system_prompt: &self.system_prompt,
            reply_prefix: &self.reply_prefix,
            parameters: &self.parameters,
            image: self.image.as_ref(),
        }
    }

    /// Builds the request and clears the transient fields.
    pub fn take_request(&mut self) -> GenerationRequest {
        let request = build_request(self.draft());
        self.prompt.clear();
        self.system_prompt.clear();
        self.reply_prefix.clear();
        self.image = None;
        request
    }
}
