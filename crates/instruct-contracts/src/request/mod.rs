mod attachment;
mod composer;
mod numeric;
mod params;

pub use attachment::ImageAttachment;
pub use composer::{Composer, ComposerEdit};
pub use numeric::{parse_leading_float, parse_leading_int};
pub use params::{GenerationParameters, ParameterName, RawParameters, SamplingDefaults};

/// One submission. Transmitted once and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub parameters: GenerationParameters,
    pub image: Option<ImageAttachment>,
}

/// Borrowed view of the form at submit time.
#[derive(Debug, Clone, Copy)]
pub struct RequestDraft<'a> {
    pub prompt: &'a str,
    pub system_prompt: &'a str,
    pub reply_prefix: &'a str,
    pub parameters: &'a RawParameters,
    pub image: Option<&'a ImageAttachment>,
}

/// Pure: coerces numbers permissively and validates nothing else.
pub fn build_request(draft: RequestDraft<'_>) -> GenerationRequest {
    GenerationRequest {
        prompt: draft.prompt.to_string(),
        parameters: GenerationParameters::coerce(
            draft.parameters,
            draft.system_prompt,
            draft.reply_prefix,
        ),
        image: draft.image.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_request, ParameterName, RawParameters, RequestDraft, SamplingDefaults};

    #[test]
    fn build_request_copies_text_fields_verbatim() {
        let raw = RawParameters::from_defaults(&SamplingDefaults::default());
        let request = build_request(RequestDraft {
            prompt: "  spaced prompt\n",
            system_prompt: "",
            reply_prefix: "",
            parameters: &raw,
            image: None,
        });
        assert_eq!(request.prompt, "  spaced prompt\n");
        assert_eq!(request.parameters.system_prompt, "");
        assert_eq!(request.image, None);
    }

    #[test]
    fn build_request_does_not_validate_ranges() {
        let mut raw = RawParameters::from_defaults(&SamplingDefaults::default());
        raw.set(ParameterName::MaxNewTokens, "-5");
        raw.set(ParameterName::Temperature, "42");
        let request = build_request(RequestDraft {
            prompt: "",
            system_prompt: "",
            reply_prefix: "",
            parameters: &raw,
            image: None,
        });
        assert_eq!(request.parameters.max_new_tokens, Some(-5));
        assert_eq!(request.parameters.temperature, 42.0);
    }
}
