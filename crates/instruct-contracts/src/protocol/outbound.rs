use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use super::RequestId;
use crate::request::GenerationRequest;

#[derive(Debug, Serialize)]
struct SubmitMessage<'a> {
    prompt: &'a str,
    reply_prefix: &'a str,
    system_prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    max_new_tokens: Option<i64>,
    temperature: f64,
    top_p: f64,
    repetition_penalty: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
}

impl<'a> SubmitMessage<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        let params = &request.parameters;
        Self {
            prompt: &request.prompt,
            reply_prefix: &params.reply_prefix,
            system_prompt: &params.system_prompt,
            image: request.image.as_ref().map(|image| image.data_url()),
            max_new_tokens: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repetition_penalty: params.repetition_penalty,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        }
    }
}

/// Wire form of a submit. Unparseable numeric fields serialize as `null`.
pub fn submit_message(request: &GenerationRequest) -> anyhow::Result<Value> {
    serde_json::to_value(SubmitMessage::from_request(request))
        .context("failed to encode submit message")
}

pub fn submit_frame(request: &GenerationRequest) -> anyhow::Result<String> {
    serde_json::to_string(&SubmitMessage::from_request(request))
        .context("failed to encode submit frame")
}

pub fn cancel_body(task_id: &RequestId) -> Value {
    serde_json::json!({ "task_id": task_id.as_str() })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{cancel_body, submit_frame, submit_message};
    use crate::protocol::RequestId;
    use crate::request::{
        build_request, ImageAttachment, ParameterName, RawParameters, RequestDraft,
        SamplingDefaults,
    };

    fn draft_with<'a>(raw: &'a RawParameters, image: Option<&'a ImageAttachment>) -> RequestDraft<'a> {
        RequestDraft {
            prompt: "hello",
            system_prompt: "be brief",
            reply_prefix: "Sure,",
            parameters: raw,
            image,
        }
    }

    #[test]
    fn submit_message_uses_flat_wire_keys() -> anyhow::Result<()> {
        let raw = RawParameters::from_defaults(&SamplingDefaults::default());
        let request = build_request(draft_with(&raw, None));
        let message = submit_message(&request)?;
        assert_eq!(
            message,
            json!({
                "prompt": "hello",
                "reply_prefix": "Sure,",
                "system_prompt": "be brief",
                "max_new_tokens": 1000,
                "temperature": 0.6,
                "top_p": 0.95,
                "repetition_penalty": 1.2,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0,
            })
        );
        assert!(message.get("image").is_none());
        Ok(())
    }

    #[test]
    fn unparseable_numbers_go_out_as_null() -> anyhow::Result<()> {
        let mut raw = RawParameters::from_defaults(&SamplingDefaults::default());
        raw.set(ParameterName::Temperature, "warm");
        raw.set(ParameterName::MaxNewTokens, "lots");
        let request = build_request(draft_with(&raw, None));

        let frame = submit_frame(&request)?;
        let parsed: Value = serde_json::from_str(&frame)?;
        assert_eq!(parsed["temperature"], Value::Null);
        assert_eq!(parsed["max_new_tokens"], Value::Null);
        assert_eq!(parsed["top_p"], json!(0.95));
        Ok(())
    }

    #[test]
    fn attached_image_is_sent_as_data_url() -> anyhow::Result<()> {
        let raw = RawParameters::from_defaults(&SamplingDefaults::default());
        let image = ImageAttachment::from_data_url("data:image/png;base64,iVBORw0KGgo=")?;
        let request = build_request(draft_with(&raw, Some(&image)));
        let message = submit_message(&request)?;
        assert_eq!(message["image"], json!("data:image/png;base64,iVBORw0KGgo="));
        Ok(())
    }

    #[test]
    fn cancel_body_carries_task_id() {
        assert_eq!(
            cancel_body(&RequestId::new("task-9")),
            json!({"task_id": "task-9"})
        );
    }
}
