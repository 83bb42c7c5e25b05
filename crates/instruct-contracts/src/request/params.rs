use super::numeric::{parse_leading_float, parse_leading_int};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterName {
    MaxNewTokens,
    Temperature,
    TopP,
    RepetitionPenalty,
    FrequencyPenalty,
    PresencePenalty,
}

impl ParameterName {
    pub const ALL: [Self; 6] = [
        Self::MaxNewTokens,
        Self::Temperature,
        Self::TopP,
        Self::RepetitionPenalty,
        Self::FrequencyPenalty,
        Self::PresencePenalty,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::MaxNewTokens => "max_new_tokens",
            Self::Temperature => "temperature",
            Self::TopP => "top_p",
            Self::RepetitionPenalty => "repetition_penalty",
            Self::FrequencyPenalty => "frequency_penalty",
            Self::PresencePenalty => "presence_penalty",
        }
    }

    /// Accepts the wire name, with `-` allowed in place of `_`.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|param| param.wire_name() == normalized)
    }
}

/// Values a fresh form is filled with, and what "reset" restores.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingDefaults {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub system_prompt: String,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            max_new_tokens: 1000,
            temperature: 0.6,
            top_p: 0.95,
            repetition_penalty: 1.2,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            system_prompt: String::new(),
        }
    }
}

/// Parameter fields exactly as the user typed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParameters {
    pub max_new_tokens: String,
    pub temperature: String,
    pub top_p: String,
    pub repetition_penalty: String,
    pub frequency_penalty: String,
    pub presence_penalty: String,
}

impl RawParameters {
    pub fn from_defaults(defaults: &SamplingDefaults) -> Self {
        Self {
            max_new_tokens: defaults.max_new_tokens.to_string(),
            temperature: defaults.temperature.to_string(),
            top_p: defaults.top_p.to_string(),
            repetition_penalty: defaults.repetition_penalty.to_string(),
            frequency_penalty: defaults.frequency_penalty.to_string(),
            presence_penalty: defaults.presence_penalty.to_string(),
        }
    }

    pub fn get(&self, name: ParameterName) -> &str {
        match name {
            ParameterName::MaxNewTokens => &self.max_new_tokens,
            ParameterName::Temperature => &self.temperature,
            ParameterName::TopP => &self.top_p,
            ParameterName::RepetitionPenalty => &self.repetition_penalty,
            ParameterName::FrequencyPenalty => &self.frequency_penalty,
            ParameterName::PresencePenalty => &self.presence_penalty,
        }
    }

    pub fn set(&mut self, name: ParameterName, value: impl Into<String>) {
        let slot = match name {
            ParameterName::MaxNewTokens => &mut self.max_new_tokens,
            ParameterName::Temperature => &mut self.temperature,
            ParameterName::TopP => &mut self.top_p,
            ParameterName::RepetitionPenalty => &mut self.repetition_penalty,
            ParameterName::FrequencyPenalty => &mut self.frequency_penalty,
            ParameterName::PresencePenalty => &mut self.presence_penalty,
        };
        *slot = value.into();
    }

    pub fn entries(&self) -> Vec<(ParameterName, String)> {
        ParameterName::ALL
            .into_iter()
            .map(|name| (name, self.get(name).to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParameters {
    pub max_new_tokens: Option<i64>,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub system_prompt: String,
    pub reply_prefix: String,
}

impl GenerationParameters {
    pub fn coerce(raw: &RawParameters, system_prompt: &str, reply_prefix: &str) -> Self {
        Self {
            max_new_tokens: parse_leading_int(&raw.max_new_tokens),
            temperature: parse_leading_float(&raw.temperature),
            top_p: parse_leading_float(&raw.top_p),
            repetition_penalty: parse_leading_float(&raw.repetition_penalty),
            frequency_penalty: parse_leading_float(&raw.frequency_penalty),
            presence_penalty: parse_leading_float(&raw.presence_penalty),
            system_prompt: system_prompt.to_string(),
            reply_prefix: reply_prefix.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationParameters, ParameterName, RawParameters, SamplingDefaults};

    #[test]
    fn parameter_names_accept_wire_and_dashed_forms() {
        assert_eq!(ParameterName::parse("top_p"), Some(ParameterName::TopP));
        assert_eq!(
            ParameterName::parse("Repetition-Penalty"),
            Some(ParameterName::RepetitionPenalty)
        );
        assert_eq!(ParameterName::parse("seed"), None);
    }

    #[test]
    fn defaults_round_trip_through_raw_fields() {
        let raw = RawParameters::from_defaults(&SamplingDefaults::default());
        assert_eq!(raw.max_new_tokens, "1000");
        assert_eq!(raw.temperature, "0.6");
        assert_eq!(raw.frequency_penalty, "0");

        let params = GenerationParameters::coerce(&raw, "", "");
        assert_eq!(params.max_new_tokens, Some(1000));
        assert_eq!(params.temperature, 0.6);
        assert_eq!(params.top_p, 0.95);
        assert_eq!(params.repetition_penalty, 1.2);
        assert_eq!(params.presence_penalty, 0.0);
    }

    #[test]
    fn coercion_passes_bad_fields_through() {
        let mut raw = RawParameters::from_defaults(&SamplingDefaults::default());
        raw.set(ParameterName::TopP, "high");
        raw.set(ParameterName::MaxNewTokens, "");
        let params = GenerationParameters::coerce(&raw, "sys", "prefix");
        assert!(params.top_p.is_nan());
        assert_eq!(params.max_new_tokens, None);
        assert_eq!(params.system_prompt, "sys");
        assert_eq!(params.reply_prefix, "prefix");
    }

    #[test]
    fn entries_follow_wire_order() {
        let raw = RawParameters::from_defaults(&SamplingDefaults::default());
        let names = raw
            .entries()
            .into_iter()
            .map(|(name, _)| name.wire_name())
            .collect::<Vec<&str>>();
        assert_eq!(
            names,
            vec![
                "max_new_tokens",
                "temperature",
                "top_p",
                "repetition_penalty",
                "frequency_penalty",
                "presence_penalty"
            ]
        );
    }
}
