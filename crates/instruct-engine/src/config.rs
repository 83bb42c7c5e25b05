use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use instruct_contracts::request::SamplingDefaults;
use tracing::warn;

pub const DEFAULT_WEBSOCKET_URL: &str = "ws://127.0.0.1:8000/ws";

const READ_TIMEOUT_MS_DEFAULT: u64 = 200;
const CANCEL_TIMEOUT_MS_DEFAULT: u64 = 10_000;

/// Explicit values from the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub websocket_url: Option<String>,
    pub abort_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub websocket_url: String,
    pub abort_url: String,
    pub read_timeout: Duration,
    pub cancel_timeout: Duration,
    pub defaults: SamplingDefaults,
}

impl ClientConfig {
    pub fn from_env(overrides: &ConfigOverrides) -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok(), overrides)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let non_empty_override = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let websocket_url = non_empty_override(&overrides.websocket_url)
            .or_else(|| non_empty("INSTRUCT_WEBSOCKET_URL"))
            .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
        validate_websocket_url(&websocket_url)?;

        let abort_url = match non_empty_override(&overrides.abort_url)
            .or_else(|| non_empty("INSTRUCT_ABORT_URL"))
        {
            Some(url) => {
                reqwest::Url::parse(&url).with_context(|| format!("invalid abort url '{url}'"))?;
                url
            }
            None => derive_abort_url(&websocket_url)?,
        };

        let fallback = SamplingDefaults::default();
        let defaults = SamplingDefaults {
            max_new_tokens: parse_or(
                "INSTRUCT_DEFAULT_MAX_NEW_TOKENS",
                non_empty("INSTRUCT_DEFAULT_MAX_NEW_TOKENS"),
                fallback.max_new_tokens,
            ),
            temperature: parse_float_or(
                "INSTRUCT_DEFAULT_TEMPERATURE",
                non_empty("INSTRUCT_DEFAULT_TEMPERATURE"),
                fallback.temperature,
            ),
            top_p: parse_float_or(
                "INSTRUCT_DEFAULT_TOP_P",
                non_empty("INSTRUCT_DEFAULT_TOP_P"),
                fallback.top_p,
            ),
            repetition_penalty: parse_float_or(
                "INSTRUCT_DEFAULT_REPETITION_PENALTY",
                non_empty("INSTRUCT_DEFAULT_REPETITION_PENALTY"),
                fallback.repetition_penalty,
            ),
            frequency_penalty: parse_float_or(
                "INSTRUCT_DEFAULT_FREQUENCY_PENALTY",
                non_empty("INSTRUCT_DEFAULT_FREQUENCY_PENALTY"),
                fallback.frequency_penalty,
            ),
            presence_penalty: parse_float_or(
                "INSTRUCT_DEFAULT_PRESENCE_PENALTY",
                non_empty("INSTRUCT_DEFAULT_PRESENCE_PENALTY"),
                fallback.presence_penalty,
            ),
            // Whitespace is meaningful in a system prompt.
            system_prompt: lookup("INSTRUCT_DEFAULT_SYSTEM_PROMPT").unwrap_or_default(),
        };

        let read_timeout_ms = parse_or(
            "INSTRUCT_READ_TIMEOUT_MS",
            non_empty("INSTRUCT_READ_TIMEOUT_MS"),
            READ_TIMEOUT_MS_DEFAULT,
        )
        .clamp(10, 5000);
        let cancel_timeout_ms = parse_or(
            "INSTRUCT_CANCEL_TIMEOUT_MS",
            non_empty("INSTRUCT_CANCEL_TIMEOUT_MS"),
            CANCEL_TIMEOUT_MS_DEFAULT,
        )
        .clamp(100, 60_000);

        Ok(Self {
            websocket_url,
            abort_url,
            read_timeout: Duration::from_millis(read_timeout_ms),
            cancel_timeout: Duration::from_millis(cancel_timeout_ms),
            defaults,
        })
    }
}

fn validate_websocket_url(raw: &str) -> Result<()> {
    let url = reqwest::Url::parse(raw).with_context(|| format!("invalid websocket url '{raw}'"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("websocket url must use ws:// or wss://, got '{raw}'");
    }
    Ok(())
}

/// Same host and base path as the stream with the last path segment replaced
/// by `abort`, http(s) scheme.
pub fn derive_abort_url(websocket_url: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(websocket_url.trim())
        .with_context(|| format!("invalid websocket url '{websocket_url}'"))?;
    let scheme = match url.scheme() {
        "wss" => "https".to_string(),
        "ws" => "http".to_string(),
        other => other.to_string(),
    };
    if url.set_scheme(&scheme).is_err() {
        bail!("cannot derive an abort url from '{websocket_url}'");
    }
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().pop().push("abort");
        }
        Err(()) => bail!("cannot derive an abort url from '{websocket_url}'"),
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            default
        }
    }
}

fn parse_float_or(key: &str, raw: Option<String>, default: f64) -> f64 {
    let value = parse_or(key, raw, default);
    if value.is_finite() {
        value
    } else {
        warn!(key, "ignoring non-finite setting");
        default
    }
}
