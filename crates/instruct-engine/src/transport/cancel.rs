use std::time::Duration;

use anyhow::{Context, Result};
use instruct_contracts::protocol::{cancel_body, RequestId};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

use super::{CancelOutcome, TransportError};

/// Posts `{"task_id": ..}` to the abort endpoint, independent of the stream.
#[derive(Debug, Clone)]
pub struct HttpCanceller {
    http: HttpClient,
    abort_url: String,
}

impl HttpCanceller {
    pub fn new(abort_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build cancel http client")?;
        Ok(Self {
            http,
            abort_url: abort_url.into(),
        })
    }

    pub fn abort_url(&self) -> &str {
        &self.abort_url
    }

    pub fn cancel(&self, task_id: &RequestId) -> Result<CancelOutcome, TransportError> {
        let response = self
            .http
            .post(&self.abort_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&cancel_body(task_id))
            .send()
            .map_err(|err| {
                TransportError::cancel(format!("abort request to {} failed: {err}", self.abort_url))
            })?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Ok(CancelOutcome { status, body })
    }
}
