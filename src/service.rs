//! HTTP client of the audience targeting service.

use crate::{
    error::PushError,
    store::{ExpressionUpdate, TargetingService},
};
use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, HOST},
    StatusCode,
};
use serde::Deserialize;
use std::{iter, thread, time::Duration};
use tracing::{debug, warn};

const AUDIENCE_ID_PLACEHOLDER: &str = "{audience_id}";
const USER_ID_HEADER: &str = "x-user-id";

/// Backoff applied when the gateway in front of the service fails.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay_ms: 5_000,
            max_delay_ms: 40_000,
        }
    }
}

impl RetryPolicy {
    /// The successive delays to wait before each retry, doubling up to the maximum delay.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max_delay_ms = self.max_delay_ms;
        iter::successors(Some(self.initial_delay_ms.min(max_delay_ms)), move |delay| {
            Some(delay.saturating_mul(2).min(max_delay_ms))
        })
        .take(self.max_retries)
        .map(Duration::from_millis)
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Pushes rewritten expressions with `PUT {url}{path}`, where the path names the audience.
pub struct AudienceServiceClient {
    client: Client,
    url: String,
    path: String,
    retry: RetryPolicy,
}

impl AudienceServiceClient {
    pub fn new(
        url: &str,
        path: &str,
        user_id: &str,
        host: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, PushError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, header_value(user_id)?);
        if let Some(host) = host {
            headers.insert(HOST, header_value(host)?);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_owned(),
            path: path.to_owned(),
            retry,
        })
    }

    fn endpoint(&self, update: &ExpressionUpdate) -> String {
        let path = self
            .path
            .replace(AUDIENCE_ID_PLACEHOLDER, &update.entity_id.to_string());
        format!("{}{}", self.url, path)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, PushError> {
    HeaderValue::from_str(value).map_err(|_| PushError::InvalidHeader(value.to_owned()))
}

impl TargetingService for AudienceServiceClient {
    fn push_update(&self, update: &ExpressionUpdate) -> Result<(), PushError> {
        let endpoint = self.endpoint(update);
        let mut delays = self.retry.delays();

        loop {
            let response = self.client.put(&endpoint).json(&update.body()).send()?;
            let status = response.status();
            if status.is_success() {
                debug!(entity_id = %update.entity_id, %status, "pushed expression");
                return Ok(());
            }

            match delays.next() {
                Some(delay) if is_transient(status) => {
                    warn!(
                        entity_id = %update.entity_id,
                        %status,
                        delay_ms = delay.as_millis() as u64,
                        "targeting service unavailable, retrying"
                    );
                    thread::sleep(delay);
                }
                _ => {
                    return Err(PushError::Status {
                        status: status.as_u16(),
                        body: response.text().unwrap_or_default(),
                    });
                }
            }
        }
    }
}
