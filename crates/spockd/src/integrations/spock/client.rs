use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::InstanceConfig;
use crate::engine::RemoteStatus;

/// Why a poll produced no usable status
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("status API rejected the token (HTTP {status})")]
    Auth { status: u16 },

    #[error("status API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed status response: {reason}")]
    Format { reason: String, payload: String },

    #[error("status API unreachable: {0}")]
    Network(#[source] reqwest::Error),
}

impl PollError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PollError::Auth { .. })
    }
}

/// Source of the desired per-group actions
///
/// This trait allows for mocking the status API for testing purposes
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn poll(&self) -> Result<RemoteStatus, PollError>;
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    target_id: &'a str,
}

/// HTTP client for the remote status API
pub struct StatusClient {
    client: Client,
    url: String,
    token: String,
    target_id: Option<String>,
    groups: Vec<String>,
}

impl StatusClient {
    pub fn new(config: &InstanceConfig) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            url: config.status_url.clone(),
            token: config.api_token.clone(),
            target_id: config.target_id.clone(),
            groups: config.groups.keys().cloned().collect(),
        })
    }
}

#[async_trait]
impl StatusSource for StatusClient {
    async fn poll(&self) -> Result<RemoteStatus, PollError> {
        let request = match &self.target_id {
            Some(target_id) => self
                .client
                .post(&self.url)
                .json(&StatusRequest { target_id }),
            None => self.client.get(&self.url),
        };

        debug!("Polling status from {}", self.url);
        let response = request
            .header("X-Auth-Token", &self.token)
            .send()
            .await
            .map_err(PollError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(PollError::Network)?;
        trace!("Status response ({}): {}", status, body);

        match status {
            StatusCode::OK => RemoteStatus::parse(&body, self.groups.iter().map(String::as_str))
                .map_err(|reason| PollError::Format {
                    reason,
                    payload: body,
                }),
            StatusCode::FORBIDDEN => Err(PollError::Auth {
                status: status.as_u16(),
            }),
            status => Err(PollError::Http {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

/// Scripted status source for tests
#[cfg(test)]
#[derive(Default)]
pub struct MockStatusSource {
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<RemoteStatus, PollError>>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, groups: &[(&str, &str)]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(groups.iter().copied().collect()));
    }

    pub fn push_error(&self, error: PollError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl StatusSource for MockStatusSource {
    /// Pops the next scripted response; an exhausted script yields HTTP 503
    async fn poll(&self) -> Result<RemoteStatus, PollError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(PollError::Http {
                    status: 503,
                    body: "no scripted response".to_string(),
                })
            })
    }
}
