//! Single-shot HTTP POST transport.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ApiError;

pub const USER_AGENT: &str = "llm-client";

/// Bound on a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Whole request, from connect to the last byte of the body.
    Total(Duration),
    /// Separate bounds on connecting and on each read.
    Split { connect: Duration, read: Duration },
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::Total(Duration::from_secs(30))
    }
}

/// Status and raw body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one POST. Network failures and timeouts are reported as
    /// [`ApiError::Transport`]; any HTTP status is returned as a response.
    async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: String,
        timeout: Timeout,
    ) -> Result<RawResponse, ApiError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_defaults() -> Result<Self, ApiError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::new(client))
    }

    /// Connect and read timeouts live on the client, so a split timeout gets
    /// its own client.
    fn client_for(&self, timeout: Timeout) -> Result<Client, ApiError> {
        match timeout {
            Timeout::Total(_) => Ok(self.client.clone()),
            Timeout::Split { connect, read } => Ok(Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(connect)
                .read_timeout(read)
                .build()?),
        }
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::Transport(format!("invalid header name '{}': {}", name, e)))?;
        let mut header_value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Transport(format!("invalid value for header '{}': {}", name, e)))?;
        if header_name == reqwest::header::AUTHORIZATION {
            header_value.set_sensitive(true);
        }
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, headers, body))]
    async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: String,
        timeout: Timeout,
    ) -> Result<RawResponse, ApiError> {
        let client = self.client_for(timeout)?;
        let mut request = client.post(url).headers(header_map(headers)?).body(body);
        if let Timeout::Total(total) = timeout {
            request = request.timeout(total);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("POST {} -> {} ({} bytes)", url, status, body.len());

        Ok(RawResponse { status, body })
    }
}
