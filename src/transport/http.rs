//! HTTP Transport
//!
//! reqwest-backed implementation of `Transport` against a REST service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::cache::{normalize_path, QueryParams};
use crate::error::{TransportError, TransportResult};
use crate::queue::Operation;
use crate::transport::{Ack, Transport};

/// Talks to the remote service at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    probe_path: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, probe_path: &str, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unreachable(format!("cannot build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_path: normalize_path(probe_path),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, normalize_path(endpoint))
    }
}

/// HTTP method a queued operation is replayed with.
pub(crate) fn method_for(operation: Operation) -> Method {
    match operation {
        Operation::Create => Method::POST,
        Operation::Update => Method::PUT,
        Operation::Delete => Method::DELETE,
        Operation::Patch => Method::PATCH,
    }
}

/// Maps a non-success status onto the transport taxonomy.
pub(crate) fn classify_status(status: StatusCode, message: String) -> TransportError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => TransportError::Rejected(message),
        other => TransportError::Status {
            status: other.as_u16(),
            message,
        },
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() || err.is_request() {
        TransportError::Unreachable(err.to_string())
    } else if let Some(status) = err.status() {
        classify_status(status, err.to_string())
    } else {
        TransportError::Unreachable(err.to_string())
    }
}

async fn read_body(response: reqwest::Response) -> TransportResult<(StatusCode, Vec<u8>)> {
    let status = response.status();
    let body = response.bytes().await.map_err(classify_request_error)?;
    Ok((status, body.to_vec()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, endpoint: &str, params: &QueryParams) -> TransportResult<Vec<u8>> {
        let url = self.url(endpoint);
        debug!(%url, "fetching");

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(classify_request_error)?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(classify_status(status, String::from_utf8_lossy(&body).into_owned()));
        }
        Ok(body)
    }

    async fn dispatch(&self, operation: Operation, endpoint: &str, payload: &[u8]) -> TransportResult<Ack> {
        let url = self.url(endpoint);
        debug!(%url, %operation, "dispatching write");

        let mut request = self.client.request(method_for(operation), &url);
        if !payload.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.to_vec());
        }

        let response = request.send().await.map_err(classify_request_error)?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(classify_status(status, String::from_utf8_lossy(&body).into_owned()));
        }

        Ok(Ack {
            status: status.as_u16(),
            body,
        })
    }

    async fn probe(&self) -> TransportResult<()> {
        let url = self.url(&self.probe_path);
        self.client
            .head(&url)
            .send()
            .await
            .map_err(classify_request_error)?;
        // Any answer at all means the service is reachable
        Ok(())
    }
}
