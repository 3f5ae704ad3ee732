//! Transport seam and the default `ureq`-backed implementation.
//!
//! # Design
//! `ApiClient` never talks to the network itself. It hands a prepared
//! `HttpRequest` to an injected `Transport` and interprets the returned
//! `HttpResponse`. Non-2xx statuses are returned as data, only failures to
//! complete an exchange are `TransportError`s.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Executes one HTTP exchange.
///
/// Dropping the returned future must abandon the exchange; that is how the
/// client cancels an in-flight call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking `ureq` agent driven from Tokio's blocking pool.
///
/// Cancellation is cooperative: an aborted call discards its result but the
/// socket work already on the blocking pool runs to completion.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout))
            .build()
            .new_agent();
        Self {
            agent,
            timeout: config.timeout,
        }
    }

    /// Overall deadline applied to each exchange.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
            .await
            .map_err(|e| TransportError::Request(format!("transport task failed: {e}")))?
    }
}

fn execute_blocking(agent: &ureq::Agent, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let mut builder = ureq::http::Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let result = match request.body {
        Some(body) => {
            let req = builder.body(body).map_err(|e| TransportError::Request(e.to_string()))?;
            agent.run(req)
        }
        None => {
            let req = builder.body(()).map_err(|e| TransportError::Request(e.to_string()))?;
            agent.run(req)
        }
    };
    let mut response = result.map_err(classify)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_string().map_err(classify)?;
    debug!(status, bytes = body.len(), "response received");

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Sort `ureq` failures into connectivity and everything else.
fn classify(err: ureq::Error) -> TransportError {
    match &err {
        ureq::Error::Timeout(_) => TransportError::Timeout(err.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
            TransportError::Connect(err.to_string())
        }
        _ => TransportError::Request(err.to_string()),
    }
}
