//! Error types for the request client.
//!
//! # Design
//! `ApiError` is what listeners and callers see. `Unauthorized` and
//! `NoConnection` get dedicated variants because callers react to them
//! differently (logout flow, offline banner). Everything else the transport
//! reports is wrapped unchanged in `Other`.

use thiserror::Error;

/// Terminal failure of a single request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The target address could not be made transmittable. Raised before any
    /// network I/O.
    #[error("could not encode request address: {0}")]
    EncodingFailure(String),

    /// The server answered with the unauthorized status code.
    #[error("unauthorized")]
    Unauthorized,

    /// The transport could not reach the server.
    #[error("no internet connection")]
    NoConnection,

    /// Any other transport or decoding failure.
    #[error(transparent)]
    Other(#[from] TransportError),
}

impl ApiError {
    /// Map a transport failure to the caller-facing taxonomy. Connectivity
    /// failures collapse into `NoConnection`, the rest pass through.
    pub fn from_transport(err: TransportError) -> Self {
        if err.is_connectivity() {
            ApiError::NoConnection
        } else {
            ApiError::Other(err)
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Failures reported by a `Transport` or while decoding its response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// DNS lookup, TCP connect or socket I/O failed.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body is not valid JSON.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}
