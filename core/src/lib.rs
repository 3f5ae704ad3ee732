//! Single-shot API request client.
//!
//! # Overview
//! A request is configured with `RequestBuilder`, frozen into a
//! `RequestSpec`, and executed by `ApiClient` exactly once: the client
//! prepares the `HttpRequest`, hands it to an injected `Transport`, and
//! yields a single outcome, either as a future (`send`) or to one listener
//! (`subscribe`).
//!
//! # Design
//! - `ApiClient` holds collaborators only: transport, loading indicator,
//!   unauthorized hook. Tests substitute any of them.
//! - Request preparation is pure (`RequestSpec::prepare`), so encoding rules
//!   are testable without a network.
//! - GET and HEAD parameters go in the query string, all other methods send a
//!   JSON body.
//! - A 401 is always `ApiError::Unauthorized`; connectivity failures are
//!   always `ApiError::NoConnection`.
//! - The loading indicator is stopped by a scoped guard, so it stops on
//!   success, failure and cancellation alike.

pub mod client;
pub mod config;
pub mod encoding;
pub mod error;
pub mod http;
pub mod indicator;
pub mod request;
pub mod transport;

pub use client::{
    ApiClient, ApiClientBuilder, Outcome, Subscription, UnauthorizedHook, UNAUTHORIZED_STATUS,
};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ParameterEncoding, UnknownMethod};
pub use indicator::{LoadingIndicator, NoopIndicator};
pub use request::{Parameters, RequestBuilder, RequestSpec};
pub use transport::{Transport, UreqTransport};
