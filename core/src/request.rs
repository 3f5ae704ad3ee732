//! Request configuration.
//!
//! # Design
//! `RequestBuilder` accumulates configuration through consuming setters and
//! yields an immutable `RequestSpec`. A spec is not `Clone`:
//! executing it consumes it, so one spec maps to exactly one network call
//! and one outcome.

use serde_json::{Map, Value};

use crate::encoding;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, ParameterEncoding};

/// Parameters attached to a request, encoded per `ParameterEncoding`.
pub type Parameters = Map<String, Value>;

/// Every request declares a JSON content type.
pub const CONTENT_TYPE: (&str, &str) = ("Content-Type", "application/json");

/// Immutable configuration of a single request.
#[derive(Debug, PartialEq)]
pub struct RequestSpec {
    target: String,
    method: HttpMethod,
    parameters: Option<Parameters>,
    show_indicator: bool,
}

impl RequestSpec {
    pub fn builder(target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(target)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    pub fn show_indicator(&self) -> bool {
        self.show_indicator
    }

    pub fn encoding(&self) -> ParameterEncoding {
        self.method.encoding()
    }

    /// Turn the configuration into a transport-ready `HttpRequest`.
    ///
    /// Performs no I/O. Fails with `EncodingFailure` when the target cannot be
    /// made into an absolute HTTP(S) URL.
    pub fn prepare(&self) -> Result<HttpRequest, ApiError> {
        let mut url = encoding::encode_address(&self.target)?;
        let mut body = None;
        if let Some(params) = &self.parameters {
            match self.encoding() {
                ParameterEncoding::Query => encoding::append_query(&mut url, params),
                ParameterEncoding::Json => body = Some(encoding::json_body(params)?),
            }
        }
        Ok(HttpRequest {
            method: self.method,
            url: url.into(),
            headers: vec![(CONTENT_TYPE.0.to_string(), CONTENT_TYPE.1.to_string())],
            body,
        })
    }
}

/// Fluent builder for `RequestSpec`.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    target: String,
    method: HttpMethod,
    parameters: Option<Parameters>,
    show_indicator: bool,
}

impl RequestBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Replace the destination address. Not validated until execution.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Replace all parameters.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Insert a single parameter, keeping any already set.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether the loading indicator runs while the request is in flight.
    pub fn show_indicator(mut self, show: bool) -> Self {
        self.show_indicator = show;
        self
    }

    pub fn build(self) -> RequestSpec {
        RequestSpec {
            target: self.target,
            method: self.method,
            parameters: self.parameters,
            show_indicator: self.show_indicator,
        }
    }
}
