//! HTTP transport types exchanged with the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. `RequestSpec::prepare` produces a
//! fully encoded `HttpRequest`; a `Transport` implementation turns it into
//! bytes on the wire and hands back an `HttpResponse`. Non-2xx statuses are
//! data here, interpretation happens in `ApiClient`.
//!
//! All fields use owned types (`String`, `Vec`) so values can move into
//! spawned tasks without lifetime concerns.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Where parameters go for this method. GET and HEAD carry them in the
    /// query string, every other method in a JSON body.
    pub fn encoding(self) -> ParameterEncoding {
        match self {
            HttpMethod::Get | HttpMethod::Head => ParameterEncoding::Query,
            _ => ParameterEncoding::Json,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// Returned when parsing a method name that is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

/// How request parameters are attached to the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// `key=value` pairs appended to the URL query string.
    Query,
    /// A JSON object in the request body.
    Json,
}

/// An HTTP request described as plain data, ready for a `Transport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Render the request as a `curl` command line for debug logging.
    pub fn to_curl(&self) -> String {
        let mut parts = vec!["curl -v".to_string()];
        if self.method != HttpMethod::Get {
            parts.push(format!("-X {}", self.method));
        }
        for (name, value) in &self.headers {
            parts.push(format!("-H {}", shell_quote(&format!("{name}: {value}"))));
        }
        if let Some(body) = &self.body {
            parts.push(format!("-d {}", shell_quote(body)));
        }
        parts.push(shell_quote(&self.url));
        parts.join(" \\\n\t")
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Single-quote for POSIX shells; nothing inside single quotes expands.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
