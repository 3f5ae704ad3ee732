//! Address and parameter encoding.
//!
//! # Design
//! Two character sets are involved. The address as a whole is escaped with
//! the URL-query-allowed set, so an already structured URL keeps its `/`,
//! `?` and `&` while spaces, `%`, `#` and non-ASCII text are escaped.
//! Individual query keys and values are escaped with the narrower RFC 3986
//! component set so a value can never inject a separator.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use url::Url;

use crate::error::ApiError;

/// Alphanumerics and `!$&'()*+,-./:;=?@_~` pass through unescaped.
const URL_QUERY_ALLOWED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// Unreserved characters plus `/` and `?`.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b'?');

/// Percent-encode `address` and validate it as an absolute HTTP(S) URL.
pub fn encode_address(address: &str) -> Result<Url, ApiError> {
    if address.is_empty() {
        return Err(ApiError::EncodingFailure("address is empty".to_string()));
    }
    let encoded = utf8_percent_encode(address, URL_QUERY_ALLOWED).to_string();
    let url = Url::parse(&encoded)
        .map_err(|e| ApiError::EncodingFailure(format!("{address}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::EncodingFailure(format!(
            "{address}: unsupported scheme {other}"
        ))),
    }
}

/// Append `params` to the query of `url`, after any query already present.
pub fn append_query(url: &mut Url, params: &Map<String, Value>) {
    let query = query_string(params);
    if query.is_empty() {
        return;
    }
    let combined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
        _ => query,
    };
    url.set_query(Some(&combined));
}

/// Serialize parameters as `key=value` pairs joined by `&`, keys sorted.
///
/// Objects nest as `key[sub]`, arrays repeat `key[]`, booleans become `1`/`0`
/// and null becomes an empty value.
pub fn query_string(params: &Map<String, Value>) -> String {
    let mut components = Vec::new();
    for (key, value) in sorted(params) {
        query_components(key, value, &mut components);
    }
    components
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn query_components(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (nested, value) in sorted(map) {
                query_components(&format!("{key}[{nested}]"), value, out);
            }
        }
        Value::Array(items) => {
            let key = format!("{key}[]");
            for value in items {
                query_components(&key, value, out);
            }
        }
        Value::Bool(b) => out.push((escape(key), if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => out.push((escape(key), escape(&n.to_string()))),
        Value::String(s) => out.push((escape(key), escape(s))),
        Value::Null => out.push((escape(key), String::new())),
    }
}

fn sorted(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn escape(s: &str) -> String {
    utf8_percent_encode(s, QUERY_COMPONENT).to_string()
}

/// Serialize parameters as a JSON object body.
pub fn json_body(params: &Map<String, Value>) -> Result<String, ApiError> {
    serde_json::to_string(params)
        .map_err(|e| ApiError::EncodingFailure(format!("parameters: {e}")))
}
