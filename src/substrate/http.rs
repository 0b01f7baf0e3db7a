//! HTTP calls (`call: http`)
//!
//! Status handling:
//! - 2xx: success, shaped by `output`
//! - 3xx (redirects not followed) and 4xx: non-retryable `HttpStatus`
//! - 5xx: retryable `HttpStatus`

use std::time::Duration;

use base64::Engine;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::ast::{HttpCall, HttpOutput};
use crate::error::{BraidError, Result};
use crate::util::constants::{CONNECT_TIMEOUT, REDIRECT_LIMIT};

/// Shared clients: one following redirects, one not
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    follow: Client,
    no_follow: Client,
}

impl HttpExecutor {
    pub fn new() -> Result<Self> {
        let build = |policy: reqwest::redirect::Policy| {
            Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .redirect(policy)
                .user_agent(concat!("braid/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| BraidError::ConfigError {
                    reason: format!("failed to build HTTP client: {e}"),
                })
        };
        Ok(Self {
            follow: build(reqwest::redirect::Policy::limited(REDIRECT_LIMIT))?,
            no_follow: build(reqwest::redirect::Policy::none())?,
        })
    }

    #[instrument(name = "http", skip_all, fields(method = %call.method, endpoint = %call.endpoint.uri()))]
    pub async fn execute(&self, call: &HttpCall, timeout: Duration) -> Result<Value> {
        let endpoint = call.endpoint.uri();
        let identifier = format!("{} {}", call.method.to_uppercase(), endpoint);
        let method = Method::from_bytes(call.method.to_uppercase().as_bytes()).map_err(|e| {
            BraidError::CallFailed {
                call: identifier.clone(),
                reason: e.to_string(),
                retryable: false,
            }
        })?;

        let client = if call.redirect {
            &self.follow
        } else {
            &self.no_follow
        };
        let mut request = client.request(method, endpoint).timeout(timeout);

        for (name, value) in &call.headers {
            request = request.header(name.as_str(), scalar_string(value));
        }
        if !call.query.is_empty() {
            let query: Vec<(&str, String)> = call
                .query
                .iter()
                .map(|(k, v)| (k.as_str(), scalar_string(v)))
                .collect();
            request = request.query(&query);
        }
        request = match &call.body {
            Some(Value::String(body)) => request.body(body.clone()),
            Some(body) => request.json(body),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BraidError::CallTimeout {
                    call: identifier.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                BraidError::CallFailed {
                    call: identifier.clone(),
                    reason: e.to_string(),
                    retryable: !e.is_builder(),
                }
            }
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), "http response");
        if !status.is_success() {
            return Err(BraidError::HttpStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = header_map(response.headers());
        let body = response.bytes().await.map_err(|e| BraidError::CallFailed {
            call: identifier.clone(),
            reason: format!("failed to read body: {e}"),
            retryable: true,
        })?;

        Ok(match call.output {
            HttpOutput::Content => parse_content(&body),
            HttpOutput::Response => json!({
                "statusCode": status.as_u16(),
                "headers": headers,
                "content": parse_content(&body),
            }),
            HttpOutput::Raw => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(&body))
            }
        })
    }
}

/// JSON when the body parses, text otherwise
fn parse_content(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect()
}
