//! Review API client.
//!
//! Every way a poll request can fail on the wire (connection errors, 4xx,
//! 5xx, unreadable body) collapses into `RelayError::InterceptedRequest`.
//! Only a body that arrives intact but is not JSON is reported separately.

use serde_json::Value;
use tracing::debug;

use crate::error::{RelayError, Result};

/// Source of homework statuses.
pub trait ReviewApi {
    /// Fetch statuses changed since `from_date` (Unix seconds).
    fn homework_statuses(&self, from_date: i64) -> Result<Value>;
}

/// Blocking client for the Practicum homework status endpoint.
pub struct PracticumClient {
    agent: ureq::Agent,
    endpoint: String,
    token: String,
}

impl PracticumClient {
    pub fn new(agent: ureq::Agent, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            agent,
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }
}

impl ReviewApi for PracticumClient {
    fn homework_statuses(&self, from_date: i64) -> Result<Value> {
        debug!(endpoint = %self.endpoint, from_date, "polling review API");

        let response = self
            .agent
            .get(&self.endpoint)
            .set("Authorization", &format!("OAuth {}", self.token))
            .query("from_date", &from_date.to_string())
            .call();

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(status_failure(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(RelayError::InterceptedRequest(transport.to_string()));
            }
        };

        let body = response
            .into_string()
            .map_err(|e| RelayError::InterceptedRequest(format!("failed to read body: {e}")))?;
        decode_body(&body)
    }
}

/// Map a 4xx/5xx status code to the request failure it represents.
pub fn status_failure(code: u16) -> RelayError {
    let message = if code >= 500 {
        format!("endpoint unavailable, API response code: {code}")
    } else {
        format!("request to endpoint failed, API response code: {code}")
    };
    RelayError::InterceptedRequest(message)
}

pub fn decode_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| RelayError::Serialization(e.to_string()))
}
