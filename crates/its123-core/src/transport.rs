//! HTTP transport capability
//!
//! The engine never talks to the network directly. It builds an
//! [`ApiRequest`] and hands it to an [`HttpClient`] implementation; the
//! reqwest adapter lives in `its123-http`, tests use scripted fakes.

use crate::types::FormData;
use std::collections::HashMap;

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read
    Get,
    /// Instrument submission
    Post,
}

impl Method {
    /// Method name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Form body for submissions
    pub form: Option<FormData>,
}

impl ApiRequest {
    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            form: None,
        }
    }

    /// POST request with form body
    pub fn post(url: impl Into<String>, form: FormData) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            form: Some(form),
        }
    }

    /// With header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL path without scheme, host and query
    #[must_use]
    pub fn path(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let path = without_scheme
            .find('/')
            .map_or("/", |i| &without_scheme[i..]);
        path.split('?').next().unwrap_or(path)
    }
}

/// Response as seen by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Headers keyed by lowercase name
    pub headers: HashMap<String, String>,
    /// Body text
    pub body: String,
}

impl ApiResponse {
    /// Response with status and body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// With header; the name is stored lowercase
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// With reason phrase
    #[must_use]
    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    /// Header by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Status in the 2xx range
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport failure without an HTTP response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Transport-level timeout
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established or broke off
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Performs HTTP requests
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request` and return the response, whatever its status
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_path_strips_host_and_query() {
        let req = ApiRequest::get("https://api.123test.com/v2/report/R1?meta=a&meta_hmac=b");
        assert_eq!(req.path(), "/v2/report/R1");
        assert_eq!(ApiRequest::get("https://api.123test.com").path(), "/");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = ApiRequest::get("https://x/y").header("X-123test-ApiKey", "k");
        assert_eq!(req.header_value("x-123test-apikey"), Some("k"));

        let resp = ApiResponse::new(200, "").with_header("X-123test-InstrumentStatus", "started");
        assert_eq!(resp.header("x-123TEST-instrumentstatus"), Some("started"));
        assert!(resp.is_success());
    }
}
