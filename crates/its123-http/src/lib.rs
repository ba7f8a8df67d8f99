//! its123 HTTP - reqwest transport
//!
//! Implements [`HttpClient`] on top of a shared [`reqwest::Client`].
//! Responses are returned whatever their status; status mapping and the
//! request timeout are handled by `its123-core`.

#![warn(unreachable_pub)]

use its123_core::{ApiRequest, ApiResponse, HttpClient, Method, TransportError};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("its123-client/", env!("CARGO_PKG_VERSION"));

/// [`HttpClient`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create client with default settings
    ///
    /// # Errors
    /// `TransportError::Connection` if the TLS backend cannot be initialized
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(map_error)?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form.fields());
        }

        let response = builder.send().await.map_err(map_error)?;
        let status = response.status();
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
        let body = response.text().await.map_err(map_error)?;

        tracing::debug!(
            method = request.method.as_str(),
            url = %request.url,
            status = status.as_u16(),
            "http response"
        );

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(error.to_string())
    }
}
