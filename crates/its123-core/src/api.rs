//! Typed access to the 123test API
//!
//! Builds requests for every endpoint the engine uses, enforces the request
//! timeout and turns responses into domain types. Nothing here retries; the
//! instrument state machine decides which calls are worth repeating.

use crate::config::ClientConfig;
use crate::error::{ClientError, ProtocolError};
use crate::transport::{ApiRequest, ApiResponse, HttpClient, TransportError};
use crate::types::{FormData, InstrumentResponse, Product, ReportMeta, ResourceManifest};
use std::sync::Arc;

/// Header names of the API
pub mod headers {
    /// API key, sent with every request
    pub const API_KEY: &str = "X-123test-ApiKey";
    /// Product to request
    pub const PRODUCT_ID: &str = "X-123test-ProductId";
    /// Respondent UUID
    pub const RESPONDENT: &str = "X-123test-Respondent";
    /// Instrument access code
    pub const INSTRUMENT_RUN: &str = "X-123test-InstrumentRun";
    /// Instrument status (response)
    pub const INSTRUMENT_STATUS: &str = "X-123test-InstrumentStatus";
    /// Resource manifest (response)
    pub const RESOURCES: &str = "X-123test-Resources";
}

/// API client over an [`HttpClient`]
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    http: Arc<dyn HttpClient>,
}

impl ApiClient {
    /// Create client
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, http: Arc<dyn HttpClient>) -> Self {
        Self { config, http }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Request a product run
    ///
    /// `user` is forwarded as respondent only when it is a hyphenated UUID.
    ///
    /// # Errors
    /// Network, timeout or body decoding failures
    pub async fn request_product(&self, product_id: &str, user: &str) -> Result<Product, ClientError> {
        let mut request = self
            .get(format!("{}/product/request-product", self.config.endpoint()))
            .header("Content-Type", "application/json")
            .header(headers::PRODUCT_ID, product_id);

        if is_respondent_id(user) {
            request = request.header(headers::RESPONDENT, user);
        }

        let response = self.execute(request).await?;
        parse_product(&response.body)
    }

    /// Overview of a running product
    ///
    /// # Errors
    /// Network, timeout or body decoding failures
    pub async fn request_product_info(&self, access_code: &str) -> Result<Product, ClientError> {
        let request = self
            .get(format!(
                "{}/product/{access_code}/overview",
                self.config.endpoint()
            ))
            .header("Content-Type", "application/json");

        let response = self.execute(request).await?;
        parse_product(&response.body)
    }

    /// Fetch the current page of an instrument
    ///
    /// # Errors
    /// Network, timeout or header decoding failures
    pub async fn request_instrument(&self, access_code: &str) -> Result<InstrumentResponse, ClientError> {
        let request = self
            .get(self.next_items_url())
            .header("Cache-Control", "no-cache")
            .header(headers::INSTRUMENT_RUN, access_code);

        let response = self.execute(request).await?;
        Ok(parse_instrument(response)?)
    }

    /// Submit answers of the current page
    ///
    /// # Errors
    /// Network, timeout or header decoding failures
    pub async fn submit_instrument(
        &self,
        access_code: &str,
        form: &FormData,
    ) -> Result<InstrumentResponse, ClientError> {
        let request = ApiRequest::post(self.next_items_url(), form.clone())
            .header(headers::API_KEY, &self.config.api_key)
            .header("Cache-Control", "no-cache")
            .header(headers::INSTRUMENT_RUN, access_code);

        let response = self.execute(request).await?;
        Ok(parse_instrument(response)?)
    }

    /// Fetch rendered report HTML
    ///
    /// # Errors
    /// Network or timeout failures
    pub async fn request_report(
        &self,
        access_code: &str,
        meta: Option<&ReportMeta>,
    ) -> Result<String, ClientError> {
        let mut url = self.report_url(access_code);
        if let Some(meta) = meta.filter(|m| m.is_complete()) {
            url = format!("{url}?meta={}&meta_hmac={}", meta.data, meta.hmac);
        }

        let response = self.execute(self.get(url)).await?;
        Ok(response.body)
    }

    /// URL of a report
    #[must_use]
    pub fn report_url(&self, access_code: &str) -> String {
        format!("{}/report/{access_code}", self.config.endpoint())
    }

    fn next_items_url(&self) -> String {
        format!("{}/instrument/next-items", self.config.endpoint())
    }

    fn get(&self, url: String) -> ApiRequest {
        ApiRequest::get(url).header(headers::API_KEY, &self.config.api_key)
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let timeout = self.config.request_timeout();
        let timeout_ms = self.config.request_timeout_ms;
        let url = request.url.clone();
        tracing::debug!(method = request.method.as_str(), url = %url, "api request");

        let response = match tokio::time::timeout(timeout, self.http.send(request)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                tracing::warn!(url = %url, timeout_ms, "api request timed out");
                return Err(ClientError::Timeout { timeout_ms });
            }
            Ok(Err(TransportError::Connection(message))) => {
                return Err(ClientError::Transport(message));
            }
            Ok(Ok(response)) => response,
        };

        check_status(response, &url)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("endpoint", &self.config.endpoint())
            .finish_non_exhaustive()
    }
}

fn is_respondent_id(user: &str) -> bool {
    user.len() == 36 && uuid::Uuid::parse_str(user).is_ok()
}

fn check_status(response: ApiResponse, url: &str) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        return Ok(response);
    }

    let message = if response.status_text.is_empty() {
        url.to_string()
    } else {
        format!("{} {url}", response.status_text)
    };
    Err(ClientError::network(response.status, message))
}

fn parse_product(body: &str) -> Result<Product, ClientError> {
    serde_json::from_str(body)
        .map_err(|e| ProtocolError::InvalidBody(format!("product: {e}")).into())
}

fn parse_instrument(response: ApiResponse) -> Result<InstrumentResponse, ProtocolError> {
    let status = response
        .header(headers::INSTRUMENT_STATUS)
        .ok_or(ProtocolError::MissingHeader(headers::INSTRUMENT_STATUS))?
        .to_string();

    let resources = match response.header(headers::RESOURCES).map(str::trim) {
        None | Some("" | "null") => ResourceManifest::new(),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ProtocolError::InvalidManifest(e.to_string()))?,
    };

    Ok(InstrumentResponse {
        body: response.body,
        status,
        resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct StubHttp {
        responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
        requests: Mutex<Vec<ApiRequest>>,
        stall: bool,
    }

    impl StubHttp {
        fn replying(response: ApiResponse) -> Arc<Self> {
            let stub = Self::default();
            stub.responses.lock().push_back(Ok(response));
            Arc::new(stub)
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for StubHttp {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().push(request);
            if self.stall {
                std::future::pending::<()>().await;
            }
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Err(TransportError::Connection("no response".into())))
        }
    }

    fn client(http: Arc<StubHttp>) -> ApiClient {
        ApiClient::new(Arc::new(ClientConfig::new("key")), http)
    }

    const PRODUCT_JSON: &str = r#"{"slots":{"instruments":[{"access_code":"I1"}]},"reports":[],"product_access_code":"PA"}"#;

    #[tokio::test]
    async fn product_request_headers() {
        let http = StubHttp::replying(ApiResponse::new(200, PRODUCT_JSON));
        let api = client(Arc::clone(&http));

        let user = "123e4567-e89b-12d3-a456-426614174000";
        let product = api.request_product("P1", user).await.unwrap();
        assert_eq!(product.product_access_code, "PA");

        let requests = http.requests.lock();
        let req = &requests[0];
        assert_eq!(req.url, "https://api.123test.com/v2/product/request-product");
        assert_eq!(req.header_value(headers::API_KEY), Some("key"));
        assert_eq!(req.header_value(headers::PRODUCT_ID), Some("P1"));
        assert_eq!(req.header_value(headers::RESPONDENT), Some(user));
    }

    #[tokio::test]
    async fn short_user_is_not_sent_as_respondent() {
        let http = StubHttp::replying(ApiResponse::new(200, PRODUCT_JSON));
        let api = client(Arc::clone(&http));

        api.request_product("P1", "u1").await.unwrap();
        assert!(http.requests.lock()[0].header_value(headers::RESPONDENT).is_none());
    }

    #[tokio::test]
    async fn instrument_headers_are_decoded() {
        let http = StubHttp::replying(
            ApiResponse::new(200, "<form></form>")
                .with_header(headers::INSTRUMENT_STATUS, "in-progress")
                .with_header(
                    headers::RESOURCES,
                    r#"{"main":{"type":"js","path":"/main.js","func":"initMain"}}"#,
                ),
        );
        let api = client(http);

        let page = api.request_instrument("I1").await.unwrap();
        assert_eq!(page.status, "in-progress");
        assert_eq!(page.body, "<form></form>");
        assert_eq!(page.resources["main"].func.as_deref(), Some("initMain"));
    }

    #[tokio::test]
    async fn missing_manifest_means_no_resources() {
        let http = StubHttp::replying(
            ApiResponse::new(200, "").with_header(headers::INSTRUMENT_STATUS, "ended-items"),
        );
        let page = client(http).request_instrument("I1").await.unwrap();
        assert!(page.resources.is_empty());
    }

    #[tokio::test]
    async fn missing_status_header_is_protocol_error() {
        let http = StubHttp::replying(ApiResponse::new(200, ""));
        let err = client(http).request_instrument("I1").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::MissingHeader(_))
        ));
    }

    #[tokio::test]
    async fn non_success_maps_to_network_error() {
        let http = StubHttp::replying(ApiResponse::new(403, "").with_status_text("Forbidden"));
        let err = client(http).request_product("P1", "").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("Forbidden"));
    }

    #[tokio::test]
    async fn report_meta_only_when_complete() {
        let http = Arc::new(StubHttp::default());
        http.responses.lock().push_back(Ok(ApiResponse::new(200, "a")));
        http.responses.lock().push_back(Ok(ApiResponse::new(200, "b")));
        let api = client(Arc::clone(&http));

        api.request_report("R1", Some(&ReportMeta::new("abc", "")))
            .await
            .unwrap();
        api.request_report("R1", Some(&ReportMeta::new("abc", "def")))
            .await
            .unwrap();

        let requests = http.requests.lock();
        assert_eq!(requests[0].url, "https://api.123test.com/v2/report/R1");
        assert_eq!(
            requests[1].url,
            "https://api.123test.com/v2/report/R1?meta=abc&meta_hmac=def"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_times_out_as_408() {
        let http = Arc::new(StubHttp {
            stall: true,
            ..StubHttp::default()
        });
        let config = ClientConfig::new("key").with_timeout(Duration::from_millis(50));
        let api = ApiClient::new(Arc::new(config), http);

        let err = api.request_instrument("I1").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { timeout_ms: 50 }));
        assert_eq!(err.status(), Some(408));
    }

    #[tokio::test]
    async fn submission_posts_form() {
        let http = StubHttp::replying(
            ApiResponse::new(200, "").with_header(headers::INSTRUMENT_STATUS, "ended-items"),
        );
        let api = client(Arc::clone(&http));

        let form = FormData::new().with_field("q1", "2");
        api.submit_instrument("I1", &form).await.unwrap();

        let requests = http.requests.lock();
        assert_eq!(requests[0].method, crate::transport::Method::Post);
        assert_eq!(requests[0].form.as_ref(), Some(&form));
        assert_eq!(requests[0].header_value(headers::INSTRUMENT_RUN), Some("I1"));
    }
}
