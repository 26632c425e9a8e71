//! Signed REST client for the WEEX contract API
//!
//! Every attempt gets a fresh timestamp and signature, runs through the retry
//! policy in [`super::retry`], and ends in an [`ApiResult`] rather than a
//! panic or an error escaping the client.

use super::api_errors::{ApiErrorKind, ApiFailure};
use super::retry::{with_retry, RetryConfig};
use super::signer::{canonical_query, sign};
use super::transport::{HttpMethod, HttpRequest, ReqwestTransport, Transport, TransportError};
use crate::config::{Credentials, ExchangeConfig};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Outcome of a client call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult {
    Success(Value),
    Failure(ApiFailure),
}

impl ApiResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResult::Success(_))
    }

    pub fn into_result(self) -> Result<Value, ApiFailure> {
        match self {
            ApiResult::Success(value) => Ok(value),
            ApiResult::Failure(failure) => Err(failure),
        }
    }
}

/// Authenticated HTTP client with bounded retry
pub struct SignedApiClient<T = ReqwestTransport> {
    transport: T,
    base_url: String,
    locale: String,
    credentials: Option<Credentials>,
    retry: RetryConfig,
    request_count: AtomicU64,
}

impl SignedApiClient<ReqwestTransport> {
    pub fn new(config: &ExchangeConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> SignedApiClient<T> {
    pub fn with_transport(config: &ExchangeConfig, transport: T) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            locale: config.locale.clone(),
            credentials: config.credentials.clone(),
            retry: RetryConfig {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay,
                max_delay: config.retry_max_delay,
            },
            request_count: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of HTTP attempts issued so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Signed GET
    pub async fn get(&self, path: &str, params: &[(String, String)]) -> ApiResult {
        self.request(HttpMethod::Get, path, params, None, true).await
    }

    /// Unsigned GET for public market data
    pub async fn get_public(&self, path: &str, params: &[(String, String)]) -> ApiResult {
        self.request(HttpMethod::Get, path, params, None, false).await
    }

    /// Signed POST with a JSON body
    pub async fn post(&self, path: &str, body: &Value) -> ApiResult {
        self.request(HttpMethod::Post, path, &[], Some(body), true).await
    }

    /// Issue a request with retry and backoff
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
        requires_signing: bool,
    ) -> ApiResult {
        if !path.starts_with('/') {
            return ApiResult::Failure(ApiFailure::new(
                ApiErrorKind::ClientError,
                format!("request path must start with '/': {:?}", path),
            ));
        }
        if requires_signing && self.credentials.is_none() {
            return ApiResult::Failure(ApiFailure::new(
                ApiErrorKind::AuthFailure,
                "no API credentials configured",
            ));
        }

        let query = canonical_query(params);
        let body = match (method, body) {
            (HttpMethod::Get, _) | (_, None) => String::new(),
            (_, Some(value)) => value.to_string(),
        };
        let label = format!("{} {}", method, path);
        let (query, body) = (query.as_str(), body.as_str());

        let outcome = with_retry(&self.retry, &label, |attempt| {
            self.attempt(method, path, query, body, requires_signing, attempt)
        })
        .await;

        match outcome {
            Ok(value) => ApiResult::Success(value),
            Err(failure) => {
                warn!("[API] {} failed: {}", label, failure);
                ApiResult::Failure(failure)
            }
        }
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        path: &str,
        query: &str,
        body: &str,
        requires_signing: bool,
        attempt: u32,
    ) -> Result<Value, ApiFailure> {
        let request_id = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        let request = self.prepare(method, path, query, body, requires_signing)?;

        debug!(
            "[API #{}] {} {}{} (attempt {})",
            request_id,
            method,
            path,
            query,
            attempt + 1
        );

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ApiFailure::new(ApiErrorKind::NetworkError, e.to_string()))?;

        debug!("[API #{}] HTTP {}", request_id, response.status);

        if !(200..300).contains(&response.status) {
            return Err(ApiFailure::from_response(response.status, &response.body));
        }

        match serde_json::from_str(&response.body) {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!("[API #{}] {} returned a non-JSON body", request_id, path);
                Ok(json!({ "rawText": response.body }))
            }
        }
    }

    fn prepare(
        &self,
        method: HttpMethod,
        path: &str,
        query: &str,
        body: &str,
        requires_signing: bool,
    ) -> Result<HttpRequest, ApiFailure> {
        let mut headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("locale", self.locale.clone()),
        ];

        if requires_signing {
            let credentials = self.credentials.as_ref().ok_or_else(|| {
                ApiFailure::new(ApiErrorKind::AuthFailure, "no API credentials configured")
            })?;
            let timestamp = Utc::now().timestamp_millis().to_string();
            let signature = sign(&credentials.secret, &timestamp, method, path, query, body)
                .map_err(|e| ApiFailure::new(ApiErrorKind::AuthFailure, e.to_string()))?;

            headers.push(("ACCESS-KEY", credentials.api_key.clone()));
            headers.push(("ACCESS-SIGN", signature));
            headers.push(("ACCESS-TIMESTAMP", timestamp));
            headers.push(("ACCESS-PASSPHRASE", credentials.passphrase.clone()));
        }

        Ok(HttpRequest {
            method,
            url: format!("{}{}{}", self.base_url, path, query),
            headers,
            body: body.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::scripted::ScriptedTransport;
    use crate::services::transport::HttpResponse;
    use mockito::Matcher;
    use std::time::Duration;

    fn test_config(base_url: &str) -> ExchangeConfig {
        ExchangeConfig {
            base_url: base_url.to_string(),
            credentials: Some(Credentials::new("key", "secret", "phrase")),
            timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn scripted(
        outcomes: Vec<Result<HttpResponse, TransportError>>,
    ) -> SignedApiClient<ScriptedTransport> {
        SignedApiClient::with_transport(
            &test_config("https://api.test"),
            ScriptedTransport::new(outcomes),
        )
    }

    #[tokio::test]
    async fn test_connection_errors_then_success() {
        let client = scripted(vec![
            Err(TransportError::Connect("refused".to_string())),
            Err(TransportError::Timeout),
            Err(TransportError::Connect("refused".to_string())),
            ScriptedTransport::ok(200, r#"{"ok":true}"#),
        ]);

        let result = client.get("/capi/v2/account/assets", &[]).await;

        assert_eq!(result, ApiResult::Success(json!({"ok": true})));
        assert_eq!(client.transport().requests().len(), 4);
        assert_eq!(client.request_count(), 4);
    }

    #[tokio::test]
    async fn test_every_attempt_is_signed_with_its_own_timestamp() {
        let client = scripted(vec![
            ScriptedTransport::ok(503, "unavailable"),
            ScriptedTransport::ok(200, "[]"),
        ]);
        let params = vec![("symbol".to_string(), "cmt_btcusdt".to_string())];

        let result = client.get("/capi/v2/account/position/allPosition", &params).await;
        assert!(result.is_success());

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            let timestamp = request.header("ACCESS-TIMESTAMP").unwrap();
            let expected = sign(
                "secret",
                timestamp,
                HttpMethod::Get,
                "/capi/v2/account/position/allPosition",
                "?symbol=cmt_btcusdt",
                "",
            )
            .unwrap();
            assert_eq!(request.header("ACCESS-SIGN"), Some(expected.as_str()));
            assert_eq!(request.header("ACCESS-KEY"), Some("key"));
            assert_eq!(request.header("ACCESS-PASSPHRASE"), Some("phrase"));
            assert_eq!(
                request.url,
                "https://api.test/capi/v2/account/position/allPosition?symbol=cmt_btcusdt"
            );
        }
    }

    #[tokio::test]
    async fn test_exhausted_after_max_retries() {
        let client = scripted(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            ScriptedTransport::ok(200, "{}"),
        ]);

        let failure = client.get("/x", &[]).await.into_result().unwrap_err();

        assert_eq!(failure.kind, ApiErrorKind::NetworkExhausted);
        assert!(failure.message.contains("timed out"));
        assert_eq!(client.transport().requests().len(), 4);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let client = scripted(vec![
            ScriptedTransport::ok(429, "slow down"),
            ScriptedTransport::ok(200, r#"{"code":"0"}"#),
        ]);

        assert!(client.get("/x", &[]).await.is_success());
        assert_eq!(client.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_post_signs_and_sends_same_body() {
        let client = scripted(vec![ScriptedTransport::ok(200, r#"{"order_id":"1"}"#)]);
        let body = json!({"symbol": "cmt_btcusdt", "size": "0.01"});

        assert!(client.post("/capi/v2/order/placeOrder", &body).await.is_success());

        let request = &client.transport().requests()[0];
        assert_eq!(request.body, body.to_string());
        let timestamp = request.header("ACCESS-TIMESTAMP").unwrap();
        let expected = sign(
            "secret",
            timestamp,
            HttpMethod::Post,
            "/capi/v2/order/placeOrder",
            "",
            &request.body,
        )
        .unwrap();
        assert_eq!(request.header("ACCESS-SIGN"), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_signed_request_without_credentials_never_hits_network() {
        let config = ExchangeConfig {
            credentials: None,
            ..test_config("https://api.test")
        };
        let client = SignedApiClient::with_transport(&config, ScriptedTransport::default());

        let failure = client.get("/x", &[]).await.into_result().unwrap_err();
        assert_eq!(failure.kind, ApiErrorKind::AuthFailure);
        assert!(client.transport().requests().is_empty());

        let public = client.get_public("/x", &[]).await;
        assert!(!public.is_success());
        let request = &client.transport().requests()[0];
        assert!(request.header("ACCESS-SIGN").is_none());
    }

    #[tokio::test]
    async fn test_empty_path_is_rejected() {
        let client = scripted(vec![]);
        let failure = client.get("", &[]).await.into_result().unwrap_err();
        assert_eq!(failure.kind, ApiErrorKind::ClientError);

        let failure = client.get_public("capi/v2/market/candles", &[]).await;
        assert!(!failure.is_success());
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/capi/v2/account/assets")
            .match_query(Matcher::Any)
            .match_header("ACCESS-KEY", "key")
            .with_status(401)
            .with_body(r#"{"code":"40001","msg":"invalid sign"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = SignedApiClient::new(&test_config(&server.url())).unwrap();
        let failure = client
            .get("/capi/v2/account/assets", &[])
            .await
            .into_result()
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(failure.kind, ApiErrorKind::AuthFailure);
        assert_eq!(failure.status, Some(401));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/capi/v2/order/placeOrder")
            .with_status(400)
            .with_body(r#"{"msg":"param error"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = SignedApiClient::new(&test_config(&server.url())).unwrap();
        let failure = client
            .post("/capi/v2/order/placeOrder", &json!({"symbol": "x"}))
            .await
            .into_result()
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(failure.kind, ApiErrorKind::ClientError);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/capi/v2/market/candles")
            .match_query(Matcher::UrlEncoded("symbol".into(), "cmt_btcusdt".into()))
            .with_status(502)
            .with_body("bad gateway")
            .expect(4)
            .create_async()
            .await;

        let client = SignedApiClient::new(&test_config(&server.url())).unwrap();
        let params = vec![("symbol".to_string(), "cmt_btcusdt".to_string())];
        let failure = client
            .get_public("/capi/v2/market/candles", &params)
            .await
            .into_result()
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(failure.kind, ApiErrorKind::NetworkExhausted);
        assert_eq!(failure.status, Some(502));
    }

    #[tokio::test]
    async fn test_non_json_body_degrades_to_raw_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/capi/v2/market/time")
            .with_status(200)
            .with_body("pong")
            .create_async()
            .await;

        let client = SignedApiClient::new(&test_config(&server.url())).unwrap();
        let result = client.get_public("/capi/v2/market/time", &[]).await;

        assert_eq!(result, ApiResult::Success(json!({"rawText": "pong"})));
    }

    #[tokio::test]
    async fn test_refused_connection_is_exhausted() {
        // Nothing listens on port 9 on the loopback interface
        let client = SignedApiClient::new(&ExchangeConfig {
            max_retries: 1,
            ..test_config("http://127.0.0.1:9")
        })
        .unwrap();

        let failure = client.get_public("/x", &[]).await.into_result().unwrap_err();
        assert_eq!(failure.kind, ApiErrorKind::NetworkExhausted);
        assert_eq!(client.request_count(), 2);
    }
}
