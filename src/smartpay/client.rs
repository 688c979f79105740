//! Authenticated HTTP client for the Smartpay API.
//!
//! Every call carries the fixed header set and the secret credential. Any
//! non-200 response is a hard failure: the raw response is logged for
//! diagnostics and a generic error is surfaced upward - upstream bodies are
//! never shown to end users. No automatic retry; the enclosing operation
//! fails immediately.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::config::SmartpayConfig;
use crate::errors::ServiceError;
use crate::smartpay::types::{CheckoutSession, CheckoutSessionRequest, Refund, RefundRequest, RemoteOrder};

#[derive(Debug, Clone)]
pub struct SmartpayClient {
    http: reqwest::Client,
    api_base: String,
}

impl SmartpayClient {
    pub fn new(cfg: &SmartpayConfig) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut authorization =
            HeaderValue::from_str(&format!("Basic {}", cfg.secret_key)).map_err(|_| {
                ServiceError::ValidationError("secret key is not a valid header value".into())
            })?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ServiceError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.api_base, path);
        let mut builder = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(%method, path, error = %e, "smartpay request failed");
            ServiceError::ExternalApiError("payment service request failed".into())
        })?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| {
            error!(%method, path, error = %e, "failed reading smartpay response");
            ServiceError::ExternalApiError("payment service request failed".into())
        })?;

        if status != StatusCode::OK {
            error!(%method, path, %status, response = %raw, "smartpay returned an error");
            return Err(ServiceError::ExternalApiError(
                "payment service request failed".into(),
            ));
        }

        serde_json::from_str(&raw).map_err(|e| {
            error!(%method, path, error = %e, response = %raw, "unexpected smartpay response shape");
            ServiceError::ExternalApiError("payment service request failed".into())
        })
    }

    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        self.post("/checkout-sessions", request).await
    }

    pub async fn get_checkout_session_expanded(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        self.get(&format!("/checkout-sessions/{session_id}?expand=all"))
            .await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<RemoteOrder, ServiceError> {
        self.get(&format!("/orders/{order_id}")).await
    }

    pub async fn create_refund(&self, request: &RefundRequest) -> Result<Refund, ServiceError> {
        self.post("/refunds", request).await
    }
}
