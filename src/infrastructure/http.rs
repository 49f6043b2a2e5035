use crate::config::Config;
use crate::domain::payment::PaymentMethod;
use crate::domain::ports::{CommerceBackend, IntentResponse, PaymentResponse};
use crate::domain::product::{Product, UpdateProductRequest};
use crate::error::{Result, TimelineError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

pub const INTENT_PATH: &str = "/intent";
pub const UPDATE_PRODUCT_PATH: &str = "/update-product";
pub const PAY_PATH: &str = "/pay";

/// Talks to the commerce backend over JSON/HTTP.
///
/// No timeout is configured; a call lasts as long as the transport lets it.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    currency: String,
    default_merchant: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a client for `config.base_url`; a trailing slash is dropped.
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
            default_merchant: config.default_merchant.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TimelineError::unreachable(path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TimelineError::unreachable(path, format!("HTTP {status}")));
        }
        Ok(response)
    }

    async fn post_json<R: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<R> {
        self.post(path, body)
            .await?
            .json()
            .await
            .map_err(|e| TimelineError::unreachable(path, e))
    }
}

#[async_trait]
impl CommerceBackend for HttpBackend {
    async fn send_intent(&self, prompt: &str) -> Result<IntentResponse> {
        self.post_json(INTENT_PATH, &json!({ "prompt": prompt })).await
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let request = UpdateProductRequest::new(product, &self.currency, &self.default_merchant);
        self.post(UPDATE_PRODUCT_PATH, &request).await?;
        Ok(())
    }

    async fn process_payment(&self, method: &PaymentMethod) -> Result<PaymentResponse> {
        self.post_json(PAY_PATH, &json!({ "paymentMethod": method.id() }))
            .await
    }
}
