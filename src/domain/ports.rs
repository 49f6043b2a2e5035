use super::log::AgentLog;
use super::payment::PaymentMethod;
use super::product::Product;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Response of `POST /intent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    /// Best match; `None` when the merchant found nothing.
    pub product: Option<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<Product>>,
    #[serde(default)]
    pub agent_logs: Vec<AgentLog>,
}

/// Response of `POST /pay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub status: String,
    #[serde(default)]
    pub receipt_id: Option<String>,
    #[serde(default)]
    pub agent_logs: Vec<AgentLog>,
}

impl PaymentResponse {
    pub const SUCCESS: &'static str = "SUCCESS";

    /// A payment succeeded only when it reports `SUCCESS` and carries a receipt id.
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case(Self::SUCCESS) && self.receipt_id.is_some()
    }
}

/// The remote collaborator that searches products and settles payments.
///
/// No implementation retries; a single failure is reported as
/// [`TimelineError::BackendUnreachable`](crate::error::TimelineError::BackendUnreachable).
#[async_trait]
pub trait CommerceBackend: Send + Sync {
    async fn send_intent(&self, prompt: &str) -> Result<IntentResponse>;

    /// Best-effort cart update. Callers run it detached and only log the outcome.
    async fn update_product(&self, product: &Product) -> Result<()>;

    async fn process_payment(&self, method: &PaymentMethod) -> Result<PaymentResponse>;
}

pub type CommerceBackendRef = Arc<dyn CommerceBackend>;
