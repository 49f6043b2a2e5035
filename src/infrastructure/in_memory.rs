use crate::domain::log::{Agent, AgentLog};
use crate::domain::payment::PaymentMethod;
use crate::domain::ports::{CommerceBackend, IntentResponse, PaymentResponse};
use crate::domain::product::Product;
use crate::error::{Result, TimelineError};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_MATCHES: usize = 3;

/// Every call the backend has received, in arrival order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordedCalls {
    pub prompts: Vec<String>,
    pub product_updates: Vec<Product>,
    pub payments: Vec<PaymentMethod>,
}

#[derive(Debug, Default, Clone, Copy)]
struct FailureSwitches {
    intent: bool,
    update_product: bool,
    payment: bool,
}

#[derive(Debug, Default)]
struct BackendState {
    cart: Option<Product>,
    calls: RecordedCalls,
}

/// An in-process stand-in for the commerce backend.
///
/// Answers from a keyword catalog with the same log script the real agents emit,
/// records every call, and can be told to fail individual endpoints. Used for offline
/// runs and as the collaborator in tests.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    catalog: Arc<Vec<(String, Vec<Product>)>>,
    failures: FailureSwitches,
    latency: Duration,
    state: Arc<RwLock<BackendState>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Creates a backend stocked with the demo catalog.
    pub fn new() -> Self {
        let coffee = vec![
            Product::new("Brewly Espresso Maker", dec!(4999)).with_brand("Brewly"),
            Product::new("Brewly Espresso Maker Plus", dec!(7499)).with_brand("Brewly"),
            Product::new("Brewly Espresso Maker Pro", dec!(12999)).with_brand("Brewly"),
        ];
        let headphones = vec![
            Product::new("Sonique ANC 300", dec!(8990)).with_brand("Sonique"),
            Product::new("Sonique ANC 500", dec!(24990)).with_brand("Sonique"),
        ];
        Self::empty()
            .with_catalog("coffee", coffee)
            .with_catalog("headphones", headphones)
    }

    /// Creates a backend that finds nothing.
    pub fn empty() -> Self {
        Self {
            catalog: Arc::new(Vec::new()),
            failures: FailureSwitches::default(),
            latency: Duration::ZERO,
            state: Arc::new(RwLock::new(BackendState::default())),
        }
    }

    /// Offers `products` (cheapest first) for prompts containing `keyword`.
    pub fn with_catalog(mut self, keyword: &str, mut products: Vec<Product>) -> Self {
        products.sort_by(|a, b| a.price.cmp(&b.price));
        Arc::make_mut(&mut self.catalog).push((keyword.to_lowercase(), products));
        self
    }

    /// Delays every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_intent(mut self) -> Self {
        self.failures.intent = true;
        self
    }

    pub fn fail_update_product(mut self) -> Self {
        self.failures.update_product = true;
        self
    }

    pub fn fail_payment(mut self) -> Self {
        self.failures.payment = true;
        self
    }

    pub async fn recorded(&self) -> RecordedCalls {
        self.state.read().await.calls.clone()
    }

    fn search(&self, prompt: &str) -> Vec<Product> {
        let prompt = prompt.to_lowercase();
        self.catalog
            .iter()
            .find(|(keyword, _)| prompt.contains(keyword.as_str()))
            .map(|(_, products)| products.iter().take(MAX_MATCHES).cloned().collect())
            .unwrap_or_default()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn short_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..8])
}

#[async_trait]
impl CommerceBackend for ScriptedBackend {
    async fn send_intent(&self, prompt: &str) -> Result<IntentResponse> {
        self.state.write().await.calls.prompts.push(prompt.to_string());
        self.simulate_latency().await;
        if self.failures.intent {
            return Err(TimelineError::unreachable("/intent", "HTTP 503 Service Unavailable"));
        }

        let mut logs = vec![
            AgentLog::new(
                Agent::Shopping,
                format!("Processing User Request: '{prompt}'"),
            ),
            AgentLog::new(
                Agent::Shopping,
                format!("Created IntentMandate: {}", short_id("intent")),
            ),
        ];

        let products = self.search(prompt);
        let Some(best) = products.first().cloned() else {
            logs.push(AgentLog::new(
                Agent::Merchant,
                format!("No product found for query: '{prompt}'"),
            ));
            return Ok(IntentResponse {
                product: None,
                alternatives: Some(Vec::new()),
                agent_logs: logs,
            });
        };

        logs.push(AgentLog::new(
            Agent::Merchant,
            format!(
                "Found {} matches. Best: {} ({} INR)",
                products.len(),
                best.name,
                best.price
            ),
        ));
        logs.push(AgentLog::new(
            Agent::Merchant,
            format!("CartMandate signed for {}", best.name),
        ));
        logs.push(AgentLog::new(
            Agent::Shopping,
            format!("Received CartMandate: {}", short_id("cart")),
        ));
        self.state.write().await.cart = Some(best.clone());

        Ok(IntentResponse {
            product: Some(best),
            alternatives: Some(products),
            agent_logs: logs,
        })
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        self.state
            .write()
            .await
            .calls
            .product_updates
            .push(product.clone());
        self.simulate_latency().await;
        if self.failures.update_product {
            return Err(TimelineError::unreachable("/update-product", "connection reset"));
        }
        self.state.write().await.cart = Some(product.clone());
        Ok(())
    }

    async fn process_payment(&self, method: &PaymentMethod) -> Result<PaymentResponse> {
        let cart = {
            let mut state = self.state.write().await;
            state.calls.payments.push(method.clone());
            state.cart.clone()
        };
        self.simulate_latency().await;
        if self.failures.payment {
            return Err(TimelineError::unreachable("/pay", "HTTP 502 Bad Gateway"));
        }

        let Some(cart) = cart else {
            return Ok(PaymentResponse {
                status: "FAILED".to_string(),
                receipt_id: None,
                agent_logs: vec![AgentLog::new(
                    Agent::Shopping,
                    "Error: No active cart found. Cannot process payment.",
                )],
            });
        };

        let payment_id = short_id("pay");
        let receipt_id = format!("txn_{payment_id}");
        Ok(PaymentResponse {
            status: PaymentResponse::SUCCESS.to_string(),
            receipt_id: Some(receipt_id.clone()),
            agent_logs: vec![
                AgentLog::new(Agent::Credentials, "Retrieving payment methods..."),
                AgentLog::new(
                    Agent::Credentials,
                    format!("Generated secure token for {} via {method}", cart.price),
                ),
                AgentLog::new(
                    Agent::Shopping,
                    format!("PaymentMandate constructed and signed: {payment_id}"),
                ),
                AgentLog::new(Agent::Payment, "Verifying PaymentMandate signature..."),
                AgentLog::new(
                    Agent::Payment,
                    format!("Transaction authorized. Receipt: {receipt_id}"),
                ),
            ],
        })
    }
}
