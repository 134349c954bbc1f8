//! Payment gateway trait, in-memory implementation and Razorpay client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// A payment intent created on the gateway.
///
/// Field names follow the gateway's order payload so the record can be
/// handed to the client checkout widget unchanged. `amount` is in minor
/// units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub id: String,
    #[serde(default)]
    pub entity: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
    #[serde(default)]
    pub attempts: u32,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub created_at: i64,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a transaction for `amount` in `currency`.
    async fn create_transaction(&self, amount: Money, currency: &str)
    -> Result<GatewayTransaction>;

    /// Public key id handed to the client checkout widget.
    fn key_id(&self) -> &str;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_transaction(
        &self,
        amount: Money,
        currency: &str,
    ) -> Result<GatewayTransaction> {
        (**self).create_transaction(amount, currency).await
    }

    fn key_id(&self) -> &str {
        (**self).key_id()
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    next_id: AtomicU32,
    fail_on_create: AtomicBool,
    latency_ms: AtomicU64,
}

/// In-memory payment gateway for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    key_id: String,
    state: Arc<InMemoryGatewayState>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway with the given public key id.
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            state: Arc::default(),
        }
    }

    /// Configures the gateway to fail every create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Delays every create call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.state.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns the number of transactions created so far.
    pub fn transaction_count(&self) -> u32 {
        self.state.next_id.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new("rzp_test_local")
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_transaction(
        &self,
        amount: Money,
        currency: &str,
    ) -> Result<GatewayTransaction> {
        let latency = self.state.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.state.fail_on_create.load(Ordering::SeqCst) {
            return Err(CheckoutError::UpstreamUnavailable(
                "Gateway declined the request".to_string(),
            ));
        }

        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayTransaction {
            id: format!("order_MOCK{n:06}"),
            entity: "order".to_string(),
            amount: amount.minor(),
            amount_paid: 0,
            amount_due: amount.minor(),
            currency: currency.to_string(),
            receipt: None,
            status: "created".to_string(),
            attempts: 0,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Connection settings for [`RazorpayGateway`].
#[derive(Clone)]
pub struct RazorpayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
}

/// Razorpay REST client (`POST /v1/orders` with basic auth).
#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    config: RazorpayConfig,
}

impl RazorpayGateway {
    /// Builds a client whose requests are bounded by `config.timeout`.
    pub fn new(config: RazorpayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CheckoutError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[tracing::instrument(skip(self), fields(amount_minor = amount.minor()))]
    async fn create_transaction(
        &self,
        amount: Money,
        currency: &str,
    ) -> Result<GatewayTransaction> {
        let response = self
            .client
            .post(self.orders_url())
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&CreateOrderRequest {
                amount: amount.minor(),
                currency,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gateway request failed");
                CheckoutError::UpstreamUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "Gateway rejected order creation");
            return Err(CheckoutError::UpstreamUnavailable(format!(
                "gateway responded with {status}"
            )));
        }

        let transaction: GatewayTransaction = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Gateway returned an unreadable order");
            CheckoutError::UpstreamUnavailable(e.to_string())
        })?;
        tracing::info!(gateway_order_id = %transaction.id, "Gateway order created");
        Ok(transaction)
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }
}
