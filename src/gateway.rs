use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use ulid::Ulid;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

/// Verified outcome of a payment session, as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentResult {
    Succeeded,
    Failed,
}

/// The payment provider as seen by the engine. Gateway-specific payloads and
/// webhook signatures are handled before anything reaches this trait.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout session and return its order id.
    async fn create_payment_session(&self, reservation_id: Ulid, amount_cents: u64) -> Result<String, GatewayError>;

    /// Return the money captured under `order_id`. Must be idempotent per order.
    async fn refund(&self, reservation_id: Ulid, order_id: &str) -> Result<(), GatewayError>;
}

/// In-process gateway for local runs and tests.
#[derive(Default)]
pub struct SandboxGateway {
    sessions: DashMap<String, (Ulid, u64)>,
    refunds: DashMap<String, Ulid>,
    fail_refunds: AtomicBool,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent refund call fail until switched back.
    pub fn set_fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub fn session(&self, order_id: &str) -> Option<(Ulid, u64)> {
        self.sessions.get(order_id).map(|e| *e.value())
    }

    pub fn refunded(&self, order_id: &str) -> bool {
        self.refunds.contains_key(order_id)
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.len()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_payment_session(&self, reservation_id: Ulid, amount_cents: u64) -> Result<String, GatewayError> {
        let order_id = format!("sbx_{}", Ulid::new());
        self.sessions.insert(order_id.clone(), (reservation_id, amount_cents));
        tracing::debug!(%reservation_id, amount_cents, order_id, "sandbox payment session opened");
        Ok(order_id)
    }

    async fn refund(&self, reservation_id: Ulid, order_id: &str) -> Result<(), GatewayError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("sandbox refunds disabled".into()));
        }
        self.refunds.insert(order_id.to_string(), reservation_id);
        tracing::debug!(%reservation_id, order_id, "sandbox refund issued");
        Ok(())
    }
}
