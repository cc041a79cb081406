use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::payment_gateway::PaymentGateway};

// ============================================================================
// Port Types
// ============================================================================

/// Hosted checkout session for a recurring subscription.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Hosted payment page for a one-off regional charge.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLink {
    pub link: String,
    pub tx_ref: String,
}

/// Billing-customer record held by the subscription gateway. Its metadata
/// carries the user-id mapping used as the secondary resolution path when
/// an event arrives without a user reference.
#[derive(Debug, Clone)]
pub struct BillingCustomer {
    pub customer_id: String,
    pub email: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl BillingCustomer {
    pub fn user_id(&self) -> Option<Uuid> {
        self.metadata.get("user_id").and_then(|v| v.parse().ok())
    }
}

/// Result of pull-verifying a regional charge against gateway truth.
#[derive(Debug, Clone)]
pub struct ChargeVerification {
    pub successful: bool,
    pub amount: i64,
    pub currency: String,
}

// ============================================================================
// Normalized inbound events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Subscription gateway: hosted checkout finished and the first charge
    /// settled.
    CheckoutCompleted,
    /// Subscription gateway: a renewal invoice was paid.
    InvoicePaid,
    /// Regional gateway: asynchronous charge notification. Untrusted until
    /// pull-verified.
    ChargeNotification,
}

/// Inbound webhook payload decoded at the adapter boundary. The reconciler
/// only ever sees this normalized form, never gateway JSON.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub gateway: PaymentGateway,
    pub kind: PaymentEventKind,
    /// Gateway event id (Stripe) or transaction reference (Flutterwave);
    /// doubles as the dedup key input.
    pub event_ref: String,
    /// User id carried in event metadata, when present.
    pub user_hint: Option<Uuid>,
    /// Billing-customer id for the secondary resolution path.
    pub customer_id: Option<String>,
    /// Gateway subscription/transaction identifier to persist as the
    /// provider descriptor.
    pub provider_ref: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    /// Gateway-reported end of the paid period, when self-describing.
    pub period_end: Option<DateTime<Utc>>,
}

impl PaymentEvent {
    /// Dedup key for the idempotency guard, namespaced per gateway.
    pub fn dedup_key(&self) -> String {
        match self.gateway {
            PaymentGateway::Stripe => format!("idem:stripe:{}", self.event_ref),
            PaymentGateway::Flutterwave => format!("idem:flw:{}", self.event_ref),
        }
    }
}

/// Dedup key for a regional-charge transaction reference.
pub fn charge_dedup_key(tx_ref: &str) -> String {
    format!("idem:flw:{tx_ref}")
}

// ============================================================================
// Gateway Ports
// ============================================================================

/// Recurring-subscription gateway (signed push webhooks).
#[async_trait]
pub trait SubscriptionGateway: Send + Sync {
    /// Create a hosted checkout session carrying the user id both as the
    /// client reference and in the billing-customer metadata.
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        name: &str,
    ) -> AppResult<CheckoutSession>;

    /// Fetch the gateway's billing-customer record, used to resolve a user
    /// when an event carries no user reference.
    async fn fetch_billing_customer(&self, customer_id: &str)
    -> AppResult<Option<BillingCustomer>>;

    /// Request cancellation at the end of the current period. The local
    /// record keeps `plan = pro` until the period actually ends.
    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()>;
}

/// One-off regional-charge gateway (pull-verified notifications).
#[async_trait]
pub trait ChargeGateway: Send + Sync {
    /// Create a hosted payment link under a caller-chosen transaction
    /// reference.
    async fn create_payment_link(
        &self,
        tx_ref: &str,
        email: &str,
        name: &str,
        phone: Option<&str>,
        amount: i64,
        currency: &str,
    ) -> AppResult<PaymentLink>;

    /// Confirm a charge against gateway truth. Mandatory before crediting:
    /// the transaction reference appears in redirect URLs and is
    /// attacker-observable.
    async fn verify_charge(&self, tx_ref: &str) -> AppResult<ChargeVerification>;
}
