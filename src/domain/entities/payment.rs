use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment_gateway::PaymentGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Successful,
    Failed,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Pending => "pending",
        }
    }
}

/// One ledger entry. Immutable once appended; there is no update path.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub subscription_id: Uuid,
    /// Amount as reported by the gateway (major units for Flutterwave,
    /// minor units for Stripe invoices).
    pub amount: i64,
    pub currency: String,
    /// External event/transaction reference the entry was recorded under.
    pub reference: String,
    pub gateway: PaymentGateway,
    pub status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
