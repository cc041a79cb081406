use serde::{Deserialize, Serialize};
use strum::Display;

/// External payment processor a charge or subscription originated from.
///
/// Stripe delivers signed push webhooks for recurring subscriptions;
/// Flutterwave issues one-off regional charges that must be pull-verified
/// by transaction reference before being trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, sqlx::Type)]
#[sqlx(type_name = "payment_gateway", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentGateway {
    Stripe,
    Flutterwave,
}

impl PaymentGateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentGateway::Stripe => "stripe",
            PaymentGateway::Flutterwave => "flutterwave",
        }
    }
}
