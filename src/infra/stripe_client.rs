use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateways::{
        BillingCustomer, CheckoutSession, PaymentEvent, PaymentEventKind, SubscriptionGateway,
    },
    domain::entities::payment_gateway::PaymentGateway,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Seconds of clock skew tolerated when checking webhook timestamps.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    price_id: String,
    app_origin: Url,
}

impl StripeClient {
    pub fn new(secret_key: String, price_id: String, app_origin: Url) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            price_id,
            app_origin,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.secret_key));
        format!("Basic {}", encoded)
    }

    async fn get_or_create_customer(
        &self,
        email: &str,
        user_id: Uuid,
    ) -> AppResult<StripeCustomer> {
        let response = self
            .client
            .get(format!("{}/customers", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        let list: StripeCustomerList = self.handle_response(response).await?;
        if let Some(customer) = list.data.into_iter().next() {
            return Ok(customer);
        }

        let params: Vec<(String, String)> = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let response = self
            .client
            .post(format!("{}/customers", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");
            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::Gateway(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }
            return Err(AppError::Gateway(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Gateway(format!("Failed to parse Stripe response: {}", e))
        })
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    /// Verify a `stripe-signature` header: `t=timestamp,v1=hmac,...` where
    /// the mac is HMAC-SHA256 over `"{t}.{raw_body}"`.
    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() != 2 {
                continue;
            }
            match kv[0] {
                "t" => timestamp = Some(kv[1]),
                "v1" => signatures.push(kv[1]),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| AppError::Signature("Missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(AppError::Signature("Missing v1 signature".into()));
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        for sig in signatures {
            if constant_time_compare(sig, &expected) {
                let ts: i64 = timestamp
                    .parse()
                    .map_err(|_| AppError::Signature("Invalid timestamp".into()))?;
                let now = chrono::Utc::now().timestamp();
                if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
                    return Err(AppError::Signature("Timestamp too old".into()));
                }
                return Ok(());
            }
        }

        Err(AppError::Signature("Signature mismatch".into()))
    }

    /// Compute a valid `stripe-signature` header value. Used by the webhook
    /// delivery simulation in tests.
    pub fn sign_payload(payload: &str, timestamp: i64, webhook_secret: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(signed_payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Event normalization
// ============================================================================

/// Decode a verified Stripe event into the normalized form the reconciler
/// consumes. Returns `None` for event kinds this service does not process.
pub fn normalize_event(event: &serde_json::Value) -> Option<PaymentEvent> {
    let event_id = event["id"].as_str()?.to_string();
    let event_type = event["type"].as_str()?;
    let object = &event["data"]["object"];

    match event_type {
        "checkout.session.completed" => Some(PaymentEvent {
            gateway: PaymentGateway::Stripe,
            kind: PaymentEventKind::CheckoutCompleted,
            event_ref: event_id,
            user_hint: object["client_reference_id"]
                .as_str()
                .and_then(|s| s.parse().ok()),
            customer_id: object["customer"].as_str().map(str::to_string),
            provider_ref: object["subscription"].as_str().map(str::to_string),
            amount: object["amount_total"].as_i64(),
            currency: object["currency"]
                .as_str()
                .map(|c| c.to_uppercase()),
            period_end: None,
        }),
        "invoice.paid" => Some(PaymentEvent {
            gateway: PaymentGateway::Stripe,
            kind: PaymentEventKind::InvoicePaid,
            event_ref: event_id,
            user_hint: object["subscription_details"]["metadata"]["user_id"]
                .as_str()
                .and_then(|s| s.parse().ok()),
            customer_id: object["customer"].as_str().map(str::to_string),
            provider_ref: object["subscription"].as_str().map(str::to_string),
            amount: object["amount_paid"].as_i64(),
            currency: object["currency"]
                .as_str()
                .map(|c| c.to_uppercase()),
            period_end: object["lines"]["data"][0]["period"]["end"]
                .as_i64()
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
        }),
        _ => None,
    }
}

// ============================================================================
// Gateway Port
// ============================================================================

#[async_trait]
impl SubscriptionGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        _name: &str,
    ) -> AppResult<CheckoutSession> {
        let customer = self.get_or_create_customer(email, user_id).await?;

        let success_url = format!("{}billing/success", self.app_origin);
        let cancel_url = format!("{}billing/cancelled", self.app_origin);
        let params: Vec<(String, String)> = vec![
            ("customer".to_string(), customer.id.clone()),
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("client_reference_id".to_string(), user_id.to_string()),
            (
                "subscription_data[metadata][user_id]".to_string(),
                user_id.to_string(),
            ),
            ("success_url".to_string(), success_url),
            ("cancel_url".to_string(), cancel_url),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        let session: StripeCheckoutSession = self.handle_response(response).await?;
        let url = session
            .url
            .ok_or_else(|| AppError::Gateway("Checkout session has no URL".into()))?;
        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn fetch_billing_customer(
        &self,
        customer_id: &str,
    ) -> AppResult<Option<BillingCustomer>> {
        let response = self
            .client
            .get(format!("{}/customers/{}", STRIPE_API_BASE, customer_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let customer: StripeCustomer = self.handle_response(response).await?;
        Ok(Some(BillingCustomer {
            customer_id: customer.id,
            email: customer.email,
            metadata: customer.metadata.unwrap_or_default(),
        }))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        let response = self
            .client
            .post(format!(
                "{}/subscriptions/{}",
                STRIPE_API_BASE, subscription_id
            ))
            .header("Authorization", self.auth_header())
            .form(&[("cancel_at_period_end", "true")])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe request failed: {}", e)))?;

        let _: StripeSubscription = self.handle_response(response).await?;
        Ok(())
    }
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    email: Option<String>,
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerList {
    data: Vec<StripeCustomer>,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}
