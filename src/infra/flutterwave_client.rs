use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::gateways::{ChargeGateway, ChargeVerification, PaymentLink},
};

const FLUTTERWAVE_API_BASE: &str = "https://api.flutterwave.com/v3";

/// Literal transaction status token the gateway uses for a settled charge.
pub const SUCCESSFUL_STATUS: &str = "successful";

#[derive(Clone)]
pub struct FlutterwaveClient {
    client: Client,
    secret_key: String,
    app_origin: Url,
}

impl FlutterwaveClient {
    pub fn new(secret_key: String, app_origin: Url) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            app_origin,
        }
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<FlwEnvelope<T>> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::Gateway(format!("Failed to read Flutterwave response: {}", e))
        })?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Flutterwave API error");
            return Err(AppError::Gateway(format!(
                "Flutterwave API error: {} - {}",
                status, body
            )));
        }

        let envelope: FlwEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Flutterwave response");
            AppError::Gateway(format!("Failed to parse Flutterwave response: {}", e))
        })?;

        if envelope.status != "success" {
            return Err(AppError::Gateway(format!(
                "Flutterwave error: {}",
                envelope.message.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl ChargeGateway for FlutterwaveClient {
    async fn create_payment_link(
        &self,
        tx_ref: &str,
        email: &str,
        name: &str,
        phone: Option<&str>,
        amount: i64,
        currency: &str,
    ) -> AppResult<PaymentLink> {
        let redirect_url = format!("{}billing/verify", self.app_origin);
        let payload = json!({
            "tx_ref": tx_ref,
            "amount": amount,
            "currency": currency,
            "redirect_url": redirect_url,
            "customer": {
                "email": email,
                "name": name,
                "phonenumber": phone,
            },
            "customizations": {
                "title": "IdeaForge Pro",
            },
        });

        let response = self
            .client
            .post(format!("{}/payments", FLUTTERWAVE_API_BASE))
            .bearer_auth(&self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Flutterwave request failed: {}", e)))?;

        let envelope: FlwEnvelope<FlwPaymentData> = self.handle_response(response).await?;
        let data = envelope
            .data
            .ok_or_else(|| AppError::Gateway("Payment link response has no data".into()))?;
        Ok(PaymentLink {
            link: data.link,
            tx_ref: tx_ref.to_string(),
        })
    }

    async fn verify_charge(&self, tx_ref: &str) -> AppResult<ChargeVerification> {
        let response = self
            .client
            .get(format!(
                "{}/transactions/verify_by_reference",
                FLUTTERWAVE_API_BASE
            ))
            .bearer_auth(&self.secret_key)
            .query(&[("tx_ref", tx_ref)])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Flutterwave request failed: {}", e)))?;

        let envelope: FlwEnvelope<FlwTransaction> = self.handle_response(response).await?;
        let data = envelope
            .data
            .ok_or_else(|| AppError::Gateway("Verification response has no data".into()))?;
        Ok(ChargeVerification {
            successful: data.status == SUCCESSFUL_STATUS,
            amount: data.amount.round() as i64,
            currency: data.currency,
        })
    }
}

// ============================================================================
// Flutterwave Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct FlwEnvelope<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FlwPaymentData {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlwTransaction {
    status: String,
    amount: f64,
    currency: String,
}
