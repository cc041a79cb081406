//! Inbound payment gateway webhooks.
//!
//! Both handlers acknowledge the sender before reconciliation runs; the
//! admitted work is handed to the background worker so gateway-side retry
//! policies cannot race in-progress processing of the same delivery.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use secrecy::ExposeSecret;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::ports::{
        gateways::charge_dedup_key,
        idempotency::{Admission, IdempotencyGuard},
    },
    infra::{
        flutterwave_client::SUCCESSFUL_STATUS,
        reconcile_worker::ReconcileJob,
        stripe_client::{StripeClient, constant_time_compare, normalize_event},
    },
};

/// POST /api/webhooks/stripe
///
/// Signature is authenticated before any parsing; a recognized event is
/// admitted and queued, everything else is acked and ignored. Internal
/// failures after authentication are never surfaced to the sender.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Signature("Missing stripe-signature header".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        state.config.stripe_webhook_secret.expose_secret(),
    )?;

    let event: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {}", e)))?;

    let Some(normalized) = normalize_event(&event) else {
        tracing::debug!(
            event_type = event["type"].as_str().unwrap_or(""),
            "Ignoring unhandled webhook event type"
        );
        return Ok(StatusCode::OK);
    };

    match state.guard.admit(&normalized.dedup_key()).await {
        Ok(Admission::Admitted) => {
            state
                .queue
                .enqueue(ReconcileJob::SubscriptionEvent(normalized));
        }
        Ok(_) => {
            // Duplicate delivery: the sender still gets success, otherwise
            // it retries indefinitely.
            tracing::debug!(event_ref = %normalized.event_ref, "Duplicate event, acknowledging");
        }
        Err(e) => {
            tracing::error!(event_ref = %normalized.event_ref, error = %e, "Guard admit failed");
        }
    }

    Ok(StatusCode::OK)
}

/// POST /api/webhooks/flutterwave
///
/// Always 200, even on internal error, to avoid induced retries. The
/// notification is only a hint: the worker pull-verifies the transaction
/// reference before anything is credited.
async fn flutterwave_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let hash_ok = headers
        .get("verif-hash")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|h| {
            constant_time_compare(h, state.config.flutterwave_verif_hash.expose_secret())
        });
    if !hash_ok {
        tracing::warn!("Flutterwave notification with missing or bad verif-hash, ignoring");
        return StatusCode::OK;
    }

    let Ok(payload) = serde_json::from_str::<serde_json::Value>(&body) else {
        tracing::warn!("Unparsable Flutterwave notification, ignoring");
        return StatusCode::OK;
    };
    // v3 wraps the transaction in `data`; older notifications are flat.
    let data = if payload["data"].is_object() {
        &payload["data"]
    } else {
        &payload
    };

    let status = data["status"].as_str().unwrap_or("");
    if status != SUCCESSFUL_STATUS {
        tracing::debug!(status, "Ignoring non-successful charge notification");
        return StatusCode::OK;
    }

    let Some(tx_ref) = data["tx_ref"].as_str().or_else(|| data["txRef"].as_str()) else {
        tracing::warn!("Charge notification without tx_ref, ignoring");
        return StatusCode::OK;
    };

    match state.guard.admit(&charge_dedup_key(tx_ref)).await {
        Ok(Admission::Admitted) => {
            state.queue.enqueue(ReconcileJob::RegionalCharge {
                tx_ref: tx_ref.to_string(),
            });
        }
        Ok(_) => {
            tracing::debug!(tx_ref, "Duplicate charge notification, acknowledging");
        }
        Err(e) => {
            tracing::error!(tx_ref, error = %e, "Guard admit failed");
        }
    }

    StatusCode::OK
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(stripe_webhook))
        .route("/flutterwave", post(flutterwave_webhook))
}
