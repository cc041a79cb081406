//! Billing routes: pricing, payment creation, pull verification,
//! subscription state, cancellation, payment history.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, middleware::AuthedUser},
    app_error::AppResult,
    application::use_cases::{
        billing::{CancelOutcome, PaymentHandle, SubscriptionOverview, VerifyOutcome},
        policy::pricing_for,
    },
    domain::entities::payment::Payment,
};

// ============================================================================
// Types
// ============================================================================

#[derive(Deserialize)]
struct PricingQuery {
    #[serde(alias = "countryCode")]
    country_code: Option<String>,
}

#[derive(Serialize)]
struct PricingResponse {
    currency: &'static str,
    amount: i64,
    symbol: &'static str,
}

#[derive(Deserialize)]
struct CreatePaymentPayload {
    country_code: Option<String>,
    phone: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum CreatePaymentResponse {
    Checkout { checkout_url: String },
    RegionalLink { payment_link: String, tx_ref: String },
}

#[derive(Deserialize)]
struct VerifyPaymentPayload {
    tx_ref: String,
}

#[derive(Serialize)]
struct VerifyPaymentResponse {
    payment_status: &'static str,
    duplicate: bool,
}

#[derive(Serialize)]
struct CancelResponse {
    status: &'static str,
    effective: &'static str,
    ends_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct PaymentResponse {
    id: Uuid,
    amount: i64,
    currency: String,
    reference: String,
    gateway: String,
    status: String,
    paid_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentResponse {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            amount: p.amount,
            currency: p.currency.clone(),
            reference: p.reference.clone(),
            gateway: p.gateway.as_str().to_string(),
            status: p.status.as_str().to_string(),
            paid_at: p.paid_at,
        }
    }
}

#[derive(Serialize)]
struct PaymentHistoryResponse {
    payments: Vec<PaymentResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/billing/pricing?country_code=..
async fn pricing(Query(query): Query<PricingQuery>) -> Json<PricingResponse> {
    let pricing = pricing_for(query.country_code.as_deref().unwrap_or(""));
    Json(PricingResponse {
        currency: pricing.currency,
        amount: pricing.amount,
        symbol: pricing.symbol,
    })
}

/// POST /api/billing/create-payment
async fn create_payment(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(payload): Json<CreatePaymentPayload>,
) -> AppResult<Json<CreatePaymentResponse>> {
    let country = payload
        .country_code
        .as_deref()
        .or(user.country_code.as_deref())
        .unwrap_or("");
    let handle = state
        .billing
        .create_payment(&user, country, payload.phone.as_deref())
        .await?;
    Ok(Json(match handle {
        PaymentHandle::Checkout { checkout_url } => CreatePaymentResponse::Checkout { checkout_url },
        PaymentHandle::RegionalLink {
            payment_link,
            tx_ref,
        } => CreatePaymentResponse::RegionalLink {
            payment_link,
            tx_ref,
        },
    }))
}

/// POST /api/billing/verify-payment
async fn verify_payment(
    State(state): State<AppState>,
    AuthedUser(_user): AuthedUser,
    Json(payload): Json<VerifyPaymentPayload>,
) -> AppResult<Json<VerifyPaymentResponse>> {
    let outcome = state.billing.verify_payment(&payload.tx_ref).await?;
    Ok(Json(match outcome {
        VerifyOutcome::Credited => VerifyPaymentResponse {
            payment_status: "successful",
            duplicate: false,
        },
        VerifyOutcome::ChargeFailed => VerifyPaymentResponse {
            payment_status: "failed",
            duplicate: false,
        },
        VerifyOutcome::Duplicate => VerifyPaymentResponse {
            payment_status: "successful",
            duplicate: true,
        },
    }))
}

/// GET /api/billing/subscription
async fn subscription(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> AppResult<Json<SubscriptionOverview>> {
    let overview = state.billing.subscription_overview(&user).await?;
    Ok(Json(overview))
}

/// POST /api/billing/cancel
async fn cancel(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> AppResult<Json<CancelResponse>> {
    let outcome = state.billing.cancel(&user).await?;
    Ok(Json(match outcome {
        CancelOutcome::Immediate => CancelResponse {
            status: "cancelled",
            effective: "immediate",
            ends_at: None,
        },
        CancelOutcome::AtPeriodEnd { ends_at } => CancelResponse {
            status: "cancelled",
            effective: "period_end",
            ends_at,
        },
    }))
}

/// GET /api/billing/payment-history
async fn payment_history(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> AppResult<Json<PaymentHistoryResponse>> {
    let payments = state.billing.payment_history(&user).await?;
    Ok(Json(PaymentHistoryResponse {
        payments: payments.iter().map(PaymentResponse::from).collect(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pricing", get(pricing))
        .route("/create-payment", post(create_payment))
        .route("/verify-payment", post(verify_payment))
        .route("/subscription", get(subscription))
        .route("/cancel", post(cancel))
        .route("/payment-history", get(payment_history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    use crate::application::use_cases::reconciliation::{SubscriptionRepo, UserDirectoryRepo};
    use crate::domain::entities::plan::Plan;
    use crate::test_utils::{TestAppStateBuilder, create_test_user, issue_test_token};

    fn server(app_state: AppState) -> TestServer {
        TestServer::new(router().with_state(app_state)).unwrap()
    }

    fn bearer(identity_id: &str) -> String {
        format!("Bearer {}", issue_test_token(identity_id))
    }

    // =========================================================================
    // GET /pricing
    // =========================================================================

    #[tokio::test]
    async fn pricing_is_public_and_region_aware() {
        let (app_state, _) = TestAppStateBuilder::new().build_with_worker();
        let srv = server(app_state);

        let response = srv.get("/pricing").add_query_param("country_code", "NG").await;
        response.assert_status_ok();
        response.assert_json(&json!({"currency": "NGN", "amount": 5000, "symbol": "\u{20a6}"}));

        let response = srv.get("/pricing").add_query_param("countryCode", "DE").await;
        response.assert_status_ok();
        response.assert_json(&json!({"currency": "USD", "amount": 10, "symbol": "$"}));
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    #[tokio::test]
    async fn authenticated_routes_reject_missing_token() {
        let (app_state, _) = TestAppStateBuilder::new().build_with_worker();
        let srv = server(app_state);

        let response = srv.get("/subscription").await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let response = srv
            .post("/create-payment")
            .json(&json!({"country_code": "NG"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authentication_populates_the_entitlement_cache() {
        let user = create_test_user(|_| {});
        let identity = user.identity_id.clone();
        let user_id = user.id;
        let (app_state, fx) = TestAppStateBuilder::new().with_user(user).build_with_worker();

        assert!(fx.cache.entry(&identity).is_none());

        server(app_state)
            .get("/subscription")
            .add_header("authorization", bearer(&identity))
            .await
            .assert_status_ok();

        let cached = fx.cache.entry(&identity).unwrap();
        assert_eq!(cached.user_id, user_id);
        assert_eq!(cached.plan, Plan::Free);
    }

    #[tokio::test]
    async fn unknown_identity_is_rejected() {
        let (app_state, _) = TestAppStateBuilder::new().build_with_worker();
        let srv = server(app_state);

        let response = srv
            .get("/subscription")
            .add_header("authorization", bearer("nobody"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    // =========================================================================
    // POST /create-payment
    // =========================================================================

    #[tokio::test]
    async fn create_payment_returns_regional_link_for_nigeria() {
        let user = create_test_user(|_| {});
        let identity = user.identity_id.clone();
        let (app_state, _) = TestAppStateBuilder::new().with_user(user).build_with_worker();

        let response = server(app_state)
            .post("/create-payment")
            .add_header("authorization", bearer(&identity))
            .json(&json!({"country_code": "NG", "phone": "+2348000000000"}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert!(body["payment_link"].is_string());
        assert!(body["tx_ref"].as_str().unwrap().starts_with("proj-"));
    }

    #[tokio::test]
    async fn create_payment_returns_checkout_url_elsewhere() {
        let user = create_test_user(|_| {});
        let identity = user.identity_id.clone();
        let (app_state, _) = TestAppStateBuilder::new().with_user(user).build_with_worker();

        let response = server(app_state)
            .post("/create-payment")
            .add_header("authorization", bearer(&identity))
            .json(&json!({"country_code": "US"}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert!(body["checkout_url"].is_string());
    }

    // =========================================================================
    // POST /verify-payment
    // =========================================================================

    #[tokio::test]
    async fn verify_payment_upgrades_and_reports_duplicates() {
        let user = create_test_user(|_| {});
        let identity = user.identity_id.clone();
        let user_id = user.id;
        let tx_ref = crate::application::use_cases::billing::new_tx_ref(user_id);
        let (app_state, fx) = TestAppStateBuilder::new().with_user(user).build_with_worker();
        let srv = server(app_state);

        let response = srv
            .post("/verify-payment")
            .add_header("authorization", bearer(&identity))
            .json(&json!({"tx_ref": tx_ref}))
            .await;
        response.assert_status_ok();
        response.assert_json(&json!({"payment_status": "successful", "duplicate": false}));

        let user = fx.user_repo.get_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.plan, Plan::Pro);

        let response = srv
            .post("/verify-payment")
            .add_header("authorization", bearer(&identity))
            .json(&json!({"tx_ref": tx_ref}))
            .await;
        response.assert_status_ok();
        response.assert_json(&json!({"payment_status": "successful", "duplicate": true}));
    }

    // =========================================================================
    // GET /subscription
    // =========================================================================

    #[tokio::test]
    async fn subscription_read_self_heals_for_pro_user() {
        let user = create_test_user(|u| {
            u.plan = Plan::Pro;
            u.plan_expires_at = Some(Utc::now() + chrono::Duration::days(12));
        });
        let identity = user.identity_id.clone();
        let user_id = user.id;
        let (app_state, fx) = TestAppStateBuilder::new().with_user(user).build_with_worker();

        let response = server(app_state)
            .get("/subscription")
            .add_header("authorization", bearer(&identity))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["plan"], "pro");
        assert_eq!(body["status"], "active");

        assert!(fx.sub_repo.get_by_user(user_id).await.unwrap().is_some());
    }

    // =========================================================================
    // POST /cancel + GET /payment-history
    // =========================================================================

    #[tokio::test]
    async fn cancel_and_history_round_trip() {
        let user = create_test_user(|_| {});
        let identity = user.identity_id.clone();
        let tx_ref = crate::application::use_cases::billing::new_tx_ref(user.id);
        let (app_state, _) = TestAppStateBuilder::new().with_user(user).build_with_worker();
        let srv = server(app_state);

        srv.post("/verify-payment")
            .add_header("authorization", bearer(&identity))
            .json(&json!({"tx_ref": tx_ref}))
            .await
            .assert_status_ok();

        let response = srv
            .get("/payment-history")
            .add_header("authorization", bearer(&identity))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["payments"].as_array().unwrap().len(), 1);
        assert_eq!(body["payments"][0]["currency"], "NGN");

        let response = srv
            .post("/cancel")
            .add_header("authorization", bearer(&identity))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["effective"], "immediate");

        // History survives cancellation.
        let response = srv
            .get("/payment-history")
            .add_header("authorization", bearer(&identity))
            .await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["payments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_without_subscription_is_404() {
        let user = create_test_user(|_| {});
        let identity = user.identity_id.clone();
        let (app_state, _) = TestAppStateBuilder::new().with_user(user).build_with_worker();

        let response = server(app_state)
            .post("/cancel")
            .add_header("authorization", bearer(&identity))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
