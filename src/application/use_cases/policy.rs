use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::use_cases::reconciliation::UserDirectoryRepo,
    domain::entities::{
        payment_gateway::PaymentGateway,
        plan::Plan,
        user::{FREE_COLLABORATION_REQUESTS, FREE_PROJECT_IDEAS, QuotaKind, base_quotas},
    },
};

/// Display pricing for the pro plan in a region.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegionalPricing {
    pub currency: &'static str,
    pub amount: i64,
    pub symbol: &'static str,
    #[serde(skip)]
    pub gateway: PaymentGateway,
}

/// Two-tier pricing: Nigeria charges in NGN through the regional gateway,
/// everywhere else subscribes in USD through Stripe.
pub fn pricing_for(country_code: &str) -> RegionalPricing {
    if country_code.eq_ignore_ascii_case("NG") {
        RegionalPricing {
            currency: "NGN",
            amount: 5000,
            symbol: "\u{20a6}",
            gateway: PaymentGateway::Flutterwave,
        }
    } else {
        RegionalPricing {
            currency: "USD",
            amount: 10,
            symbol: "$",
            gateway: PaymentGateway::Stripe,
        }
    }
}

/// Monthly quota bookkeeping for free and paid tiers.
#[derive(Clone)]
pub struct PolicyUseCases {
    user_repo: Arc<dyn UserDirectoryRepo>,
}

impl PolicyUseCases {
    pub fn new(user_repo: Arc<dyn UserDirectoryRepo>) -> Self {
        Self { user_repo }
    }

    /// Consume one unit of a monthly quota. Returns false when exhausted.
    /// Backed by a conditional single-statement decrement, so concurrent
    /// spends for the same user cannot overdraw the counter.
    pub async fn spend_quota(&self, user_id: Uuid, kind: QuotaKind) -> AppResult<bool> {
        let spent = self.user_repo.spend_quota(user_id, kind).await?;
        if !spent {
            tracing::debug!(user_id = %user_id, quota = kind.as_str(), "Quota exhausted");
        }
        Ok(spent)
    }

    /// Seed quota fields for a plan (signup, downgrade).
    pub async fn initialize_limits(&self, user_id: Uuid, plan: Plan) -> AppResult<()> {
        let (ideas, collabs) = base_quotas(plan);
        self.user_repo
            .set_entitlement(user_id, plan, None, ideas, collabs)
            .await
    }

    /// Restore free-plan quotas to their base values at the start of a new
    /// period. One set-based statement; per-user read-then-write is gone.
    pub async fn monthly_reset(&self) -> AppResult<u64> {
        let touched = self
            .user_repo
            .reset_free_quotas(FREE_PROJECT_IDEAS, FREE_COLLABORATION_REQUESTS)
            .await?;
        tracing::info!(users = touched, "Monthly quota reset complete");
        Ok(touched)
    }
}
