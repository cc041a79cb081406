use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        entitlement_cache::{CachedEntitlement, EntitlementCache},
        gateways::SubscriptionGateway,
    },
    domain::entities::{
        payment::{Payment, PaymentStatus},
        payment_gateway::PaymentGateway,
        plan::Plan,
        subscription::{Subscription, SubscriptionStatus},
        user::{QuotaKind, User, base_quotas},
    },
};

/// Renewal window applied when the gateway does not report a period end.
pub const RENEWAL_PERIOD_DAYS: i64 = 30;

// ============================================================================
// Input Types
// ============================================================================

/// A verified successful payment, already authenticated and admitted by the
/// idempotency guard.
#[derive(Debug, Clone)]
pub struct PaymentCredit {
    pub gateway: PaymentGateway,
    /// Gateway subscription/transaction identifier to persist as the
    /// provider descriptor.
    pub provider_ref: String,
    /// External reference recorded on the ledger entry.
    pub reference: String,
    pub user_hint: Option<Uuid>,
    /// Billing-customer id, for the secondary resolution path.
    pub customer_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    /// Gateway-reported period end, when self-describing.
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub subscription_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub gateway: PaymentGateway,
    pub status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
}

/// Field set written when a subscription (re-)enters the active state.
#[derive(Debug, Clone)]
pub struct ActivateSubscription {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub renews_at: DateTime<Utc>,
    pub gateway: PaymentGateway,
    pub provider_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Plan transitioned to pro; endDate extended once.
    Upgraded,
    /// User was already pro: plan and dates untouched, payment still
    /// recorded for billing history.
    AlreadyPro,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Entitlement fields on the user record. The row itself is owned by the
/// authentication/profile subsystem.
#[async_trait]
pub trait UserDirectoryRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn get_by_identity(&self, identity_id: &str) -> AppResult<Option<User>>;
    async fn set_entitlement(
        &self,
        id: Uuid,
        plan: Plan,
        plan_expires_at: Option<DateTime<Utc>>,
        project_ideas_left: i32,
        collaboration_requests_left: i32,
    ) -> AppResult<()>;
    /// Atomic decrement-if-positive. Returns false when the quota is
    /// exhausted; never drives a counter below zero.
    async fn spend_quota(&self, id: Uuid, kind: QuotaKind) -> AppResult<bool>;
    /// Set-based reset of all free-plan quotas. Returns rows touched.
    async fn reset_free_quotas(
        &self,
        project_ideas: i32,
        collaboration_requests: i32,
    ) -> AppResult<u64>;
    async fn list_pro_users(&self) -> AppResult<Vec<User>>;
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>>;
    /// Load the user's row, inserting a default `pending/free` one if none
    /// exists. Rows are never deleted afterwards.
    async fn get_or_create(&self, user_id: Uuid) -> AppResult<Subscription>;
    async fn activate(&self, id: Uuid, update: &ActivateSubscription) -> AppResult<Subscription>;
    /// Status-only transition (stripe-style end-of-period cancellation:
    /// plan stays pro until the window closes).
    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()>;
    /// Terminal transition that also drops the subscription's plan to free.
    async fn downgrade(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()>;
    /// Pro subscriptions whose paid window has closed: missed renewals
    /// (still `active`) and end-of-period cancellations alike.
    async fn list_pro_past_end(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>>;
}

/// Append-only payment history. No ledger-level dedup: correctness depends
/// on the idempotency guard admitting each event exactly once.
#[async_trait]
pub trait PaymentLedgerRepo: Send + Sync {
    async fn append(&self, input: &NewPayment) -> AppResult<Payment>;
    async fn list_by_subscription(&self, subscription_id: Uuid) -> AppResult<Vec<Payment>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct ReconciliationUseCases {
    user_repo: Arc<dyn UserDirectoryRepo>,
    subscription_repo: Arc<dyn SubscriptionRepo>,
    ledger_repo: Arc<dyn PaymentLedgerRepo>,
    subscription_gateway: Arc<dyn SubscriptionGateway>,
    entitlement_cache: Arc<dyn EntitlementCache>,
    /// Cache TTL aligned to the identity token lifetime.
    entitlement_ttl_secs: u64,
}

impl ReconciliationUseCases {
    pub fn new(
        user_repo: Arc<dyn UserDirectoryRepo>,
        subscription_repo: Arc<dyn SubscriptionRepo>,
        ledger_repo: Arc<dyn PaymentLedgerRepo>,
        subscription_gateway: Arc<dyn SubscriptionGateway>,
        entitlement_cache: Arc<dyn EntitlementCache>,
        entitlement_ttl_secs: u64,
    ) -> Self {
        Self {
            user_repo,
            subscription_repo,
            ledger_repo,
            subscription_gateway,
            entitlement_cache,
            entitlement_ttl_secs,
        }
    }

    /// Resolve the paying user: event metadata first, then the gateway's
    /// billing-customer record. Failure here aborts with no partial writes;
    /// the event is dropped for manual follow-up since redelivery cannot
    /// produce a mapping that does not exist.
    async fn resolve_user(&self, credit: &PaymentCredit) -> AppResult<User> {
        if let Some(user_id) = credit.user_hint
            && let Some(user) = self.user_repo.get_by_id(user_id).await?
        {
            return Ok(user);
        }

        if let Some(customer_id) = &credit.customer_id
            && let Some(customer) = self
                .subscription_gateway
                .fetch_billing_customer(customer_id)
                .await?
            && let Some(user_id) = customer.user_id()
            && let Some(user) = self.user_repo.get_by_id(user_id).await?
        {
            return Ok(user);
        }

        Err(AppError::Reconciliation(format!(
            "no user mapping for {} event {}",
            credit.gateway.as_str(),
            credit.reference
        )))
    }

    /// Apply a verified successful payment: upgrade the user if needed and
    /// append the ledger entry. Idempotent at the business level: a second,
    /// distinct successful charge for an already-pro user only appends
    /// history.
    pub async fn apply_successful_payment(
        &self,
        credit: &PaymentCredit,
    ) -> AppResult<ReconcileOutcome> {
        let user = self.resolve_user(credit).await?;
        let subscription = self.subscription_repo.get_or_create(user.id).await?;
        let now = Utc::now();

        let outcome = if user.plan.is_pro() {
            tracing::info!(
                user_id = %user.id,
                reference = %credit.reference,
                "User already pro, recording payment without plan writes"
            );
            ReconcileOutcome::AlreadyPro
        } else {
            let ends_at = credit
                .period_end
                .unwrap_or_else(|| now + Duration::days(RENEWAL_PERIOD_DAYS));
            let update = ActivateSubscription {
                starts_at: subscription.starts_at.unwrap_or(now),
                ends_at,
                renews_at: ends_at,
                gateway: credit.gateway,
                provider_ref: credit.provider_ref.clone(),
            };
            // Subscription first, user second. The two writes are not
            // transactional; the maintenance sweep bounds the window.
            self.subscription_repo
                .activate(subscription.id, &update)
                .await?;
            self.apply_entitlement(&user, Plan::Pro, Some(ends_at))
                .await?;
            tracing::info!(
                user_id = %user.id,
                gateway = %credit.gateway,
                ends_at = %ends_at,
                "Upgraded user to pro"
            );
            ReconcileOutcome::Upgraded
        };

        self.ledger_repo
            .append(&NewPayment {
                subscription_id: subscription.id,
                amount: credit.amount,
                currency: credit.currency.clone(),
                reference: credit.reference.clone(),
                gateway: credit.gateway,
                status: PaymentStatus::Successful,
                paid_at: now,
            })
            .await?;

        Ok(outcome)
    }

    /// Record a charge the gateway reports as unsuccessful. Plan state is
    /// untouched; the entry exists so billing history reflects the attempt
    /// even for users who never became pro.
    pub async fn record_failed_charge(
        &self,
        user_id: Uuid,
        gateway: PaymentGateway,
        reference: &str,
        amount: i64,
        currency: &str,
    ) -> AppResult<()> {
        let subscription = self.subscription_repo.get_or_create(user_id).await?;
        self.ledger_repo
            .append(&NewPayment {
                subscription_id: subscription.id,
                amount,
                currency: currency.to_string(),
                reference: reference.to_string(),
                gateway,
                status: PaymentStatus::Failed,
                paid_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Write the resulting plan and quotas onto the user record, then
    /// refresh the entitlement cache entry read by the authentication path.
    pub async fn apply_entitlement(
        &self,
        user: &User,
        plan: Plan,
        plan_expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let (ideas, collabs) = base_quotas(plan);
        self.user_repo
            .set_entitlement(user.id, plan, plan_expires_at, ideas, collabs)
            .await?;

        let entitlement = CachedEntitlement {
            user_id: user.id,
            plan,
            plan_expires_at,
        };
        if let Err(e) = self
            .entitlement_cache
            .put(&user.identity_id, &entitlement, self.entitlement_ttl_secs)
            .await
        {
            // The cache is read-through; a failed refresh heals on the next
            // authenticated request.
            tracing::warn!(user_id = %user.id, error = %e, "Entitlement cache refresh failed");
        }
        Ok(())
    }

    /// Synthesize the missing subscription row for a pro user: a 30-day
    /// active window from now. Used by the self-healing read and the
    /// maintenance sweep.
    pub async fn ensure_subscription_row(&self, user: &User) -> AppResult<Subscription> {
        if let Some(existing) = self.subscription_repo.get_by_user(user.id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let ends_at = now + Duration::days(RENEWAL_PERIOD_DAYS);
        let row = self.subscription_repo.get_or_create(user.id).await?;
        let activated = self
            .subscription_repo
            .activate(
                row.id,
                &ActivateSubscription {
                    starts_at: now,
                    ends_at,
                    renews_at: ends_at,
                    gateway: row.gateway.unwrap_or(PaymentGateway::Stripe),
                    provider_ref: row.provider_ref.clone().unwrap_or_default(),
                },
            )
            .await?;
        tracing::warn!(
            user_id = %user.id,
            "Synthesized missing subscription row for pro user"
        );
        Ok(activated)
    }

    /// Downgrade a pro subscription whose paid window has closed. A row
    /// cancelled at period end keeps its `cancelled` status; a missed
    /// renewal moves `active` to `expired`.
    pub async fn expire_subscription(&self, subscription: &Subscription) -> AppResult<()> {
        let status = match subscription.status {
            SubscriptionStatus::Cancelled => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Expired,
        };
        self.subscription_repo
            .downgrade(subscription.id, status)
            .await?;
        if let Some(user) = self.user_repo.get_by_id(subscription.user_id).await? {
            self.apply_entitlement(&user, Plan::Free, None).await?;
        }
        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            status = status.as_str(),
            "Downgraded subscription past its end date"
        );
        Ok(())
    }
}
