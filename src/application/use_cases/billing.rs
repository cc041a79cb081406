use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult, is_retryable},
    application::{
        ports::{
            gateways::{ChargeGateway, SubscriptionGateway, charge_dedup_key},
            idempotency::{Admission, IdempotencyGuard},
        },
        use_cases::{
            policy::pricing_for,
            reconciliation::{
                PaymentCredit, PaymentLedgerRepo, ReconciliationUseCases, SubscriptionRepo,
            },
        },
    },
    domain::entities::{
        payment::Payment,
        payment_gateway::PaymentGateway,
        plan::Plan,
        subscription::{Subscription, SubscriptionStatus},
        user::User,
    },
};

// ============================================================================
// Result Types
// ============================================================================

/// Gateway-specific handle returned by create-payment.
#[derive(Debug, Clone)]
pub enum PaymentHandle {
    /// Stripe hosted checkout (all regions except Nigeria).
    Checkout { checkout_url: String },
    /// Flutterwave hosted payment page plus the caller-chosen reference the
    /// client later submits for pull verification.
    RegionalLink { payment_link: String, tx_ref: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Gateway confirmed the charge and reconciliation applied it.
    Credited,
    /// Gateway reports the charge as unsuccessful; recorded, no upgrade.
    ChargeFailed,
    /// Another delivery already processed (or is processing) this
    /// reference. Reported as success to the caller.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Regional one-off charge: plan dropped to free right away.
    Immediate,
    /// Recurring subscription: status flips now, plan stays pro until the
    /// paid window closes.
    AtPeriodEnd { ends_at: Option<DateTime<Utc>> },
}

/// Snapshot served by the subscription read endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriptionOverview {
    pub plan: Plan,
    pub status: Option<SubscriptionStatus>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub renews_at: Option<DateTime<Utc>>,
    pub gateway: Option<PaymentGateway>,
}

impl SubscriptionOverview {
    fn from_row(sub: &Subscription) -> Self {
        Self {
            plan: sub.plan,
            status: Some(sub.status),
            starts_at: sub.starts_at,
            ends_at: sub.ends_at,
            renews_at: sub.renews_at,
            gateway: sub.gateway,
        }
    }

    fn free() -> Self {
        Self {
            plan: Plan::Free,
            status: None,
            starts_at: None,
            ends_at: None,
            renews_at: None,
            gateway: None,
        }
    }
}

// ============================================================================
// Transaction references
// ============================================================================

/// Caller-chosen transaction reference for a regional charge. Encodes the
/// user id so the later notification can be attributed without a gateway
/// lookup; the random infix keeps retried checkouts distinct.
pub fn new_tx_ref(user_id: Uuid) -> String {
    format!(
        "proj-{}-{:04x}-{}",
        Utc::now().timestamp_millis(),
        rand::random::<u16>(),
        user_id
    )
}

pub fn user_from_tx_ref(tx_ref: &str) -> Option<Uuid> {
    tx_ref.splitn(4, '-').nth(3).and_then(|s| s.parse().ok())
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct BillingUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    ledger_repo: Arc<dyn PaymentLedgerRepo>,
    subscription_gateway: Arc<dyn SubscriptionGateway>,
    charge_gateway: Arc<dyn ChargeGateway>,
    guard: Arc<dyn IdempotencyGuard>,
    reconciliation: Arc<ReconciliationUseCases>,
}

impl BillingUseCases {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        ledger_repo: Arc<dyn PaymentLedgerRepo>,
        subscription_gateway: Arc<dyn SubscriptionGateway>,
        charge_gateway: Arc<dyn ChargeGateway>,
        guard: Arc<dyn IdempotencyGuard>,
        reconciliation: Arc<ReconciliationUseCases>,
    ) -> Self {
        Self {
            subscription_repo,
            ledger_repo,
            subscription_gateway,
            charge_gateway,
            guard,
            reconciliation,
        }
    }

    /// Create a gateway-specific payment handle for the user's region.
    pub async fn create_payment(
        &self,
        user: &User,
        country_code: &str,
        phone: Option<&str>,
    ) -> AppResult<PaymentHandle> {
        let pricing = pricing_for(country_code);
        match pricing.gateway {
            PaymentGateway::Flutterwave => {
                let tx_ref = new_tx_ref(user.id);
                let phone = phone.or(user.phone.as_deref());
                let link = self
                    .charge_gateway
                    .create_payment_link(
                        &tx_ref,
                        &user.email,
                        &user.name,
                        phone,
                        pricing.amount,
                        pricing.currency,
                    )
                    .await?;
                Ok(PaymentHandle::RegionalLink {
                    payment_link: link.link,
                    tx_ref: link.tx_ref,
                })
            }
            PaymentGateway::Stripe => {
                let session = self
                    .subscription_gateway
                    .create_checkout_session(user.id, &user.email, &user.name)
                    .await?;
                Ok(PaymentHandle::Checkout {
                    checkout_url: session.url,
                })
            }
        }
    }

    /// Explicit pull verification of a regional charge, guarded by the
    /// idempotency guard keyed by the transaction reference. Duplicates
    /// short-circuit to success without reprocessing.
    pub async fn verify_payment(&self, tx_ref: &str) -> AppResult<VerifyOutcome> {
        if tx_ref.is_empty() {
            return Err(AppError::Validation("tx_ref is required".into()));
        }
        let key = charge_dedup_key(tx_ref);
        match self.guard.admit(&key).await? {
            Admission::Admitted => self.verify_admitted_charge(tx_ref).await,
            Admission::AlreadyInFlight | Admission::AlreadyDone => Ok(VerifyOutcome::Duplicate),
        }
    }

    /// Verify a charge whose dedup key is already held in-flight by the
    /// caller, then settle the guard marker: done on a definitive outcome,
    /// released on a transient failure so gateway redelivery can retry.
    pub async fn verify_admitted_charge(&self, tx_ref: &str) -> AppResult<VerifyOutcome> {
        let key = charge_dedup_key(tx_ref);
        let verification = match self.charge_gateway.verify_charge(tx_ref).await {
            Ok(v) => v,
            Err(e) => {
                let _ = self.guard.release(&key).await;
                return Err(e);
            }
        };

        if verification.successful {
            let credit = PaymentCredit {
                gateway: PaymentGateway::Flutterwave,
                provider_ref: tx_ref.to_string(),
                reference: tx_ref.to_string(),
                user_hint: user_from_tx_ref(tx_ref),
                customer_id: None,
                amount: verification.amount,
                currency: verification.currency.clone(),
                period_end: None,
            };
            match self.reconciliation.apply_successful_payment(&credit).await {
                Ok(_) => {
                    self.guard.complete(&key).await?;
                    Ok(VerifyOutcome::Credited)
                }
                Err(e) if is_retryable(&e) => {
                    let _ = self.guard.release(&key).await;
                    Err(e)
                }
                Err(e) => {
                    // Unresolvable: mark done so redeliveries no-op instead
                    // of failing forever. Manual follow-up owns the gap.
                    let _ = self.guard.complete(&key).await;
                    Err(e)
                }
            }
        } else {
            if let Some(user_id) = user_from_tx_ref(tx_ref) {
                self.reconciliation
                    .record_failed_charge(
                        user_id,
                        PaymentGateway::Flutterwave,
                        tx_ref,
                        verification.amount,
                        &verification.currency,
                    )
                    .await?;
            }
            // Gateway truth is final for this reference.
            self.guard.complete(&key).await?;
            Ok(VerifyOutcome::ChargeFailed)
        }
    }

    /// Current subscription snapshot. Self-healing: a pro user with no row
    /// gets one synthesized with a fresh 30-day active window.
    pub async fn subscription_overview(&self, user: &User) -> AppResult<SubscriptionOverview> {
        match self.subscription_repo.get_by_user(user.id).await? {
            Some(sub) => Ok(SubscriptionOverview::from_row(&sub)),
            None if user.plan.is_pro() => {
                let sub = self.reconciliation.ensure_subscription_row(user).await?;
                Ok(SubscriptionOverview::from_row(&sub))
            }
            None => Ok(SubscriptionOverview::free()),
        }
    }

    /// Cancel per gateway semantics: immediate downgrade for regional
    /// charges, end-of-period for recurring subscriptions.
    pub async fn cancel(&self, user: &User) -> AppResult<CancelOutcome> {
        let sub = self
            .subscription_repo
            .get_by_user(user.id)
            .await?
            .ok_or(AppError::NotFound)?;

        match sub.gateway {
            Some(PaymentGateway::Stripe) => {
                if let Some(provider_ref) = &sub.provider_ref
                    && !provider_ref.is_empty()
                {
                    self.subscription_gateway
                        .cancel_subscription(provider_ref)
                        .await?;
                }
                self.subscription_repo
                    .set_status(sub.id, SubscriptionStatus::Cancelled)
                    .await?;
                tracing::info!(user_id = %user.id, "Subscription cancelled at period end");
                Ok(CancelOutcome::AtPeriodEnd {
                    ends_at: sub.ends_at,
                })
            }
            _ => {
                self.subscription_repo
                    .downgrade(sub.id, SubscriptionStatus::Cancelled)
                    .await?;
                self.reconciliation
                    .apply_entitlement(user, Plan::Free, None)
                    .await?;
                tracing::info!(user_id = %user.id, "Subscription cancelled immediately");
                Ok(CancelOutcome::Immediate)
            }
        }
    }

    /// Ledger entries for the user, newest first. Empty for users who never
    /// had a subscription row.
    pub async fn payment_history(&self, user: &User) -> AppResult<Vec<Payment>> {
        match self.subscription_repo.get_by_user(user.id).await? {
            Some(sub) => self.ledger_repo.list_by_subscription(sub.id).await,
            None => Ok(Vec::new()),
        }
    }

}
