//! In-memory implementations of the repository, guard, cache and gateway
//! ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            entitlement_cache::{CachedEntitlement, EntitlementCache},
            gateways::{
                BillingCustomer, ChargeGateway, ChargeVerification, CheckoutSession, PaymentLink,
                SubscriptionGateway,
            },
            idempotency::{Admission, IdempotencyGuard},
        },
        use_cases::reconciliation::{
            ActivateSubscription, NewPayment, PaymentLedgerRepo, SubscriptionRepo,
            UserDirectoryRepo,
        },
    },
    domain::entities::{
        payment::Payment,
        plan::Plan,
        subscription::{Subscription, SubscriptionStatus},
        user::{QuotaKind, User},
    },
};

// ============================================================================
// InMemoryUserDirectoryRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserDirectoryRepo {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserDirectoryRepo {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }
}

#[async_trait]
impl UserDirectoryRepo for InMemoryUserDirectoryRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_identity(&self, identity_id: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.identity_id == identity_id)
            .cloned())
    }

    async fn set_entitlement(
        &self,
        id: Uuid,
        plan: Plan,
        plan_expires_at: Option<DateTime<Utc>>,
        project_ideas_left: i32,
        collaboration_requests_left: i32,
    ) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.plan = plan;
        user.plan_expires_at = plan_expires_at;
        user.project_ideas_left = project_ideas_left;
        user.collaboration_requests_left = collaboration_requests_left;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn spend_quota(&self, id: Uuid, kind: QuotaKind) -> AppResult<bool> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(AppError::NotFound)?;
        let counter = match kind {
            QuotaKind::ProjectIdeas => &mut user.project_ideas_left,
            QuotaKind::CollaborationRequests => &mut user.collaboration_requests_left,
        };
        if *counter > 0 {
            *counter -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn reset_free_quotas(
        &self,
        project_ideas: i32,
        collaboration_requests: i32,
    ) -> AppResult<u64> {
        let mut users = self.users.lock().unwrap();
        let mut touched = 0;
        for user in users.values_mut().filter(|u| u.plan == Plan::Free) {
            user.project_ideas_left = project_ideas;
            user.collaboration_requests_left = collaboration_requests;
            touched += 1;
        }
        Ok(touched)
    }

    async fn list_pro_users(&self) -> AppResult<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.plan == Plan::Pro)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    rows: Mutex<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn get_or_create(&self, user_id: Uuid) -> AppResult<Subscription> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.values().find(|s| s.user_id == user_id) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let sub = Subscription {
            id: Uuid::new_v4(),
            user_id,
            status: SubscriptionStatus::Pending,
            plan: Plan::Free,
            starts_at: None,
            ends_at: None,
            renews_at: None,
            gateway: None,
            provider_ref: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(sub.id, sub.clone());
        Ok(sub)
    }

    async fn activate(&self, id: Uuid, update: &ActivateSubscription) -> AppResult<Subscription> {
        let mut rows = self.rows.lock().unwrap();
        let sub = rows.get_mut(&id).ok_or(AppError::NotFound)?;
        sub.status = SubscriptionStatus::Active;
        sub.plan = Plan::Pro;
        sub.starts_at = Some(update.starts_at);
        sub.ends_at = Some(update.ends_at);
        sub.renews_at = Some(update.renews_at);
        sub.gateway = Some(update.gateway);
        sub.provider_ref = Some(update.provider_ref.clone());
        sub.updated_at = Utc::now();
        Ok(sub.clone())
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let sub = rows.get_mut(&id).ok_or(AppError::NotFound)?;
        sub.status = status;
        sub.updated_at = Utc::now();
        Ok(())
    }

    async fn downgrade(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let sub = rows.get_mut(&id).ok_or(AppError::NotFound)?;
        sub.status = status;
        sub.plan = Plan::Free;
        sub.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pro_past_end(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                s.plan == Plan::Pro
                    && s.status != SubscriptionStatus::Expired
                    && s.ends_at.is_some_and(|end| end < now)
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryPaymentLedgerRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentLedgerRepo {
    entries: Mutex<Vec<Payment>>,
}

impl InMemoryPaymentLedgerRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedgerRepo for InMemoryPaymentLedgerRepo {
    async fn append(&self, input: &NewPayment) -> AppResult<Payment> {
        let payment = Payment {
            id: Uuid::new_v4(),
            subscription_id: input.subscription_id,
            amount: input.amount,
            currency: input.currency.clone(),
            reference: input.reference.clone(),
            gateway: input.gateway,
            status: input.status,
            paid_at: input.paid_at,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(payment.clone());
        Ok(payment)
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> AppResult<Vec<Payment>> {
        // Newest first, matching the Postgres ORDER BY created_at DESC.
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.subscription_id == subscription_id)
            .rev()
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryIdempotencyGuard
// ============================================================================

/// Marker store without TTL simulation; expiry-dependent behavior is
/// exercised through explicit `release`/`complete` calls.
#[derive(Default)]
pub struct InMemoryIdempotencyGuard {
    markers: Mutex<HashMap<String, String>>,
}

impl InMemoryIdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_of(&self, key: &str) -> Option<String> {
        self.markers.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyGuard {
    async fn admit(&self, key: &str) -> AppResult<Admission> {
        let mut markers = self.markers.lock().unwrap();
        match markers.get(key).map(String::as_str) {
            None => {
                markers.insert(key.to_string(), "in-flight".to_string());
                Ok(Admission::Admitted)
            }
            Some("done") => Ok(Admission::AlreadyDone),
            Some(_) => Ok(Admission::AlreadyInFlight),
        }
    }

    async fn complete(&self, key: &str) -> AppResult<()> {
        self.markers
            .lock()
            .unwrap()
            .insert(key.to_string(), "done".to_string());
        Ok(())
    }

    async fn release(&self, key: &str) -> AppResult<()> {
        self.markers.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// InMemoryEntitlementCache
// ============================================================================

#[derive(Default)]
pub struct InMemoryEntitlementCache {
    entries: Mutex<HashMap<String, CachedEntitlement>>,
}

impl InMemoryEntitlementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, identity_id: &str) -> Option<CachedEntitlement> {
        self.entries.lock().unwrap().get(identity_id).cloned()
    }
}

#[async_trait]
impl EntitlementCache for InMemoryEntitlementCache {
    async fn get(&self, identity_id: &str) -> AppResult<Option<CachedEntitlement>> {
        Ok(self.entries.lock().unwrap().get(identity_id).cloned())
    }

    async fn put(
        &self,
        identity_id: &str,
        entitlement: &CachedEntitlement,
        _ttl_secs: u64,
    ) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(identity_id.to_string(), entitlement.clone());
        Ok(())
    }
}

// ============================================================================
// StubSubscriptionGateway
// ============================================================================

#[derive(Default)]
pub struct StubSubscriptionGateway {
    customers: Mutex<HashMap<String, Uuid>>,
    cancelled: Mutex<Vec<String>>,
}

impl StubSubscriptionGateway {
    /// Register a billing customer whose metadata maps back to a user.
    pub fn with_customer(self, customer_id: &str, user_id: Uuid) -> Self {
        self.customers
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), user_id);
        self
    }

    pub fn cancelled_subscriptions(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionGateway for StubSubscriptionGateway {
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        _email: &str,
        _name: &str,
    ) -> AppResult<CheckoutSession> {
        Ok(CheckoutSession {
            session_id: format!("cs_test_{}", user_id.simple()),
            url: "https://checkout.stripe.test/session".to_string(),
        })
    }

    async fn fetch_billing_customer(
        &self,
        customer_id: &str,
    ) -> AppResult<Option<BillingCustomer>> {
        Ok(self
            .customers
            .lock()
            .unwrap()
            .get(customer_id)
            .map(|user_id| BillingCustomer {
                customer_id: customer_id.to_string(),
                email: None,
                metadata: HashMap::from([("user_id".to_string(), user_id.to_string())]),
            }))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> AppResult<()> {
        self.cancelled
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(())
    }
}

// ============================================================================
// StubChargeGateway
// ============================================================================

enum ChargeBehavior {
    Successful { amount: i64, currency: String },
    Unsuccessful { amount: i64, currency: String },
    Erroring,
}

pub struct StubChargeGateway {
    behavior: ChargeBehavior,
}

impl StubChargeGateway {
    pub fn successful(amount: i64, currency: &str) -> Self {
        Self {
            behavior: ChargeBehavior::Successful {
                amount,
                currency: currency.to_string(),
            },
        }
    }

    pub fn unsuccessful(amount: i64, currency: &str) -> Self {
        Self {
            behavior: ChargeBehavior::Unsuccessful {
                amount,
                currency: currency.to_string(),
            },
        }
    }

    pub fn erroring() -> Self {
        Self {
            behavior: ChargeBehavior::Erroring,
        }
    }
}

#[async_trait]
impl ChargeGateway for StubChargeGateway {
    async fn create_payment_link(
        &self,
        tx_ref: &str,
        _email: &str,
        _name: &str,
        _phone: Option<&str>,
        _amount: i64,
        _currency: &str,
    ) -> AppResult<PaymentLink> {
        Ok(PaymentLink {
            link: format!("https://checkout.flutterwave.test/{tx_ref}"),
            tx_ref: tx_ref.to_string(),
        })
    }

    async fn verify_charge(&self, _tx_ref: &str) -> AppResult<ChargeVerification> {
        match &self.behavior {
            ChargeBehavior::Successful { amount, currency } => Ok(ChargeVerification {
                successful: true,
                amount: *amount,
                currency: currency.clone(),
            }),
            ChargeBehavior::Unsuccessful { amount, currency } => Ok(ChargeVerification {
                successful: false,
                amount: *amount,
                currency: currency.clone(),
            }),
            ChargeBehavior::Erroring => {
                Err(AppError::Gateway("verification endpoint unavailable".into()))
            }
        }
    }
}
