use std::sync::Arc;

use crate::{
    application::{
        ports::{entitlement_cache::EntitlementCache, idempotency::IdempotencyGuard},
        use_cases::{
            billing::BillingUseCases, policy::PolicyUseCases, reconciliation::UserDirectoryRepo,
        },
    },
    infra::{config::AppConfig, reconcile_worker::ReconcileQueue},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub billing: Arc<BillingUseCases>,
    pub policy: Arc<PolicyUseCases>,
    pub user_repo: Arc<dyn UserDirectoryRepo>,
    pub entitlement_cache: Arc<dyn EntitlementCache>,
    pub guard: Arc<dyn IdempotencyGuard>,
    pub queue: ReconcileQueue,
}
