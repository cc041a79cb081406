//! Test app state builder for HTTP-level integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;
use time::Duration;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        jwt,
        ports::{entitlement_cache::EntitlementCache, idempotency::IdempotencyGuard},
        use_cases::{
            billing::BillingUseCases, policy::PolicyUseCases, reconciliation::ReconciliationUseCases,
        },
    },
    domain::entities::user::User,
    infra::{config::AppConfig, reconcile_worker::spawn_reconcile_worker},
    test_utils::{
        InMemoryEntitlementCache, InMemoryIdempotencyGuard, InMemoryPaymentLedgerRepo,
        InMemorySubscriptionRepo, InMemoryUserDirectoryRepo, StubChargeGateway,
        StubSubscriptionGateway,
    },
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_VERIF_HASH: &str = "flw_test_verif_hash";

/// Issue an identity token the test app state accepts.
pub fn issue_test_token(identity_id: &str) -> String {
    jwt::issue(
        identity_id,
        &SecretString::new(TEST_JWT_SECRET.into()),
        Duration::hours(1),
    )
    .expect("test token issuance cannot fail")
}

/// Handles to the in-memory stores behind a built `AppState`, for test
/// assertions.
pub struct TestFixtures {
    pub user_repo: Arc<InMemoryUserDirectoryRepo>,
    pub sub_repo: Arc<InMemorySubscriptionRepo>,
    pub ledger: Arc<InMemoryPaymentLedgerRepo>,
    pub guard: Arc<InMemoryIdempotencyGuard>,
    pub cache: Arc<InMemoryEntitlementCache>,
}

/// Builder for creating `AppState` with in-memory mocks.
///
/// # Example
///
/// ```ignore
/// let user = create_test_user(|u| u.plan = Plan::Pro);
/// let (app_state, fx) = TestAppStateBuilder::new().with_user(user).build_with_worker();
/// ```
pub struct TestAppStateBuilder {
    users: Vec<User>,
    charge_gateway: Option<StubChargeGateway>,
    subscription_gateway: Option<StubSubscriptionGateway>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            charge_gateway: None,
            subscription_gateway: None,
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    /// Override the regional gateway stub (defaults to a successful
    /// NGN 5000 verification).
    pub fn with_charge_gateway(mut self, gateway: StubChargeGateway) -> Self {
        self.charge_gateway = Some(gateway);
        self
    }

    pub fn with_subscription_gateway(mut self, gateway: StubSubscriptionGateway) -> Self {
        self.subscription_gateway = Some(gateway);
        self
    }

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
            database_url: String::new(),
            redis_url: String::new(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            app_origin: Url::parse("http://localhost:3000").unwrap(),
            jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
            access_token_ttl: Duration::hours(24),
            stripe_secret_key: SecretString::new("sk_test".into()),
            stripe_webhook_secret: SecretString::new(TEST_STRIPE_WEBHOOK_SECRET.into()),
            stripe_price_id: "price_test".to_string(),
            flutterwave_secret_key: SecretString::new("flwsk_test".into()),
            flutterwave_verif_hash: SecretString::new(TEST_VERIF_HASH.into()),
            idempotency_in_flight_ttl_secs: 900,
            idempotency_done_ttl_secs: 7 * 24 * 3600,
            maintenance_interval_secs: 3600,
        }
    }

    /// Build the AppState with all configured mocks and a live
    /// reconciliation worker consuming the queue.
    pub fn build_with_worker(self) -> (AppState, TestFixtures) {
        let user_repo = Arc::new(InMemoryUserDirectoryRepo::with_users(self.users));
        let sub_repo = Arc::new(InMemorySubscriptionRepo::new());
        let ledger = Arc::new(InMemoryPaymentLedgerRepo::new());
        let guard = Arc::new(InMemoryIdempotencyGuard::new());
        let cache = Arc::new(InMemoryEntitlementCache::new());

        let subscription_gateway = Arc::new(self.subscription_gateway.unwrap_or_default());
        let charge_gateway = Arc::new(
            self.charge_gateway
                .unwrap_or_else(|| StubChargeGateway::successful(5000, "NGN")),
        );

        let dyn_guard: Arc<dyn IdempotencyGuard> = guard.clone();
        let dyn_cache: Arc<dyn EntitlementCache> = cache.clone();

        let reconciliation = Arc::new(ReconciliationUseCases::new(
            user_repo.clone(),
            sub_repo.clone(),
            ledger.clone(),
            subscription_gateway.clone(),
            dyn_cache.clone(),
            3600,
        ));
        let billing = Arc::new(BillingUseCases::new(
            sub_repo.clone(),
            ledger.clone(),
            subscription_gateway,
            charge_gateway,
            dyn_guard.clone(),
            reconciliation.clone(),
        ));
        let policy = Arc::new(PolicyUseCases::new(user_repo.clone()));

        let queue = spawn_reconcile_worker(reconciliation, billing.clone(), dyn_guard.clone());

        let app_state = AppState {
            config: Arc::new(Self::test_config()),
            billing,
            policy,
            user_repo: user_repo.clone(),
            entitlement_cache: dyn_cache,
            guard: dyn_guard,
            queue,
        };

        let fixtures = TestFixtures {
            user_repo,
            sub_repo,
            ledger,
            guard,
            cache,
        };

        (app_state, fixtures)
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
