use std::fs::File;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::PostgresPersistence},
    application::{
        ports::{
            entitlement_cache::EntitlementCache,
            gateways::{ChargeGateway, SubscriptionGateway},
            idempotency::IdempotencyGuard,
        },
        use_cases::{
            billing::BillingUseCases,
            policy::PolicyUseCases,
            reconciliation::{
                PaymentLedgerRepo, ReconciliationUseCases, SubscriptionRepo, UserDirectoryRepo,
            },
        },
    },
    infra::{
        config::AppConfig,
        db::init_db,
        entitlement_cache::RedisEntitlementCache,
        flutterwave_client::FlutterwaveClient,
        idempotency::RedisIdempotencyGuard,
        maintenance::MaintenanceDeps,
        reconcile_worker::spawn_reconcile_worker,
        stripe_client::StripeClient,
    },
};

pub async fn init_app_state() -> anyhow::Result<(AppState, MaintenanceDeps)> {
    let config = AppConfig::from_env();

    let pool = init_db(&config.database_url).await?;
    let postgres = Arc::new(PostgresPersistence::new(pool));

    let user_repo = postgres.clone() as Arc<dyn UserDirectoryRepo>;
    let subscription_repo = postgres.clone() as Arc<dyn SubscriptionRepo>;
    let ledger_repo = postgres.clone() as Arc<dyn PaymentLedgerRepo>;

    let guard: Arc<dyn IdempotencyGuard> = Arc::new(
        RedisIdempotencyGuard::new(
            &config.redis_url,
            config.idempotency_in_flight_ttl_secs,
            config.idempotency_done_ttl_secs,
        )
        .await?,
    );
    let entitlement_cache: Arc<dyn EntitlementCache> =
        Arc::new(RedisEntitlementCache::new(&config.redis_url).await?);

    // Gateway adapters are constructed dependencies, not module globals:
    // tests swap in doubles through the same ports.
    let stripe: Arc<dyn SubscriptionGateway> = Arc::new(StripeClient::new(
        config.stripe_secret_key.expose_secret().to_string(),
        config.stripe_price_id.clone(),
        config.app_origin.clone(),
    ));
    let flutterwave: Arc<dyn ChargeGateway> = Arc::new(FlutterwaveClient::new(
        config.flutterwave_secret_key.expose_secret().to_string(),
        config.app_origin.clone(),
    ));

    let reconciliation = Arc::new(ReconciliationUseCases::new(
        user_repo.clone(),
        subscription_repo.clone(),
        ledger_repo.clone(),
        stripe.clone(),
        entitlement_cache.clone(),
        config.access_token_ttl.whole_seconds().max(0) as u64,
    ));
    let billing = Arc::new(BillingUseCases::new(
        subscription_repo.clone(),
        ledger_repo,
        stripe,
        flutterwave,
        guard.clone(),
        reconciliation.clone(),
    ));
    let policy = Arc::new(PolicyUseCases::new(user_repo.clone()));

    let queue = spawn_reconcile_worker(reconciliation.clone(), billing.clone(), guard.clone());

    let maintenance = MaintenanceDeps {
        reconciliation,
        policy: policy.clone(),
        subscription_repo,
        user_repo: user_repo.clone(),
    };

    let app_state = AppState {
        config: Arc::new(config),
        billing,
        policy,
        user_repo,
        entitlement_cache,
        guard,
        queue,
    };

    Ok((app_state, maintenance))
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ideaforge=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
