use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use time::Duration;
use url::Url;

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub redis_url: String,
    pub cors_origin: HeaderValue,
    /// Frontend origin used for checkout success/cancel redirects.
    pub app_origin: Url,
    pub jwt_secret: SecretString,
    /// Identity token lifetime; the entitlement cache TTL is aligned to
    /// this, not to the subscription lifetime.
    pub access_token_ttl: Duration,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    /// Stripe price id of the pro plan.
    pub stripe_price_id: String,
    pub flutterwave_secret_key: SecretString,
    /// Shared secret Flutterwave echoes back in the `verif-hash` header.
    pub flutterwave_verif_hash: SecretString,
    /// In-flight idempotency marker TTL (seconds).
    pub idempotency_in_flight_ttl_secs: u64,
    /// Done idempotency marker TTL (seconds).
    pub idempotency_done_ttl_secs: u64,
    pub maintenance_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3001".parse().unwrap());
        let database_url: String = get_env("DATABASE_URL");
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let app_origin: Url = get_env("APP_ORIGIN");

        let jwt_secret: SecretString = SecretString::new(get_env::<String>("JWT_SECRET").into());
        let access_token_ttl_secs: i64 = get_env_default("ACCESS_TOKEN_TTL_SECS", 86_400);

        let stripe_secret_key: SecretString =
            SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into());
        let stripe_webhook_secret: SecretString =
            SecretString::new(get_env::<String>("STRIPE_WEBHOOK_SECRET").into());
        let stripe_price_id: String = get_env("STRIPE_PRICE_ID");

        let flutterwave_secret_key: SecretString =
            SecretString::new(get_env::<String>("FLUTTERWAVE_SECRET_KEY").into());
        let flutterwave_verif_hash: SecretString =
            SecretString::new(get_env::<String>("FLUTTERWAVE_VERIF_HASH").into());

        let idempotency_in_flight_ttl_secs: u64 =
            get_env_default("IDEMPOTENCY_IN_FLIGHT_TTL_SECS", 900);
        let idempotency_done_ttl_secs: u64 =
            get_env_default("IDEMPOTENCY_DONE_TTL_SECS", 7 * 24 * 3600);
        let maintenance_interval_secs: u64 = get_env_default("MAINTENANCE_INTERVAL_SECS", 3600);

        Self {
            bind_addr,
            database_url,
            redis_url,
            cors_origin,
            app_origin,
            jwt_secret,
            access_token_ttl: Duration::seconds(access_token_ttl_secs),
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_price_id,
            flutterwave_secret_key,
            flutterwave_verif_hash,
            idempotency_in_flight_ttl_secs,
            idempotency_done_ttl_secs,
            maintenance_interval_secs,
        }
    }
}
