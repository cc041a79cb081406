pub mod app;
pub mod config;
pub mod db;
pub mod entitlement_cache;
pub mod flutterwave_client;
pub mod idempotency;
pub mod maintenance;
pub mod reconcile_worker;
pub mod setup;
pub mod stripe_client;
