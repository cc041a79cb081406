pub mod entitlement_cache;
pub mod gateways;
pub mod idempotency;
