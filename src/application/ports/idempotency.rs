use async_trait::async_trait;

use crate::app_error::AppResult;

/// Outcome of attempting to claim a dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller now holds the in-flight marker and may perform side effects.
    Admitted,
    /// Another delivery of the same event is being processed right now.
    AlreadyInFlight,
    /// The event was fully processed earlier; treat as a successful no-op.
    AlreadyDone,
}

/// TTL-based marker store serializing side effects per external event.
///
/// A key transitions none -> in-flight (short TTL) -> done (long TTL) on
/// success, or back to none via `release` on failure so a legitimate
/// gateway redelivery gets a second chance. Marker expiry means a later
/// identical notification is treated as fresh; business-level idempotency
/// in the reconciler bounds the damage.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    async fn admit(&self, key: &str) -> AppResult<Admission>;
    async fn complete(&self, key: &str) -> AppResult<()>;
    async fn release(&self, key: &str) -> AppResult<()>;
}
