use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::plan::Plan};

/// Entitlement snapshot served to the request-authentication path without
/// touching the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntitlement {
    pub user_id: Uuid,
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
}

/// Read-through cache keyed by external identity id. Entries carry a TTL
/// aligned to the identity token lifetime, not the subscription lifetime,
/// so a stale entitlement cannot outlive a sign-in session by more than
/// that bound.
#[async_trait]
pub trait EntitlementCache: Send + Sync {
    async fn get(&self, identity_id: &str) -> AppResult<Option<CachedEntitlement>>;
    async fn put(
        &self,
        identity_id: &str,
        entitlement: &CachedEntitlement,
        ttl_secs: u64,
    ) -> AppResult<()>;
}
