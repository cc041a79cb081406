use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::entitlement_cache::{CachedEntitlement, EntitlementCache},
};

fn cache_key(identity_id: &str) -> String {
    format!("entitlement:{identity_id}")
}

/// Redis-backed read-through cache for the request-authentication path.
#[derive(Clone)]
pub struct RedisEntitlementCache {
    manager: ConnectionManager,
}

impl RedisEntitlementCache {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl EntitlementCache for RedisEntitlementCache {
    async fn get(&self, identity_id: &str) -> AppResult<Option<CachedEntitlement>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(cache_key(identity_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(entitlement) => Ok(Some(entitlement)),
                Err(e) => {
                    // A corrupt entry is a miss; the read-through path
                    // rewrites it.
                    tracing::warn!(identity_id, error = %e, "Dropping unparsable cache entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        identity_id: &str,
        entitlement: &CachedEntitlement,
        ttl_secs: u64,
    ) -> AppResult<()> {
        let json = serde_json::to_string(entitlement)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(cache_key(identity_id))
            .arg(json)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(())
    }
}
