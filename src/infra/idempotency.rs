use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::idempotency::{Admission, IdempotencyGuard},
};

const IN_FLIGHT: &str = "in-flight";
const DONE: &str = "done";

/// Redis-backed marker store. `SET NX EX` makes admission atomic across
/// concurrent deliveries of the same event; markers expire on their own so
/// the store needs no cleanup job.
#[derive(Clone)]
pub struct RedisIdempotencyGuard {
    manager: ConnectionManager,
    in_flight_ttl_secs: u64,
    done_ttl_secs: u64,
}

impl RedisIdempotencyGuard {
    pub async fn new(
        redis_url: &str,
        in_flight_ttl_secs: u64,
        done_ttl_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            in_flight_ttl_secs,
            done_ttl_secs,
        })
    }
}

#[async_trait]
impl IdempotencyGuard for RedisIdempotencyGuard {
    async fn admit(&self, key: &str) -> AppResult<Admission> {
        let mut conn = self.manager.clone();

        let claimed: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(IN_FLIGHT)
            .arg("NX")
            .arg("EX")
            .arg(self.in_flight_ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        if claimed.is_some() {
            return Ok(Admission::Admitted);
        }

        let existing: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        match existing.as_deref() {
            Some(DONE) => Ok(Admission::AlreadyDone),
            // The marker may have expired between SET and GET; treat the
            // gap as a concurrent holder and let redelivery sort it out.
            _ => Ok(Admission::AlreadyInFlight),
        }
    }

    async fn complete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(DONE)
            .arg("EX")
            .arg(self.done_ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn release(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(())
    }
}
