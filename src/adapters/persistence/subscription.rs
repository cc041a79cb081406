use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{ActivateSubscription, SubscriptionRepo},
    domain::entities::{
        payment_gateway::PaymentGateway,
        plan::Plan,
        subscription::{Subscription, SubscriptionStatus},
    },
};

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        status: row.get("status"),
        plan: row.get("plan"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        renews_at: row.get("renews_at"),
        gateway: row.get::<Option<PaymentGateway>, _>("gateway"),
        provider_ref: row.get("provider_ref"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, status, plan, starts_at, ends_at, renews_at,
    gateway, provider_ref, created_at, updated_at
"#;

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn get_or_create(&self, user_id: Uuid) -> AppResult<Subscription> {
        // The no-op conflict update lets RETURNING yield the existing row
        // when a concurrent insert won the unique(user_id) race.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (id, user_id, status, plan)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(SubscriptionStatus::Pending)
        .bind(Plan::Free)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_subscription(&row))
    }

    async fn activate(&self, id: Uuid, update: &ActivateSubscription) -> AppResult<Subscription> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions SET
                status = $2,
                plan = $3,
                starts_at = $4,
                ends_at = $5,
                renews_at = $6,
                gateway = $7,
                provider_ref = $8,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(SubscriptionStatus::Active)
        .bind(Plan::Pro)
        .bind(update.starts_at)
        .bind(update.ends_at)
        .bind(update.renews_at)
        .bind(update.gateway)
        .bind(&update.provider_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_subscription(&row))
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()> {
        sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn downgrade(&self, id: Uuid, status: SubscriptionStatus) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                plan = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(Plan::Free)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_pro_past_end(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions \
             WHERE plan = $1 AND ends_at IS NOT NULL AND ends_at < $2 AND status <> $3",
            SELECT_COLS
        ))
        .bind(Plan::Pro)
        .bind(now)
        .bind(SubscriptionStatus::Expired)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_subscription).collect())
    }
}
