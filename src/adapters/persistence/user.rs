use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::UserDirectoryRepo,
    domain::entities::{
        plan::Plan,
        user::{QuotaKind, User},
    },
};

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        identity_id: row.get("identity_id"),
        email: row.get("email"),
        name: row.get("name"),
        phone: row.get("phone"),
        country_code: row.get("country_code"),
        plan: row.get("plan"),
        project_ideas_left: row.get("project_ideas_left"),
        collaboration_requests_left: row.get("collaboration_requests_left"),
        plan_expires_at: row.get("plan_expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, identity_id, email, name, phone, country_code, plan,
    project_ideas_left, collaboration_requests_left, plan_expires_at,
    created_at, updated_at
"#;

#[async_trait]
impl UserDirectoryRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_by_identity(&self, identity_id: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE identity_id = $1",
            SELECT_COLS
        ))
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn set_entitlement(
        &self,
        id: Uuid,
        plan: Plan,
        plan_expires_at: Option<DateTime<Utc>>,
        project_ideas_left: i32,
        collaboration_requests_left: i32,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                plan = $2,
                plan_expires_at = $3,
                project_ideas_left = $4,
                collaboration_requests_left = $5,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(plan)
        .bind(plan_expires_at)
        .bind(project_ideas_left)
        .bind(collaboration_requests_left)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn spend_quota(&self, id: Uuid, kind: QuotaKind) -> AppResult<bool> {
        // Conditional single-statement decrement; concurrent spends cannot
        // drive the counter below zero.
        let column = match kind {
            QuotaKind::ProjectIdeas => "project_ideas_left",
            QuotaKind::CollaborationRequests => "collaboration_requests_left",
        };
        let result = sqlx::query(&format!(
            "UPDATE users SET {column} = {column} - 1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 AND {column} > 0"
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn reset_free_quotas(
        &self,
        project_ideas: i32,
        collaboration_requests: i32,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                project_ideas_left = $1,
                collaboration_requests_left = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE plan = $3
            "#,
        )
        .bind(project_ideas)
        .bind(collaboration_requests)
        .bind(Plan::Free)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected())
    }

    async fn list_pro_users(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE plan = $1",
            SELECT_COLS
        ))
        .bind(Plan::Pro)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_user).collect())
    }
}
