use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{NewPayment, PaymentLedgerRepo},
    domain::entities::payment::Payment,
};

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Payment {
    Payment {
        id: row.get("id"),
        subscription_id: row.get("subscription_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        reference: row.get("reference"),
        gateway: row.get("gateway"),
        status: row.get("status"),
        paid_at: row.get("paid_at"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, subscription_id, amount, currency, reference, gateway, status,
    paid_at, created_at
"#;

#[async_trait]
impl PaymentLedgerRepo for PostgresPersistence {
    async fn append(&self, input: &NewPayment) -> AppResult<Payment> {
        // Insert only; entries are never updated or removed.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments
                (id, subscription_id, amount, currency, reference, gateway, status, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(input.subscription_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(&input.reference)
        .bind(input.gateway)
        .bind(input.status)
        .bind(input.paid_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_payment(&row))
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> AppResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE subscription_id = $1 ORDER BY created_at DESC",
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_payment).collect())
    }
}
