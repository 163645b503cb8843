use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

const BILL_COLUMNS: &str = "id, user_id, consumption_record_id, billing_cycle, consumption_kwh, \
                            rate_per_kwh, total_amount, due_date, status, created_at, updated_at";

/// Persisted bill state. The stored status is a cache refreshed on payment
/// writes; read paths re-derive it from the payment sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bill_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Unpaid,
    Partial,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub consumption_record_id: Uuid,
    pub billing_cycle: String,
    /// Snapshot taken at creation time; later edits to the source record do
    /// not retroactively change the bill.
    pub consumption_kwh: Decimal,
    pub rate_per_kwh: Decimal,
    pub total_amount: Decimal,
    pub due_date: Option<Date>,
    pub status: BillStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A bill joined with its owner and source reading, as read endpoints
/// return it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BillWithContext {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub bill: Bill,
    pub username: String,
    pub full_name: String,
    pub reading_date: Date,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
}

#[derive(Debug)]
pub struct NewBill<'a> {
    pub user_id: Uuid,
    pub consumption_record_id: Uuid,
    pub billing_cycle: &'a str,
    pub consumption_kwh: Decimal,
    pub rate_per_kwh: Decimal,
    pub total_amount: Decimal,
    pub due_date: Option<Date>,
}

const CONTEXT_SELECT: &str = r#"
    SELECT b.*, u.username, u.full_name,
           cr.reading_date, cr.previous_reading, cr.current_reading
    FROM bills b
    JOIN users u ON u.id = b.user_id
    JOIN consumption_records cr ON cr.id = b.consumption_record_id
"#;

impl Bill {
    pub async fn insert(db: &PgPool, new: &NewBill<'_>) -> sqlx::Result<Bill> {
        sqlx::query_as::<_, Bill>(&format!(
            r#"
            INSERT INTO bills
                (user_id, consumption_record_id, billing_cycle, consumption_kwh,
                 rate_per_kwh, total_amount, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.consumption_record_id)
        .bind(new.billing_cycle)
        .bind(new.consumption_kwh)
        .bind(new.rate_per_kwh)
        .bind(new.total_amount)
        .bind(new.due_date)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<Bill>> {
        sqlx::query_as::<_, Bill>(&format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Locks the bill row for the enclosing transaction. Used by payment
    /// recording so two concurrent payments cannot both pass the
    /// overpayment check.
    pub async fn find_locked(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> sqlx::Result<Option<Bill>> {
        sqlx::query_as::<_, Bill>(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn find_with_context(db: &PgPool, id: Uuid) -> sqlx::Result<Option<BillWithContext>> {
        sqlx::query_as::<_, BillWithContext>(&format!("{CONTEXT_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_by_user(
        db: &PgPool,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> sqlx::Result<Vec<BillWithContext>> {
        sqlx::query_as::<_, BillWithContext>(&format!(
            "{CONTEXT_SELECT} WHERE b.user_id = $1 ORDER BY b.created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(db)
        .await
    }

    pub async fn list_for_group(
        db: &PgPool,
        main_user_id: Uuid,
        limit: Option<i64>,
    ) -> sqlx::Result<Vec<BillWithContext>> {
        sqlx::query_as::<_, BillWithContext>(&format!(
            r#"
            {CONTEXT_SELECT}
            WHERE u.id = $1 OR u.shared_code IN (
                SELECT code FROM shared_codes WHERE main_user_id = $1
            )
            ORDER BY b.created_at DESC
            LIMIT $2
            "#
        ))
        .bind(main_user_id)
        .bind(limit)
        .fetch_all(db)
        .await
    }

    pub async fn list_for_group_by_cycle(
        db: &PgPool,
        main_user_id: Uuid,
        billing_cycle: &str,
    ) -> sqlx::Result<Vec<BillWithContext>> {
        sqlx::query_as::<_, BillWithContext>(&format!(
            r#"
            {CONTEXT_SELECT}
            WHERE b.billing_cycle = $2 AND (u.id = $1 OR u.shared_code IN (
                SELECT code FROM shared_codes WHERE main_user_id = $1
            ))
            ORDER BY b.created_at DESC
            "#
        ))
        .bind(main_user_id)
        .bind(billing_cycle)
        .fetch_all(db)
        .await
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        billing_cycle: Option<&str>,
        consumption_kwh: Decimal,
        rate_per_kwh: Decimal,
        total_amount: Decimal,
        due_date: Option<Date>,
    ) -> sqlx::Result<Option<Bill>> {
        sqlx::query_as::<_, Bill>(&format!(
            r#"
            UPDATE bills
            SET billing_cycle = COALESCE($2, billing_cycle),
                consumption_kwh = $3,
                rate_per_kwh = $4,
                total_amount = $5,
                due_date = COALESCE($6, due_date),
                updated_at = now()
            WHERE id = $1
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(billing_cycle)
        .bind(consumption_kwh)
        .bind(rate_per_kwh)
        .bind(total_amount)
        .bind(due_date)
        .fetch_optional(db)
        .await
    }

    pub async fn update_status<'e, E>(db: E, id: Uuid, status: BillStatus) -> sqlx::Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let res = sqlx::query("UPDATE bills SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Deleting a bill cascades to its payments via the foreign key.
    pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query("DELETE FROM bills WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn total_paid<'e, E>(db: E, bill_id: Uuid) -> sqlx::Result<Decimal>
    where
        E: PgExecutor<'e>,
    {
        let row: (Decimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE bill_id = $1",
        )
        .bind(bill_id)
        .fetch_one(db)
        .await?;
        Ok(row.0)
    }
}
