use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

const PAYMENT_COLUMNS: &str =
    "id, bill_id, amount, payment_date, payment_method, reference_number, notes, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub payment_date: Date,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
}

/// A payment joined with its bill and the bill's owner.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentWithBill {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub payment: Payment,
    pub user_id: Uuid,
    pub billing_cycle: String,
    pub total_amount: Decimal,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug)]
pub struct NewPayment<'a> {
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub payment_date: Date,
    pub payment_method: Option<&'a str>,
    pub reference_number: Option<&'a str>,
    pub notes: Option<&'a str>,
}

impl Payment {
    pub async fn insert<'e, E>(db: E, new: &NewPayment<'_>) -> sqlx::Result<Payment>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments
                (bill_id, amount, payment_date, payment_method, reference_number, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(new.bill_id)
        .bind(new.amount)
        .bind(new.payment_date)
        .bind(new.payment_method)
        .bind(new.reference_number)
        .bind(new.notes)
        .fetch_one(db)
        .await
    }

    pub async fn list_by_bill(db: &PgPool, bill_id: Uuid) -> sqlx::Result<Vec<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE bill_id = $1
            ORDER BY payment_date DESC
            "#
        ))
        .bind(bill_id)
        .fetch_all(db)
        .await
    }

    pub async fn find_with_bill(db: &PgPool, id: Uuid) -> sqlx::Result<Option<PaymentWithBill>> {
        sqlx::query_as::<_, PaymentWithBill>(
            r#"
            SELECT p.*, b.user_id, b.billing_cycle, b.total_amount, u.username, u.full_name
            FROM payments p
            JOIN bills b ON b.id = p.bill_id
            JOIN users u ON u.id = b.user_id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Payments against bills owned by this user.
    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<PaymentWithBill>> {
        sqlx::query_as::<_, PaymentWithBill>(
            r#"
            SELECT p.*, b.user_id, b.billing_cycle, b.total_amount, u.username, u.full_name
            FROM payments p
            JOIN bills b ON b.id = p.bill_id
            JOIN users u ON u.id = b.user_id
            WHERE b.user_id = $1
            ORDER BY p.payment_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }
}
