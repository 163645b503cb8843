use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

const RATE_COLUMNS: &str =
    "id, rate_per_kwh, effective_from, effective_to, is_active, created_by, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rate {
    pub id: Uuid,
    pub rate_per_kwh: Decimal,
    pub effective_from: Date,
    pub effective_to: Option<Date>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

impl Rate {
    /// Switches the ledger to a new rate: deactivate-all then insert-one,
    /// in a single transaction so no two rates are ever active at once.
    pub async fn create(
        db: &PgPool,
        rate_per_kwh: Decimal,
        effective_from: Date,
        effective_to: Option<Date>,
        created_by: Uuid,
    ) -> sqlx::Result<Rate> {
        let mut tx = db.begin().await?;

        sqlx::query("UPDATE electricity_rates SET is_active = FALSE WHERE is_active = TRUE")
            .execute(&mut *tx)
            .await?;

        let rate = sqlx::query_as::<_, Rate>(&format!(
            r#"
            INSERT INTO electricity_rates (rate_per_kwh, effective_from, effective_to, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {RATE_COLUMNS}
            "#
        ))
        .bind(rate_per_kwh)
        .bind(effective_from)
        .bind(effective_to)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rate)
    }

    /// The active rate whose effective window contains `as_of`, latest
    /// `effective_from` winning ties. Absence is a valid outcome.
    pub async fn current(db: &PgPool, as_of: Date) -> sqlx::Result<Option<Rate>> {
        sqlx::query_as::<_, Rate>(&format!(
            r#"
            SELECT {RATE_COLUMNS} FROM electricity_rates
            WHERE is_active = TRUE
              AND effective_from <= $1
              AND (effective_to IS NULL OR effective_to >= $1)
            ORDER BY effective_from DESC
            LIMIT 1
            "#
        ))
        .bind(as_of)
        .fetch_optional(db)
        .await
    }

    /// Window-only resolution ignoring the active flag, so historical dates
    /// resolve to the rate that was in force back then.
    pub async fn as_of(db: &PgPool, date: Date) -> sqlx::Result<Option<Rate>> {
        sqlx::query_as::<_, Rate>(&format!(
            r#"
            SELECT {RATE_COLUMNS} FROM electricity_rates
            WHERE effective_from <= $1
              AND (effective_to IS NULL OR effective_to >= $1)
            ORDER BY effective_from DESC
            LIMIT 1
            "#
        ))
        .bind(date)
        .fetch_optional(db)
        .await
    }

    pub async fn list_all(db: &PgPool) -> sqlx::Result<Vec<Rate>> {
        sqlx::query_as::<_, Rate>(&format!(
            "SELECT {RATE_COLUMNS} FROM electricity_rates ORDER BY effective_from DESC"
        ))
        .fetch_all(db)
        .await
    }
}
