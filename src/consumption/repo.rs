use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, user_id, reading_date, previous_reading, current_reading, \
                              consumption_kwh, billing_cycle, notes, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConsumptionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reading_date: Date,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    /// Always derived from the two readings, never trusted independently.
    pub consumption_kwh: Decimal,
    pub billing_cycle: Option<String>,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A record joined with its owner, as returned by read endpoints.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecordWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: ConsumptionRecord,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug)]
pub struct NewRecord<'a> {
    pub user_id: Uuid,
    pub reading_date: Date,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub consumption_kwh: Decimal,
    pub billing_cycle: Option<&'a str>,
    pub notes: Option<&'a str>,
}

impl ConsumptionRecord {
    pub async fn insert(db: &PgPool, new: &NewRecord<'_>) -> sqlx::Result<ConsumptionRecord> {
        sqlx::query_as::<_, ConsumptionRecord>(&format!(
            r#"
            INSERT INTO consumption_records
                (user_id, reading_date, previous_reading, current_reading,
                 consumption_kwh, billing_cycle, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.reading_date)
        .bind(new.previous_reading)
        .bind(new.current_reading)
        .bind(new.consumption_kwh)
        .bind(new.billing_cycle)
        .bind(new.notes)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<ConsumptionRecord>> {
        sqlx::query_as::<_, ConsumptionRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM consumption_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_with_user(db: &PgPool, id: Uuid) -> sqlx::Result<Option<RecordWithUser>> {
        sqlx::query_as::<_, RecordWithUser>(
            r#"
            SELECT cr.*, u.username, u.full_name
            FROM consumption_records cr
            JOIN users u ON u.id = cr.user_id
            WHERE cr.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// NULL binds widen the filter: no cycle matches every cycle, no limit
    /// returns everything.
    pub async fn list_by_user(
        db: &PgPool,
        user_id: Uuid,
        billing_cycle: Option<&str>,
        limit: Option<i64>,
    ) -> sqlx::Result<Vec<RecordWithUser>> {
        sqlx::query_as::<_, RecordWithUser>(
            r#"
            SELECT cr.*, u.username, u.full_name
            FROM consumption_records cr
            JOIN users u ON u.id = cr.user_id
            WHERE cr.user_id = $1
              AND ($2::varchar IS NULL OR cr.billing_cycle = $2)
            ORDER BY cr.reading_date DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(billing_cycle)
        .bind(limit)
        .fetch_all(db)
        .await
    }

    /// The newest record, with insertion order breaking same-day ties so
    /// previous-reading defaulting always sees the latest capture.
    pub async fn latest_by_user(
        db: &PgPool,
        user_id: Uuid,
    ) -> sqlx::Result<Option<ConsumptionRecord>> {
        sqlx::query_as::<_, ConsumptionRecord>(&format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM consumption_records
            WHERE user_id = $1
            ORDER BY reading_date DESC, created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Every record in the household: the main user's own plus those of all
    /// users joined through this main user's codes.
    pub async fn list_for_group(
        db: &PgPool,
        main_user_id: Uuid,
    ) -> sqlx::Result<Vec<RecordWithUser>> {
        sqlx::query_as::<_, RecordWithUser>(
            r#"
            SELECT cr.*, u.username, u.full_name
            FROM consumption_records cr
            JOIN users u ON u.id = cr.user_id
            WHERE u.id = $1 OR u.shared_code IN (
                SELECT code FROM shared_codes WHERE main_user_id = $1
            )
            ORDER BY cr.reading_date DESC
            "#,
        )
        .bind(main_user_id)
        .fetch_all(db)
        .await
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        reading_date: Option<Date>,
        previous_reading: Decimal,
        current_reading: Decimal,
        consumption_kwh: Decimal,
        billing_cycle: Option<&str>,
        notes: Option<&str>,
    ) -> sqlx::Result<Option<ConsumptionRecord>> {
        sqlx::query_as::<_, ConsumptionRecord>(&format!(
            r#"
            UPDATE consumption_records
            SET reading_date = COALESCE($2, reading_date),
                previous_reading = $3,
                current_reading = $4,
                consumption_kwh = $5,
                billing_cycle = COALESCE($6, billing_cycle),
                notes = COALESCE($7, notes),
                updated_at = now()
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(reading_date)
        .bind(previous_reading)
        .bind(current_reading)
        .bind(consumption_kwh)
        .bind(billing_cycle)
        .bind(notes)
        .fetch_optional(db)
        .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query("DELETE FROM consumption_records WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn summary(
        db: &PgPool,
        user_id: Uuid,
        from: Date,
        to: Date,
    ) -> sqlx::Result<SummaryRow> {
        sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT
                SUM(consumption_kwh) AS total_kwh,
                COUNT(*) AS record_count,
                MIN(reading_date) AS earliest_date,
                MAX(reading_date) AS latest_date
            FROM consumption_records
            WHERE user_id = $1 AND reading_date BETWEEN $2 AND $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(db)
        .await
    }
}

/// Aggregate over an inclusive date range. `total_kwh` may be negative if
/// meter resets occurred in-range.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SummaryRow {
    pub total_kwh: Option<Decimal>,
    pub record_count: i64,
    pub earliest_date: Option<Date>,
    pub latest_date: Option<Date>,
}
