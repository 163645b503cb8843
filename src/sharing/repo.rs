use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

const CODE_COLUMNS: &str =
    "id, code, main_user_id, expires_at, is_used, used_by_user_id, created_at";

/// A household invitation. Joinable once while unused and unexpired; after
/// consumption the code value lives on as the joining user's permanent
/// group tag.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SharedCode {
    pub id: Uuid,
    pub code: String,
    pub main_user_id: Uuid,
    pub expires_at: Option<OffsetDateTime>,
    pub is_used: bool,
    pub used_by_user_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// A joinable code together with its issuing main user.
#[derive(Debug, Clone, FromRow)]
pub struct CodeResolution {
    pub code: String,
    pub main_user_id: Uuid,
    pub main_username: String,
    pub main_full_name: String,
}

/// Listing row for a main user's issued codes.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CodeListing {
    pub code: String,
    pub expires_at: Option<OffsetDateTime>,
    pub is_used: bool,
    pub used_by_username: Option<String>,
    pub used_by_full_name: Option<String>,
    pub created_at: OffsetDateTime,
}

impl SharedCode {
    pub async fn insert(
        db: &PgPool,
        code: &str,
        main_user_id: Uuid,
        expires_at: Option<OffsetDateTime>,
    ) -> sqlx::Result<SharedCode> {
        sqlx::query_as::<_, SharedCode>(&format!(
            r#"
            INSERT INTO shared_codes (code, main_user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {CODE_COLUMNS}
            "#
        ))
        .bind(code)
        .bind(main_user_id)
        .bind(expires_at)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_code(db: &PgPool, code: &str) -> sqlx::Result<Option<SharedCode>> {
        sqlx::query_as::<_, SharedCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM shared_codes WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(db)
        .await
    }

    /// Resolves a code that is still consumable (unused and unexpired) and
    /// locks the code row for the duration of the enclosing transaction so
    /// two concurrent joins cannot both consume it.
    pub async fn resolve_locked(
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> sqlx::Result<Option<CodeResolution>> {
        sqlx::query_as::<_, CodeResolution>(
            r#"
            SELECT sc.code, sc.main_user_id,
                   u.username AS main_username, u.full_name AS main_full_name
            FROM shared_codes sc
            JOIN users u ON u.id = sc.main_user_id
            WHERE sc.code = $1 AND sc.is_used = FALSE
              AND (sc.expires_at IS NULL OR sc.expires_at > now())
            FOR UPDATE OF sc
            "#,
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn mark_used<'e, E>(db: E, code: &str, user_id: Uuid) -> sqlx::Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let res = sqlx::query(
            "UPDATE shared_codes SET is_used = TRUE, used_by_user_id = $2 WHERE code = $1",
        )
        .bind(code)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_for_main_user(
        db: &PgPool,
        main_user_id: Uuid,
    ) -> sqlx::Result<Vec<CodeListing>> {
        sqlx::query_as::<_, CodeListing>(
            r#"
            SELECT sc.code, sc.expires_at, sc.is_used,
                   u.username AS used_by_username, u.full_name AS used_by_full_name,
                   sc.created_at
            FROM shared_codes sc
            LEFT JOIN users u ON u.id = sc.used_by_user_id
            WHERE sc.main_user_id = $1
            ORDER BY sc.created_at DESC
            "#,
        )
        .bind(main_user_id)
        .fetch_all(db)
        .await
    }

    pub async fn delete(db: &PgPool, code: &str) -> sqlx::Result<bool> {
        let res = sqlx::query("DELETE FROM shared_codes WHERE code = $1")
            .bind(code)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// The main user plus everyone whose group tag matches any code this
    /// main user has issued. Membership is by code possession, not by the
    /// used flag.
    pub async fn group_member_ids(db: &PgPool, main_user_id: Uuid) -> sqlx::Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE id = $1 OR shared_code IN (
                SELECT code FROM shared_codes WHERE main_user_id = $1
            )
            "#,
        )
        .bind(main_user_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Resolves a shared user's group tag back to the issuing main user.
    pub async fn issuer_of(db: &PgPool, shared_user_id: Uuid) -> sqlx::Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT sc.main_user_id
            FROM users u
            JOIN shared_codes sc ON sc.code = u.shared_code
            WHERE u.id = $1
            "#,
        )
        .bind(shared_user_id)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}
