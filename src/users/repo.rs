use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::policy::Role;

const USER_COLUMNS: &str =
    "id, username, phone_number, password_hash, full_name, role, shared_code, is_active, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    /// For a main user: the group tag they own. For a shared user: the code
    /// they joined with, kept permanently as their group membership.
    pub shared_code: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub phone_number: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: Role,
    pub shared_code: Option<&'a str>,
}

impl User {
    pub async fn find_by_username(db: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_phone(db: &PgPool, phone_number: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1"
        ))
        .bind(phone_number)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_shared_code(db: &PgPool, code: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE shared_code = $1"
        ))
        .bind(code)
        .fetch_optional(db)
        .await
    }

    /// Inserts a new user. Takes any executor so joins can run inside the
    /// same transaction that consumes a shared code.
    pub async fn create<'e, E>(db: E, new: &NewUser<'_>) -> sqlx::Result<User>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, phone_number, password_hash, full_name, role, shared_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.username)
        .bind(new.phone_number)
        .bind(new.password_hash)
        .bind(new.full_name)
        .bind(new.role)
        .bind(new.shared_code)
        .fetch_one(db)
        .await
    }

    /// Every shared user joined through any code this main user has issued.
    pub async fn list_shared_users(db: &PgPool, main_user_id: Uuid) -> sqlx::Result<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE role = 'shared_user' AND shared_code IN (
                SELECT code FROM shared_codes WHERE main_user_id = $1
            )
            ORDER BY created_at
            "#
        ))
        .bind(main_user_id)
        .fetch_all(db)
        .await
    }

    /// Partial profile update. Password and role are never updatable here.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        full_name: Option<&str>,
        phone_number: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                phone_number = COALESCE($3, phone_number),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(full_name)
        .bind(phone_number)
        .fetch_optional(db)
        .await
    }

    /// Soft-disable. Users are never hard-deleted.
    pub async fn deactivate(db: &PgPool, id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query("UPDATE users SET is_active = FALSE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
