use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// Appends a before/after snapshot for a mutating action. Best effort: an
/// audit failure is logged and never fails the operation that produced it.
pub async fn record(
    db: &PgPool,
    user_id: Uuid,
    action: &str,
    table_name: &str,
    record_id: Option<Uuid>,
    old_values: Option<Value>,
    new_values: Option<Value>,
) {
    let res = sqlx::query(
        r#"
        INSERT INTO audit_logs (user_id, action, table_name, record_id, old_values, new_values)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(table_name)
    .bind(record_id)
    .bind(old_values)
    .bind(new_values)
    .execute(db)
    .await;

    if let Err(e) = res {
        warn!(error = %e, action, table_name, "audit log write failed");
    }
}
