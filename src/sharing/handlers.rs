use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument};

use crate::audit;
use crate::auth::services::AuthActor;
use crate::error::ApiError;
use crate::policy;
use crate::sharing::dto::IssuedCodeResponse;
use crate::sharing::repo::{CodeListing, SharedCode};
use crate::sharing::services;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/codes", get(list_codes).post(issue_code))
        .route("/codes/:code", delete(delete_code))
}

#[instrument(skip(state))]
async fn issue_code(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<(StatusCode, Json<IssuedCodeResponse>), ApiError> {
    policy::require_main_user(&actor)?;

    let ttl_days = state.config.shared_code_ttl_days;
    let created = services::issue_code(&state.db, actor.id, ttl_days).await?;

    audit::record(
        &state.db,
        actor.id,
        "issue_shared_code",
        "shared_codes",
        Some(created.id),
        None,
        serde_json::to_value(&created).ok(),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(IssuedCodeResponse {
            code: created.code,
            expires_at: created.expires_at,
        }),
    ))
}

#[instrument(skip(state))]
async fn list_codes(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<CodeListing>>, ApiError> {
    policy::require_main_user(&actor)?;
    let codes = SharedCode::list_for_main_user(&state.db, actor.id).await?;
    Ok(Json(codes))
}

#[instrument(skip(state))]
async fn delete_code(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    policy::require_main_user(&actor)?;

    let existing = SharedCode::find_by_code(&state.db, &code)
        .await?
        .filter(|c| c.main_user_id == actor.id)
        .ok_or(ApiError::NotFound("Shared code"))?;

    // Consumed codes are permanent group tags and must survive.
    if existing.is_used {
        return Err(ApiError::validation(
            "Cannot delete a code that has been used",
        ));
    }

    SharedCode::delete(&state.db, &code).await?;

    audit::record(
        &state.db,
        actor.id,
        "delete_shared_code",
        "shared_codes",
        Some(existing.id),
        serde_json::to_value(&existing).ok(),
        None,
    )
    .await;

    info!(code = %code, "shared code deleted");
    Ok(Json(serde_json::json!({ "message": "Shared code deleted successfully" })))
}
