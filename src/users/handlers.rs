use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit;
use crate::auth::dto::PublicUser;
use crate::auth::services::AuthActor;
use crate::error::ApiError;
use crate::policy;
use crate::state::AppState;
use crate::users::dto::UpdateUserRequest;
use crate::users::repo::User;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/shared", get(list_shared_users))
        .route("/users/:id", get(get_user).put(update_user))
        .route("/users/:id/deactivate", post(deactivate_user))
}

fn public(user: User) -> PublicUser {
    PublicUser {
        id: user.id,
        username: user.username,
        phone_number: user.phone_number,
        full_name: user.full_name,
        role: user.role,
        shared_code: user.shared_code,
    }
}

#[instrument(skip(state))]
async fn list_shared_users(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    policy::require_main_user(&actor)?;
    let users = User::list_shared_users(&state.db, actor.id).await?;
    Ok(Json(users.into_iter().map(public).collect()))
}

#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    policy::ensure_can_update_user(&actor, id)?;
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(public(user)))
}

#[instrument(skip(state, payload))]
async fn update_user(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    policy::ensure_can_update_user(&actor, id)?;

    let before = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let updated = User::update_profile(
        &state.db,
        id,
        payload.full_name.as_deref(),
        payload.phone_number.as_deref(),
    )
    .await?
    .ok_or(ApiError::NotFound("User"))?;

    audit::record(
        &state.db,
        actor.id,
        "update_user",
        "users",
        Some(id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&updated).ok(),
    )
    .await;

    info!(user_id = %id, "user profile updated");
    Ok(Json(public(updated)))
}

#[instrument(skip(state))]
async fn deactivate_user(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    policy::require_main_user(&actor)?;

    if !User::deactivate(&state.db, id).await? {
        return Err(ApiError::NotFound("User"));
    }

    audit::record(
        &state.db,
        actor.id,
        "deactivate_user",
        "users",
        Some(id),
        None,
        None,
    )
    .await;

    info!(user_id = %id, "user deactivated");
    Ok(Json(serde_json::json!({ "message": "User deactivated successfully" })))
}
