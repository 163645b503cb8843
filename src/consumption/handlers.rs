use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::services::AuthActor;
use crate::consumption::dto::{
    ConsumptionListQuery, CreateConsumptionRequest, SummaryQuery, UpdateConsumptionRequest,
};
use crate::consumption::repo::{ConsumptionRecord, RecordWithUser, SummaryRow};
use crate::consumption::services;
use crate::error::ApiError;
use crate::policy;
use crate::sharing::services as sharing;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/consumption", get(list_consumption).post(create_consumption))
        .route("/consumption/all", get(list_group_consumption))
        .route("/consumption/summary", get(consumption_summary))
        .route(
            "/consumption/:id",
            get(get_consumption)
                .put(update_consumption)
                .delete(delete_consumption),
        )
}

#[instrument(skip(state, payload))]
async fn create_consumption(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Json(payload): Json<CreateConsumptionRequest>,
) -> Result<(StatusCode, Json<RecordWithUser>), ApiError> {
    let record = services::record_reading(&state.db, &actor, &payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state))]
async fn list_consumption(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Query(q): Query<ConsumptionListQuery>,
) -> Result<Json<Vec<RecordWithUser>>, ApiError> {
    let target = q.user_id.unwrap_or(actor.id);
    let visible = sharing::members_visible_to(&state.db, &actor).await?;
    policy::ensure_can_read(&actor, target, &visible)?;

    let records =
        ConsumptionRecord::list_by_user(&state.db, target, q.billing_cycle.as_deref(), q.limit)
            .await?;
    Ok(Json(records))
}

#[instrument(skip(state))]
async fn list_group_consumption(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<RecordWithUser>>, ApiError> {
    let records = services::group_records(&state.db, &actor).await?;
    Ok(Json(records))
}

#[instrument(skip(state))]
async fn consumption_summary(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<SummaryRow>, ApiError> {
    let target = q.user_id.unwrap_or(actor.id);
    let visible = sharing::members_visible_to(&state.db, &actor).await?;
    policy::ensure_can_read(&actor, target, &visible)?;

    if q.start_date > q.end_date {
        return Err(ApiError::validation("Start date must not be after end date"));
    }

    let summary =
        ConsumptionRecord::summary(&state.db, target, q.start_date, q.end_date).await?;
    Ok(Json(summary))
}

#[instrument(skip(state))]
async fn get_consumption(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordWithUser>, ApiError> {
    let record = ConsumptionRecord::find_with_user(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Consumption record"))?;

    let visible = sharing::members_visible_to(&state.db, &actor).await?;
    policy::ensure_can_read(&actor, record.record.user_id, &visible)?;

    Ok(Json(record))
}

#[instrument(skip(state, payload))]
async fn update_consumption(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateConsumptionRequest>,
) -> Result<Json<RecordWithUser>, ApiError> {
    let record = services::update_reading(&state.db, &actor, id, &payload).await?;
    Ok(Json(record))
}

#[instrument(skip(state))]
async fn delete_consumption(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services::delete_reading(&state.db, &actor, id).await?;
    Ok(Json(serde_json::json!({ "message": "Record deleted successfully" })))
}
