use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::services::AuthActor;
use crate::bills::dto::{BillListQuery, CreateBillRequest, CycleQuery, UpdateBillRequest};
use crate::bills::repo::{Bill, BillWithContext};
use crate::bills::services::{self, BillView};
use crate::error::ApiError;
use crate::payments::repo::Payment;
use crate::policy;
use crate::sharing::services as sharing;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bills", get(list_my_bills).post(create_bill))
        .route("/bills/all", get(list_group_bills))
        .route("/bills/cycle", get(list_bills_by_cycle))
        .route(
            "/bills/:id",
            get(get_bill).put(update_bill).delete(delete_bill),
        )
}

/// A single bill with its live payment state and payment history.
#[derive(Debug, Serialize)]
pub struct BillDetail {
    #[serde(flatten)]
    pub view: BillView,
    pub payments: Vec<Payment>,
}

#[instrument(skip(state, payload))]
async fn create_bill(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Json(payload): Json<CreateBillRequest>,
) -> Result<(StatusCode, Json<BillWithContext>), ApiError> {
    let bill = services::create_bill(&state.db, &actor, &payload).await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

#[instrument(skip(state))]
async fn list_my_bills(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Query(q): Query<BillListQuery>,
) -> Result<Json<Vec<BillView>>, ApiError> {
    // Shared users see the whole household here; main users their own
    // bills (the group-wide view lives under /bills/all).
    let bills = if actor.is_main() {
        Bill::list_by_user(&state.db, actor.id, q.limit).await?
    } else {
        match sharing::household_main(&state.db, &actor).await? {
            Some(main_id) => Bill::list_for_group(&state.db, main_id, q.limit).await?,
            None => Bill::list_by_user(&state.db, actor.id, q.limit).await?,
        }
    };
    Ok(Json(services::with_payment_summaries(&state.db, bills).await?))
}

#[instrument(skip(state))]
async fn list_group_bills(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<BillView>>, ApiError> {
    let main_id = sharing::household_main(&state.db, &actor)
        .await?
        .unwrap_or(actor.id);
    let bills = Bill::list_for_group(&state.db, main_id, None).await?;
    Ok(Json(services::with_payment_summaries(&state.db, bills).await?))
}

#[instrument(skip(state))]
async fn list_bills_by_cycle(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Query(q): Query<CycleQuery>,
) -> Result<Json<Vec<BillView>>, ApiError> {
    let main_id = sharing::household_main(&state.db, &actor)
        .await?
        .unwrap_or(actor.id);
    let bills = Bill::list_for_group_by_cycle(&state.db, main_id, &q.billing_cycle).await?;
    Ok(Json(services::with_payment_summaries(&state.db, bills).await?))
}

#[instrument(skip(state))]
async fn get_bill(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<BillDetail>, ApiError> {
    let bill = Bill::find_with_context(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))?;

    let visible = sharing::members_visible_to(&state.db, &actor).await?;
    policy::ensure_can_read(&actor, bill.bill.user_id, &visible)?;

    let payments = Payment::list_by_bill(&state.db, id).await?;
    let view = services::with_payment_summary(&state.db, bill).await?;
    Ok(Json(BillDetail { view, payments }))
}

#[instrument(skip(state, payload))]
async fn update_bill(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBillRequest>,
) -> Result<Json<BillWithContext>, ApiError> {
    let bill = services::update_bill(&state.db, &actor, id, &payload).await?;
    Ok(Json(bill))
}

#[instrument(skip(state))]
async fn delete_bill(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    services::delete_bill(&state.db, &actor, id).await?;
    Ok(Json(serde_json::json!({ "message": "Bill deleted successfully" })))
}
