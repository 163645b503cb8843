use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::services::AuthActor;
use crate::bills::repo::Bill;
use crate::error::ApiError;
use crate::payments::dto::CreatePaymentRequest;
use crate::payments::repo::{Payment, PaymentWithBill};
use crate::payments::services;
use crate::policy;
use crate::sharing::services as sharing;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/my", get(list_my_payments))
        .route("/payments/bill/:bill_id", get(list_bill_payments))
        .route("/payments/:id", get(get_payment))
}

#[instrument(skip(state, payload))]
async fn create_payment(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = services::record_payment(&state.db, &actor, &payload).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[instrument(skip(state))]
async fn list_my_payments(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<PaymentWithBill>>, ApiError> {
    let payments = Payment::list_by_user(&state.db, actor.id).await?;
    Ok(Json(payments))
}

#[instrument(skip(state))]
async fn list_bill_payments(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let bill = Bill::find_by_id(&state.db, bill_id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))?;

    let visible = sharing::members_visible_to(&state.db, &actor).await?;
    policy::ensure_can_read(&actor, bill.user_id, &visible)?;

    let payments = Payment::list_by_bill(&state.db, bill_id).await?;
    Ok(Json(payments))
}

#[instrument(skip(state))]
async fn get_payment(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentWithBill>, ApiError> {
    let payment = Payment::find_with_bill(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Payment"))?;

    let visible = sharing::members_visible_to(&state.db, &actor).await?;
    policy::ensure_can_read(&actor, payment.user_id, &visible)?;

    Ok(Json(payment))
}
