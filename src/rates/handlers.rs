use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::audit;
use crate::auth::services::AuthActor;
use crate::error::ApiError;
use crate::policy;
use crate::rates::dto::{AsOfQuery, SetRateRequest};
use crate::rates::repo::Rate;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rates", post(set_rate).get(list_rates))
        .route("/rates/current", get(current_rate))
        .route("/rates/as-of", get(rate_as_of))
}

#[instrument(skip(state, payload))]
async fn set_rate(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Json(payload): Json<SetRateRequest>,
) -> Result<(StatusCode, Json<Rate>), ApiError> {
    policy::require_main_user(&actor)?;

    if payload.rate_per_kwh <= Decimal::ZERO {
        return Err(ApiError::validation("Rate must be greater than 0"));
    }

    let rate = Rate::create(
        &state.db,
        payload.rate_per_kwh,
        payload.effective_from,
        payload.effective_to,
        actor.id,
    )
    .await?;

    audit::record(
        &state.db,
        actor.id,
        "set_rate",
        "electricity_rates",
        Some(rate.id),
        None,
        serde_json::to_value(&rate).ok(),
    )
    .await;

    info!(rate_id = %rate.id, rate = %rate.rate_per_kwh, "electricity rate set");
    Ok((StatusCode::CREATED, Json(rate)))
}

#[instrument(skip(state))]
async fn current_rate(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
) -> Result<Json<Rate>, ApiError> {
    let today = OffsetDateTime::now_utc().date();
    Rate::current(&state.db, today)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Electricity rate"))
}

/// Historical lookup: which rate was in force on a given date, regardless
/// of whether it has since been superseded.
#[instrument(skip(state))]
async fn rate_as_of(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    Query(q): Query<AsOfQuery>,
) -> Result<Json<Rate>, ApiError> {
    Rate::as_of(&state.db, q.date)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Electricity rate"))
}

#[instrument(skip(state))]
async fn list_rates(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<Rate>>, ApiError> {
    policy::require_main_user(&actor)?;
    let rates = Rate::list_all(&state.db).await?;
    Ok(Json(rates))
}
