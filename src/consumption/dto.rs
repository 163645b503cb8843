use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateConsumptionRequest {
    /// Defaults to the requester; main users may record for group members.
    pub user_id: Option<Uuid>,
    pub reading_date: Date,
    pub current_reading: Decimal,
    /// Defaults to the user's latest prior reading, or 0 with no history.
    pub previous_reading: Option<Decimal>,
    /// Supplying a cycle label triggers automatic billing.
    pub billing_cycle: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConsumptionRequest {
    pub reading_date: Option<Date>,
    pub previous_reading: Option<Decimal>,
    pub current_reading: Option<Decimal>,
    pub billing_cycle: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsumptionListQuery {
    pub user_id: Option<Uuid>,
    pub billing_cycle: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub user_id: Option<Uuid>,
    pub start_date: Date,
    pub end_date: Date,
}
