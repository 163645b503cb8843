use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    /// Defaults to the consumption record's owner when omitted.
    pub user_id: Option<Uuid>,
    pub consumption_record_id: Uuid,
    pub billing_cycle: String,
    pub due_date: Option<Date>,
}

/// Partial update; omitted fields keep their stored values. `billing_cycle`
/// and `due_date` can be replaced but not cleared back to NULL.
#[derive(Debug, Deserialize)]
pub struct UpdateBillRequest {
    pub billing_cycle: Option<String>,
    pub consumption_kwh: Option<Decimal>,
    pub rate_per_kwh: Option<Decimal>,
    pub due_date: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct BillListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CycleQuery {
    pub billing_cycle: String,
}
