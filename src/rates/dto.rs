use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

#[derive(Debug, Deserialize)]
pub struct SetRateRequest {
    pub rate_per_kwh: Decimal,
    pub effective_from: Date,
    pub effective_to: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    pub date: Date,
}
