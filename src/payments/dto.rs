use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub payment_date: Date,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}
