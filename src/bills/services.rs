use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::info;

use crate::audit;
use crate::bills::dto::{CreateBillRequest, UpdateBillRequest};
use crate::bills::repo::{Bill, BillStatus, BillWithContext, NewBill};
use crate::consumption::repo::ConsumptionRecord;
use crate::error::ApiError;
use crate::policy::{self, Actor};
use crate::rates::repo::Rate;

/// Bill status is a pure function of accumulated payments against the
/// total, never a stored truth on its own.
pub fn derive_status(total_amount: Decimal, total_paid: Decimal) -> BillStatus {
    if total_paid >= total_amount {
        BillStatus::Paid
    } else if total_paid > Decimal::ZERO {
        BillStatus::Partial
    } else {
        BillStatus::Unpaid
    }
}

pub fn bill_total(consumption_kwh: Decimal, rate_per_kwh: Decimal) -> Decimal {
    (consumption_kwh * rate_per_kwh).round_dp(2)
}

/// A bill enriched with its live payment state. The embedded status is the
/// derived one, so a stale cache self-heals on read.
#[derive(Debug, Serialize)]
pub struct BillView {
    #[serde(flatten)]
    pub bill: BillWithContext,
    pub total_paid: Decimal,
    pub remaining_amount: Decimal,
}

pub async fn with_payment_summary(
    db: &PgPool,
    mut bill: BillWithContext,
) -> Result<BillView, ApiError> {
    let total_paid = Bill::total_paid(db, bill.bill.id).await?;
    let remaining = bill.bill.total_amount - total_paid;
    bill.bill.status = derive_status(bill.bill.total_amount, total_paid);
    Ok(BillView {
        bill,
        total_paid,
        remaining_amount: remaining,
    })
}

pub async fn with_payment_summaries(
    db: &PgPool,
    bills: Vec<BillWithContext>,
) -> Result<Vec<BillView>, ApiError> {
    let mut views = Vec::with_capacity(bills.len());
    for bill in bills {
        views.push(with_payment_summary(db, bill).await?);
    }
    Ok(views)
}

/// Creates a bill from a consumption record, snapshotting the record's kWh
/// and the current rate at creation time.
pub async fn create_bill(
    db: &PgPool,
    actor: &Actor,
    req: &CreateBillRequest,
) -> Result<BillWithContext, ApiError> {
    policy::require_main_user(actor)?;

    if req.billing_cycle.trim().is_empty() {
        return Err(ApiError::validation("Billing cycle is required"));
    }

    let record = ConsumptionRecord::find_by_id(db, req.consumption_record_id)
        .await?
        .ok_or(ApiError::NotFound("Consumption record"))?;

    let today = OffsetDateTime::now_utc().date();
    let rate = Rate::current(db, today)
        .await?
        .ok_or(ApiError::NoActiveRate)?;

    // Owner defaults to the record's owner unless explicitly overridden.
    let owner = req.user_id.unwrap_or(record.user_id);
    let total = bill_total(record.consumption_kwh, rate.rate_per_kwh);

    let bill = Bill::insert(
        db,
        &NewBill {
            user_id: owner,
            consumption_record_id: record.id,
            billing_cycle: &req.billing_cycle,
            consumption_kwh: record.consumption_kwh,
            rate_per_kwh: rate.rate_per_kwh,
            total_amount: total,
            due_date: req.due_date,
        },
    )
    .await?;

    audit::record(
        db,
        actor.id,
        "create_bill",
        "bills",
        Some(bill.id),
        None,
        serde_json::to_value(&bill).ok(),
    )
    .await;

    info!(bill_id = %bill.id, user_id = %owner, total = %total, "bill created");

    Bill::find_with_context(db, bill.id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))
}

/// Partial bill update. When either the rate or the kWh changes, the total
/// is recomputed from the post-update pair, falling back to stored values.
pub async fn update_bill(
    db: &PgPool,
    actor: &Actor,
    id: uuid::Uuid,
    req: &UpdateBillRequest,
) -> Result<BillWithContext, ApiError> {
    policy::require_main_user(actor)?;

    let existing = Bill::find_by_id(db, id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))?;

    let kwh = req.consumption_kwh.unwrap_or(existing.consumption_kwh);
    let rate = req.rate_per_kwh.unwrap_or(existing.rate_per_kwh);
    let total = if req.consumption_kwh.is_some() || req.rate_per_kwh.is_some() {
        bill_total(kwh, rate)
    } else {
        existing.total_amount
    };

    let updated = Bill::update(
        db,
        id,
        req.billing_cycle.as_deref(),
        kwh,
        rate,
        total,
        req.due_date,
    )
    .await?
    .ok_or(ApiError::NotFound("Bill"))?;

    audit::record(
        db,
        actor.id,
        "update_bill",
        "bills",
        Some(id),
        serde_json::to_value(&existing).ok(),
        serde_json::to_value(&updated).ok(),
    )
    .await;

    Bill::find_with_context(db, id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))
}

pub async fn delete_bill(db: &PgPool, actor: &Actor, id: uuid::Uuid) -> Result<(), ApiError> {
    policy::require_main_user(actor)?;

    let existing = Bill::find_by_id(db, id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))?;

    Bill::delete(db, id).await?;

    audit::record(
        db,
        actor.id,
        "delete_bill",
        "bills",
        Some(id),
        serde_json::to_value(&existing).ok(),
        None,
    )
    .await;

    info!(bill_id = %id, "bill deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fifty_kwh_at_twelve_fifty_is_625() {
        assert_eq!(bill_total(dec!(50), dec!(12.50)), dec!(625.00));
    }

    #[test]
    fn totals_round_to_cents() {
        assert_eq!(bill_total(dec!(3), dec!(0.3333)), dec!(1.00));
    }

    #[test]
    fn zero_paid_is_unpaid() {
        assert_eq!(derive_status(dec!(625), Decimal::ZERO), BillStatus::Unpaid);
    }

    #[test]
    fn partial_payment_is_partial() {
        assert_eq!(derive_status(dec!(625), dec!(100)), BillStatus::Partial);
    }

    #[test]
    fn exact_payment_is_paid() {
        assert_eq!(derive_status(dec!(625), dec!(625)), BillStatus::Paid);
    }

    #[test]
    fn overshoot_is_still_paid() {
        assert_eq!(derive_status(dec!(625), dec!(700)), BillStatus::Paid);
    }

    #[test]
    fn zero_total_with_no_payments_is_paid() {
        // 0 >= 0: a zero-amount bill needs no payment.
        assert_eq!(derive_status(Decimal::ZERO, Decimal::ZERO), BillStatus::Paid);
    }
}
