use rust_decimal::Decimal;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit;
use crate::bills::repo::{Bill, NewBill};
use crate::bills::services::bill_total;
use crate::consumption::dto::{CreateConsumptionRequest, UpdateConsumptionRequest};
use crate::consumption::repo::{ConsumptionRecord, NewRecord, RecordWithUser};
use crate::error::ApiError;
use crate::policy::{self, Actor};
use crate::rates::repo::Rate;
use crate::sharing::services as sharing;

/// Previous reading defaults to the latest prior reading, or 0 for a
/// first-ever record.
pub fn resolve_previous(explicit: Option<Decimal>, latest_current: Option<Decimal>) -> Decimal {
    explicit.or(latest_current).unwrap_or(Decimal::ZERO)
}

pub fn reading_delta(current: Decimal, previous: Decimal) -> Decimal {
    current - previous
}

/// Merges an edit over an existing record and recomputes the delta.
///
/// Creation tolerates a negative delta (a meter was reset or replaced), but
/// an in-place edit producing one is rejected: edits correct mistakes, they
/// do not record meter events. This asymmetry is deliberate.
pub fn merged_edit(
    existing: &ConsumptionRecord,
    new_previous: Option<Decimal>,
    new_current: Option<Decimal>,
) -> Result<(Decimal, Decimal, Decimal), ApiError> {
    let previous = new_previous.unwrap_or(existing.previous_reading);
    let current = new_current.unwrap_or(existing.current_reading);
    let delta = reading_delta(current, previous);
    if (new_previous.is_some() || new_current.is_some()) && delta < Decimal::ZERO {
        return Err(ApiError::validation("Invalid readings"));
    }
    Ok((previous, current, delta))
}

pub async fn record_reading(
    db: &PgPool,
    actor: &Actor,
    req: &CreateConsumptionRequest,
) -> Result<RecordWithUser, ApiError> {
    let target = req.user_id.unwrap_or(actor.id);
    let visible = sharing::members_visible_to(db, actor).await?;
    policy::ensure_can_write_reading(actor, target, &visible)?;

    let latest = ConsumptionRecord::latest_by_user(db, target).await?;
    let previous = resolve_previous(req.previous_reading, latest.map(|r| r.current_reading));
    let delta = reading_delta(req.current_reading, previous);

    if delta < Decimal::ZERO {
        info!(user_id = %target, delta = %delta, "negative consumption recorded (meter reset)");
    }

    let record = ConsumptionRecord::insert(
        db,
        &NewRecord {
            user_id: target,
            reading_date: req.reading_date,
            previous_reading: previous,
            current_reading: req.current_reading,
            consumption_kwh: delta,
            billing_cycle: req.billing_cycle.as_deref(),
            notes: req.notes.as_deref(),
        },
    )
    .await?;

    if let Some(cycle) = req.billing_cycle.as_deref() {
        auto_bill(db, &record, cycle).await?;
    }

    audit::record(
        db,
        actor.id,
        "create_consumption",
        "consumption_records",
        Some(record.id),
        None,
        serde_json::to_value(&record).ok(),
    )
    .await;

    ConsumptionRecord::find_with_user(db, record.id)
        .await?
        .ok_or(ApiError::NotFound("Consumption record"))
}

/// Bills a fresh reading against the current rate. With no rate configured
/// this is a documented no-op, not a failure.
async fn auto_bill(db: &PgPool, record: &ConsumptionRecord, cycle: &str) -> Result<(), ApiError> {
    let today = OffsetDateTime::now_utc().date();
    let Some(rate) = Rate::current(db, today).await? else {
        debug!(record_id = %record.id, "no active rate; skipping auto-bill");
        return Ok(());
    };

    let total = bill_total(record.consumption_kwh, rate.rate_per_kwh);
    let bill = Bill::insert(
        db,
        &NewBill {
            user_id: record.user_id,
            consumption_record_id: record.id,
            billing_cycle: cycle,
            consumption_kwh: record.consumption_kwh,
            rate_per_kwh: rate.rate_per_kwh,
            total_amount: total,
            due_date: None,
        },
    )
    .await?;

    info!(bill_id = %bill.id, record_id = %record.id, total = %total, "auto-generated bill");
    Ok(())
}

pub async fn update_reading(
    db: &PgPool,
    actor: &Actor,
    id: Uuid,
    req: &UpdateConsumptionRequest,
) -> Result<RecordWithUser, ApiError> {
    let existing = ConsumptionRecord::find_by_id(db, id)
        .await?
        .ok_or(ApiError::NotFound("Consumption record"))?;

    let visible = sharing::members_visible_to(db, actor).await?;
    policy::ensure_can_write_reading(actor, existing.user_id, &visible)?;

    let (previous, current, delta) =
        merged_edit(&existing, req.previous_reading, req.current_reading)?;

    let updated = ConsumptionRecord::update(
        db,
        id,
        req.reading_date,
        previous,
        current,
        delta,
        req.billing_cycle.as_deref(),
        req.notes.as_deref(),
    )
    .await?
    .ok_or(ApiError::NotFound("Consumption record"))?;

    audit::record(
        db,
        actor.id,
        "update_consumption",
        "consumption_records",
        Some(id),
        serde_json::to_value(&existing).ok(),
        serde_json::to_value(&updated).ok(),
    )
    .await;

    ConsumptionRecord::find_with_user(db, id)
        .await?
        .ok_or(ApiError::NotFound("Consumption record"))
}

pub async fn delete_reading(db: &PgPool, actor: &Actor, id: Uuid) -> Result<(), ApiError> {
    let existing = ConsumptionRecord::find_by_id(db, id)
        .await?
        .ok_or(ApiError::NotFound("Consumption record"))?;

    let visible = sharing::members_visible_to(db, actor).await?;
    policy::ensure_can_write_reading(actor, existing.user_id, &visible)?;

    ConsumptionRecord::delete(db, id).await?;

    audit::record(
        db,
        actor.id,
        "delete_consumption",
        "consumption_records",
        Some(id),
        serde_json::to_value(&existing).ok(),
        None,
    )
    .await;

    info!(record_id = %id, "consumption record deleted");
    Ok(())
}

/// All records of the requester's household, whichever role asks.
pub async fn group_records(db: &PgPool, actor: &Actor) -> Result<Vec<RecordWithUser>, ApiError> {
    let main_id = sharing::household_main(db, actor)
        .await?
        .unwrap_or(actor.id);
    Ok(ConsumptionRecord::list_for_group(db, main_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn record(previous: Decimal, current: Decimal) -> ConsumptionRecord {
        ConsumptionRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            reading_date: date!(2025 - 01 - 15),
            previous_reading: previous,
            current_reading: current,
            consumption_kwh: current - previous,
            billing_cycle: None,
            notes: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn first_reading_defaults_previous_to_zero() {
        assert_eq!(resolve_previous(None, None), Decimal::ZERO);
        assert_eq!(reading_delta(dec!(100), Decimal::ZERO), dec!(100));
    }

    #[test]
    fn previous_defaults_to_latest_current_reading() {
        assert_eq!(resolve_previous(None, Some(dec!(100))), dec!(100));
    }

    #[test]
    fn explicit_previous_wins_over_history() {
        assert_eq!(resolve_previous(Some(dec!(40)), Some(dec!(100))), dec!(40));
    }

    #[test]
    fn negative_delta_is_representable_at_creation() {
        // Meter reset: latest was 100, new meter starts at 80.
        assert_eq!(reading_delta(dec!(80), dec!(100)), dec!(-20));
    }

    #[test]
    fn edit_producing_negative_delta_is_rejected() {
        let existing = record(dec!(0), dec!(100));
        let err = merged_edit(&existing, Some(dec!(160)), Some(dec!(80))).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn edit_changing_only_current_recomputes_delta() {
        let existing = record(dec!(50), dec!(100));
        let (prev, curr, delta) = merged_edit(&existing, None, Some(dec!(120))).unwrap();
        assert_eq!(prev, dec!(50));
        assert_eq!(curr, dec!(120));
        assert_eq!(delta, dec!(70));
    }

    #[test]
    fn edit_without_reading_changes_keeps_existing_delta() {
        let existing = record(dec!(100), dec!(80));
        // Existing delta is negative but untouched readings stay valid.
        let (_, _, delta) = merged_edit(&existing, None, None).unwrap();
        assert_eq!(delta, dec!(-20));
    }
}
