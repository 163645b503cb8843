use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use crate::audit;
use crate::bills::repo::Bill;
use crate::bills::services::derive_status;
use crate::error::ApiError;
use crate::payments::dto::CreatePaymentRequest;
use crate::payments::repo::{NewPayment, Payment};
use crate::policy::{self, Actor};

/// Pure overpayment guard: accumulated payments may reach the bill total
/// exactly but never exceed it.
pub fn check_overpayment(
    already_paid: Decimal,
    amount: Decimal,
    total_amount: Decimal,
) -> Result<(), ApiError> {
    if already_paid + amount > total_amount {
        return Err(ApiError::Overpayment);
    }
    Ok(())
}

/// Records a payment against a bill. The sum-check-insert-refresh sequence
/// runs under a row lock on the bill so two concurrent payments cannot both
/// pass the overpayment check.
pub async fn record_payment(
    db: &PgPool,
    actor: &Actor,
    req: &CreatePaymentRequest,
) -> Result<Payment, ApiError> {
    if req.amount <= Decimal::ZERO {
        return Err(ApiError::validation("Amount must be greater than 0"));
    }

    let mut tx = db.begin().await.map_err(ApiError::from)?;

    let bill = Bill::find_locked(&mut tx, req.bill_id)
        .await?
        .ok_or(ApiError::NotFound("Bill"))?;

    policy::ensure_can_pay(actor, bill.user_id)?;

    let already_paid = Bill::total_paid(&mut *tx, bill.id).await?;
    check_overpayment(already_paid, req.amount, bill.total_amount)?;

    let payment = Payment::insert(
        &mut *tx,
        &NewPayment {
            bill_id: bill.id,
            amount: req.amount,
            payment_date: req.payment_date,
            payment_method: req.payment_method.as_deref(),
            reference_number: req.reference_number.as_deref(),
            notes: req.notes.as_deref(),
        },
    )
    .await?;

    // Refresh the cached status; reads re-derive it anyway.
    let status = derive_status(bill.total_amount, already_paid + req.amount);
    Bill::update_status(&mut *tx, bill.id, status).await?;

    tx.commit().await.map_err(ApiError::from)?;

    audit::record(
        db,
        actor.id,
        "create_payment",
        "payments",
        Some(payment.id),
        None,
        serde_json::to_value(&payment).ok(),
    )
    .await;

    info!(payment_id = %payment.id, bill_id = %bill.id, amount = %payment.amount, "payment recorded");
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_payments_below_the_total_are_accepted() {
        assert!(check_overpayment(Decimal::ZERO, dec!(100), dec!(625)).is_ok());
        assert!(check_overpayment(dec!(100), dec!(200), dec!(625)).is_ok());
    }

    #[test]
    fn exact_payoff_is_accepted() {
        assert!(check_overpayment(dec!(500), dec!(125), dec!(625)).is_ok());
    }

    #[test]
    fn one_cent_overshoot_is_rejected() {
        let err = check_overpayment(dec!(500), dec!(125.01), dec!(625)).unwrap_err();
        assert!(matches!(err, ApiError::Overpayment));
    }

    #[test]
    fn paid_bills_accept_no_further_payment() {
        let err = check_overpayment(dec!(625), dec!(0.01), dec!(625)).unwrap_err();
        assert!(matches!(err, ApiError::Overpayment));
    }
}
