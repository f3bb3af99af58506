//! Line-item aggregation: validation and totalling of a raw order request.

use super::{DraftOrder, Money, OrderError, OrderHeader, OrderKind, OrderLine, OrderRequest};

/// Validates a raw request and produces a totalled draft order.
///
/// Lines keep their input order. Lines with a zero quantity are dropped
/// without error. Every line total and the header total are computed in
/// integer cents, so the header total is exactly the sum of the line totals.
///
/// Fails with [`OrderError::NoItems`] when no line survives, and with
/// [`OrderError::NegativePrice`] for any line priced below zero, including
/// zero-quantity lines.
pub fn aggregate(kind: OrderKind, request: OrderRequest) -> Result<DraftOrder, OrderError> {
    let payment_method = request.payment_method.trim();
    if payment_method.is_empty() {
        return Err(OrderError::MissingField("payment_method"));
    }

    let mut lines = Vec::with_capacity(request.lines.len());
    let mut total = Money::zero();

    for (index, raw) in request.lines.into_iter().enumerate() {
        let line = index + 1;

        if raw.unit_price.is_negative() {
            return Err(OrderError::NegativePrice {
                line,
                price: raw.unit_price.cents(),
            });
        }
        if raw.quantity == 0 {
            continue;
        }

        let total_price = raw
            .unit_price
            .checked_multiply(raw.quantity)
            .ok_or(OrderError::AmountOverflow { line })?;
        total = total
            .checked_add(total_price)
            .ok_or(OrderError::AmountOverflow { line })?;

        lines.push(OrderLine {
            product_id: raw.product_id,
            quantity: raw.quantity,
            unit_price: raw.unit_price,
            total_price,
        });
    }

    if lines.is_empty() {
        return Err(OrderError::NoItems);
    }

    let idempotency_key = request
        .idempotency_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    Ok(DraftOrder {
        header: OrderHeader {
            kind,
            counterparty_id: request.counterparty_id,
            actor_id: request.actor_id,
            payment_method: payment_method.to_string(),
            description: request.description,
            total,
        },
        lines,
        idempotency_key,
    })
}
