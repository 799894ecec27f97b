use rust_decimal::Decimal;

use crate::domain::counterparty::{CounterpartyId, EntityId, NegotiationId};
use crate::domain::field::{date_field, flag_field, number_field, StepPayload};
use crate::domain::negotiation::{EarlyPaymentDiscount, NegotiationRequest, NegotiationTerms};
use crate::wizard::flows::deal;

/// Upper bound of the late-penalty rate sent to the negotiation service, in
/// percent. The lower bound is zero.
pub const MAX_LATE_PENALTY_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

fn number_or_zero(payload: &StepPayload, field: &str) -> Decimal {
    number_field(payload, field).unwrap_or(Decimal::ZERO)
}

/// Builds the request body for one counterparty from the merged wizard
/// payload. Missing numbers become zero, missing dates stay absent, and the
/// early-payment discount is only sent when its flag is set.
pub fn sanitize_request(
    entity_id: &EntityId,
    counterparty_id: &CounterpartyId,
    link_negotiation_id: Option<NegotiationId>,
    payload: &StepPayload,
) -> NegotiationRequest {
    let penalty = number_or_zero(payload, deal::LATE_PENALTY_RATE)
        .clamp(Decimal::ZERO, MAX_LATE_PENALTY_RATE);

    let early_payment_discount =
        flag_field(payload, deal::EARLY_PAYMENT_DISCOUNT).then(|| EarlyPaymentDiscount {
            rate: number_or_zero(payload, deal::DISCOUNT_RATE),
            within_days: number_or_zero(payload, deal::DISCOUNT_DAYS),
        });

    NegotiationRequest {
        entity_id: entity_id.clone(),
        counterparty_id: counterparty_id.clone(),
        link_negotiation_id,
        terms: NegotiationTerms {
            target_price: number_or_zero(payload, deal::TARGET_PRICE),
            quantity: number_or_zero(payload, deal::QUANTITY),
            payment_term_min_days: number_or_zero(payload, deal::PAYMENT_TERM_MIN_DAYS),
            payment_term_max_days: number_or_zero(payload, deal::PAYMENT_TERM_MAX_DAYS),
            late_penalty_rate: penalty,
            benchmark_date: date_field(payload, deal::BENCHMARK_DATE),
            delivery_date: date_field(payload, deal::DELIVERY_DATE),
            negotiation_deadline: date_field(payload, deal::NEGOTIATION_DEADLINE),
            early_payment_discount,
        },
    }
}
