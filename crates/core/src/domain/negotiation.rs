use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::counterparty::{CounterpartyId, EntityId, NegotiationId};

/// Server-suggested values for one (entity, counterparty) pair.
///
/// Every section is optional and every leaf inside a section is optional; a
/// missing suggestion never introduces a value into the form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartDefaults {
    #[serde(default)]
    pub price_quantity: Option<PriceQuantityDefaults>,
    #[serde(default)]
    pub payment_terms: Option<PaymentTermDefaults>,
    #[serde(default)]
    pub delivery: Option<DeliveryDefaults>,
    #[serde(default)]
    pub negotiation: Option<NegotiationDefaults>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuantityDefaults {
    pub target_price: Option<Decimal>,
    pub quantity: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTermDefaults {
    pub min_days: Option<Decimal>,
    pub max_days: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDefaults {
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationDefaults {
    pub deadline: Option<NaiveDate>,
}

/// Sanitized body sent to the negotiation service for one counterparty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    pub entity_id: EntityId,
    pub counterparty_id: CounterpartyId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_negotiation_id: Option<NegotiationId>,
    pub terms: NegotiationTerms,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationTerms {
    pub target_price: Decimal,
    pub quantity: Decimal,
    pub payment_term_min_days: Decimal,
    pub payment_term_max_days: Decimal,
    pub late_penalty_rate: Decimal,
    pub benchmark_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub negotiation_deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_payment_discount: Option<EarlyPaymentDiscount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyPaymentDiscount {
    pub rate: Decimal,
    pub within_days: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRef {
    pub id: NegotiationId,
}
