//! Step tables and validation rules for the vendor onboarding, requisition
//! and deal configuration wizards.

use rust_decimal::Decimal;

use crate::defaults::EmptinessPolicy;
use crate::domain::field::{
    choices_field, date_field, flag_field, number_field, text_field, FieldId, FieldValue,
    StepPayload,
};
use crate::domain::negotiation::SmartDefaults;
use crate::wizard::engine::WizardFlow;
use crate::wizard::states::{StepDefinition, StepId, ValidationErrors, WizardKind, WizardPayload};

static EMPTY_SLICE: StepPayload = StepPayload::new();

fn slice_of(payload: &WizardPayload, step: StepId) -> &StepPayload {
    payload.get(&step).unwrap_or(&EMPTY_SLICE)
}

fn require_text(slice: &StepPayload, field: &str, label: &str, errors: &mut ValidationErrors) {
    if text_field(slice, field).is_none() {
        errors.insert(field, format!("{label} is required."));
    }
}

fn require_positive(slice: &StepPayload, field: &str, label: &str, errors: &mut ValidationErrors) {
    match number_field(slice, field) {
        None => errors.insert(field, format!("{label} is required.")),
        Some(value) if value <= Decimal::ZERO => {
            errors.insert(field, format!("{label} must be greater than zero."))
        }
        Some(_) => {}
    }
}

fn reject_negative(slice: &StepPayload, field: &str, label: &str, errors: &mut ValidationErrors) {
    if number_field(slice, field).is_some_and(|value| value < Decimal::ZERO) {
        errors.insert(field, format!("{label} cannot be negative."));
    }
}

pub mod vendor {
    pub const LEGAL_NAME: &str = "legal_name";
    pub const TAX_ID: &str = "tax_id";
    pub const COUNTRY: &str = "country";
    pub const CONTACT_NAME: &str = "contact_name";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const CURRENCY: &str = "currency";
    pub const PAYMENT_TERMS_DAYS: &str = "payment_terms_days";
}

const VENDOR_STEPS: &[StepDefinition] = &[
    StepDefinition {
        id: StepId(1),
        key: "company",
        title: "Company",
        description: "Legal entity and registration details",
    },
    StepDefinition {
        id: StepId(2),
        key: "contact",
        title: "Contact",
        description: "Primary commercial contact",
    },
    StepDefinition {
        id: StepId(3),
        key: "payment",
        title: "Payment",
        description: "Billing currency and standard payment terms",
    },
    StepDefinition {
        id: StepId(4),
        key: "review",
        title: "Review",
        description: "Confirm the vendor record",
    },
];

#[derive(Clone, Debug, Default)]
pub struct VendorOnboardingFlow;

impl WizardFlow for VendorOnboardingFlow {
    fn kind(&self) -> WizardKind {
        WizardKind::VendorOnboarding
    }

    fn steps(&self) -> &[StepDefinition] {
        VENDOR_STEPS
    }

    fn validate(&self, step: StepId, payload: &WizardPayload) -> ValidationErrors {
        let slice = slice_of(payload, step);
        let mut errors = ValidationErrors::new();
        match step.0 {
            1 => {
                require_text(slice, vendor::LEGAL_NAME, "Legal name", &mut errors);
                require_text(slice, vendor::TAX_ID, "Tax id", &mut errors);
                require_text(slice, vendor::COUNTRY, "Country", &mut errors);
            }
            2 => {
                require_text(slice, vendor::CONTACT_NAME, "Contact name", &mut errors);
                match text_field(slice, vendor::CONTACT_EMAIL) {
                    None => errors.insert(vendor::CONTACT_EMAIL, "Contact email is required."),
                    Some(email) if !looks_like_email(email) => {
                        errors.insert(vendor::CONTACT_EMAIL, "Enter a valid email address.")
                    }
                    Some(_) => {}
                }
            }
            3 => {
                match text_field(slice, vendor::CURRENCY) {
                    None => errors.insert(vendor::CURRENCY, "Currency is required."),
                    Some(code) if !is_currency_code(code) => {
                        errors.insert(vendor::CURRENCY, "Use a three-letter currency code.")
                    }
                    Some(_) => {}
                }
                reject_negative(slice, vendor::PAYMENT_TERMS_DAYS, "Payment terms", &mut errors);
            }
            _ => {}
        }
        errors
    }

    fn emptiness_policy(&self) -> EmptinessPolicy {
        EmptinessPolicy::new().zero_is_value(vendor::PAYMENT_TERMS_DAYS)
    }
}

fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic())
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub mod requisition {
    pub const TITLE: &str = "title";
    pub const DEPARTMENT: &str = "department";
    pub const NEEDED_BY: &str = "needed_by";
    pub const ITEM_DESCRIPTION: &str = "item_description";
    pub const QUANTITY: &str = "quantity";
    pub const ESTIMATED_UNIT_PRICE: &str = "estimated_unit_price";
}

const REQUISITION_STEPS: &[StepDefinition] = &[
    StepDefinition {
        id: StepId(1),
        key: "details",
        title: "Details",
        description: "What is being requested and by whom",
    },
    StepDefinition {
        id: StepId(2),
        key: "items",
        title: "Items",
        description: "Requested goods and estimated cost",
    },
    StepDefinition {
        id: StepId(3),
        key: "review",
        title: "Review",
        description: "Confirm and submit the requisition",
    },
];

#[derive(Clone, Debug, Default)]
pub struct RequisitionFlow;

impl WizardFlow for RequisitionFlow {
    fn kind(&self) -> WizardKind {
        WizardKind::Requisition
    }

    fn steps(&self) -> &[StepDefinition] {
        REQUISITION_STEPS
    }

    fn validate(&self, step: StepId, payload: &WizardPayload) -> ValidationErrors {
        let slice = slice_of(payload, step);
        let mut errors = ValidationErrors::new();
        match step.0 {
            1 => {
                require_text(slice, requisition::TITLE, "Title", &mut errors);
                require_text(slice, requisition::DEPARTMENT, "Department", &mut errors);
            }
            2 => {
                require_text(slice, requisition::ITEM_DESCRIPTION, "Item description", &mut errors);
                require_positive(slice, requisition::QUANTITY, "Quantity", &mut errors);
                reject_negative(
                    slice,
                    requisition::ESTIMATED_UNIT_PRICE,
                    "Estimated unit price",
                    &mut errors,
                );
            }
            _ => {}
        }
        errors
    }
}

pub mod deal {
    pub const COUNTERPARTY_IDS: &str = "counterparty_ids";
    pub const TARGET_PRICE: &str = "target_price";
    pub const QUANTITY: &str = "quantity";
    pub const BENCHMARK_DATE: &str = "benchmark_date";
    pub const PAYMENT_TERM_MIN_DAYS: &str = "payment_term_min_days";
    pub const PAYMENT_TERM_MAX_DAYS: &str = "payment_term_max_days";
    pub const LATE_PENALTY_RATE: &str = "late_penalty_rate";
    pub const EARLY_PAYMENT_DISCOUNT: &str = "early_payment_discount";
    pub const DISCOUNT_RATE: &str = "discount_rate";
    pub const DISCOUNT_DAYS: &str = "discount_days";
    pub const DELIVERY_DATE: &str = "delivery_date";
    pub const NEGOTIATION_DEADLINE: &str = "negotiation_deadline";

    use crate::wizard::states::StepId;

    pub const COUNTERPARTIES_STEP: StepId = StepId(1);
    pub const PRICING_STEP: StepId = StepId(2);
    pub const TERMS_STEP: StepId = StepId(3);
    pub const SCHEDULE_STEP: StepId = StepId(4);
    pub const REVIEW_STEP: StepId = StepId(5);
}

const DEAL_STEPS: &[StepDefinition] = &[
    StepDefinition {
        id: deal::COUNTERPARTIES_STEP,
        key: "counterparties",
        title: "Counterparties",
        description: "Vendors to negotiate with",
    },
    StepDefinition {
        id: deal::PRICING_STEP,
        key: "pricing",
        title: "Price & quantity",
        description: "Target price, volume and benchmark",
    },
    StepDefinition {
        id: deal::TERMS_STEP,
        key: "terms",
        title: "Payment terms",
        description: "Payment window, penalties and early-payment discount",
    },
    StepDefinition {
        id: deal::SCHEDULE_STEP,
        key: "schedule",
        title: "Schedule",
        description: "Delivery date and negotiation deadline",
    },
    StepDefinition {
        id: deal::REVIEW_STEP,
        key: "review",
        title: "Review",
        description: "Confirm and launch negotiations",
    },
];

#[derive(Clone, Debug, Default)]
pub struct DealConfigurationFlow;

impl DealConfigurationFlow {
    fn validate_terms(slice: &StepPayload, errors: &mut ValidationErrors) {
        reject_negative(slice, deal::PAYMENT_TERM_MIN_DAYS, "Minimum payment term", errors);
        reject_negative(slice, deal::PAYMENT_TERM_MAX_DAYS, "Maximum payment term", errors);
        reject_negative(slice, deal::LATE_PENALTY_RATE, "Late penalty rate", errors);

        let min = number_field(slice, deal::PAYMENT_TERM_MIN_DAYS);
        let max = number_field(slice, deal::PAYMENT_TERM_MAX_DAYS);
        if let (Some(min), Some(max)) = (min, max) {
            if min > max && !errors.contains(deal::PAYMENT_TERM_MAX_DAYS) {
                errors.insert(
                    deal::PAYMENT_TERM_MAX_DAYS,
                    "Maximum payment term must not be shorter than the minimum.",
                );
            }
        }

        if flag_field(slice, deal::EARLY_PAYMENT_DISCOUNT) {
            require_positive(slice, deal::DISCOUNT_RATE, "Discount rate", errors);
            require_positive(slice, deal::DISCOUNT_DAYS, "Discount window", errors);
        }
    }

    fn validate_schedule(payload: &WizardPayload, errors: &mut ValidationErrors) {
        let schedule = slice_of(payload, deal::SCHEDULE_STEP);
        let Some(delivery) = date_field(schedule, deal::DELIVERY_DATE) else {
            errors.insert(deal::DELIVERY_DATE, "Delivery date is required.");
            return;
        };

        let deadline = date_field(schedule, deal::NEGOTIATION_DEADLINE);
        if deadline.is_some_and(|deadline| deadline > delivery) {
            errors.insert(
                deal::NEGOTIATION_DEADLINE,
                "Negotiation deadline must not be after the delivery date.",
            );
        }

        let benchmark = date_field(slice_of(payload, deal::PRICING_STEP), deal::BENCHMARK_DATE);
        if benchmark.is_some_and(|benchmark| benchmark >= delivery) {
            errors.insert(deal::DELIVERY_DATE, "Delivery date must be after the benchmark date.");
        }
    }
}

impl WizardFlow for DealConfigurationFlow {
    fn kind(&self) -> WizardKind {
        WizardKind::DealConfiguration
    }

    fn steps(&self) -> &[StepDefinition] {
        DEAL_STEPS
    }

    fn validate(&self, step: StepId, payload: &WizardPayload) -> ValidationErrors {
        let slice = slice_of(payload, step);
        let mut errors = ValidationErrors::new();
        match step {
            deal::COUNTERPARTIES_STEP => {
                if choices_field(slice, deal::COUNTERPARTY_IDS).is_empty() {
                    errors.insert(deal::COUNTERPARTY_IDS, "Select at least one counterparty.");
                }
            }
            deal::PRICING_STEP => {
                require_positive(slice, deal::TARGET_PRICE, "Target price", &mut errors);
                require_positive(slice, deal::QUANTITY, "Quantity", &mut errors);
            }
            deal::TERMS_STEP => Self::validate_terms(slice, &mut errors),
            deal::SCHEDULE_STEP => Self::validate_schedule(payload, &mut errors),
            _ => {}
        }
        errors
    }

    fn project_defaults(&self, defaults: &SmartDefaults) -> WizardPayload {
        let mut payload = WizardPayload::new();
        let mut put = |step: StepId, field: &str, value: Option<FieldValue>| {
            if let Some(value) = value {
                payload.entry(step).or_default().insert(FieldId::from(field), value);
            }
        };

        if let Some(section) = &defaults.price_quantity {
            let pricing = deal::PRICING_STEP;
            put(pricing, deal::TARGET_PRICE, section.target_price.map(FieldValue::Number));
            put(pricing, deal::QUANTITY, section.quantity.map(FieldValue::Number));
        }
        if let Some(section) = &defaults.payment_terms {
            let terms = deal::TERMS_STEP;
            put(terms, deal::PAYMENT_TERM_MIN_DAYS, section.min_days.map(FieldValue::Number));
            put(terms, deal::PAYMENT_TERM_MAX_DAYS, section.max_days.map(FieldValue::Number));
        }
        if let Some(section) = &defaults.delivery {
            let schedule = deal::SCHEDULE_STEP;
            put(schedule, deal::DELIVERY_DATE, section.delivery_date.map(FieldValue::Date));
        }
        if let Some(section) = &defaults.negotiation {
            let schedule = deal::SCHEDULE_STEP;
            put(schedule, deal::NEGOTIATION_DEADLINE, section.deadline.map(FieldValue::Date));
        }

        payload
    }

    fn emptiness_policy(&self) -> EmptinessPolicy {
        EmptinessPolicy::new()
            .zero_is_value(deal::PAYMENT_TERM_MIN_DAYS)
            .zero_is_value(deal::LATE_PENALTY_RATE)
    }
}
