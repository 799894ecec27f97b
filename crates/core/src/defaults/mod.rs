//! Smart-default reconciliation.
//!
//! Suggested values are merged into the live payload one leaf field at a time
//! through [`merge_field`]. A field the user already filled in always wins; a
//! missing or null suggestion never introduces a value. Because the merge only
//! looks at the current emptiness of each field it is idempotent, and it can be
//! replayed against whatever payload is live when a fetch resolves.
//!
//! Switching to another counterparty first withdraws the previous pair's
//! suggestions with [`withdraw_suggestions`]: a field that still holds the value
//! the old suggestion put there goes back to empty, a field the user edited
//! stays.

pub mod reconciler;

use std::collections::BTreeSet;

use crate::domain::field::{FieldId, FieldValue, StepPayload};
use crate::wizard::states::{StepId, WizardPayload};

pub use reconciler::{ReconcileOutcome, SmartDefaultsReconciler};

/// Decides which field values count as "not filled in yet".
///
/// Numeric zero is empty by default. Fields where zero is a deliberate entry
/// (a zero-day payment term, a zero penalty rate) are registered with
/// [`EmptinessPolicy::zero_is_value`] so suggestions never overwrite them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmptinessPolicy {
    zero_is_value: BTreeSet<FieldId>,
}

impl EmptinessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zero_is_value(mut self, field: &str) -> Self {
        self.zero_is_value.insert(FieldId::from(field));
        self
    }

    pub fn is_empty(&self, field: &FieldId, value: Option<&FieldValue>) -> bool {
        match value {
            None => true,
            Some(FieldValue::Number(number)) if number.is_zero() => {
                !self.zero_is_value.contains(field)
            }
            Some(value) => value.is_empty(),
        }
    }
}

pub fn merge_field(
    policy: &EmptinessPolicy,
    field: &FieldId,
    current: Option<&FieldValue>,
    suggested: Option<&FieldValue>,
) -> Option<FieldValue> {
    if !policy.is_empty(field, current) {
        return current.cloned();
    }

    match suggested {
        Some(value) if !value.is_null() => Some(value.clone()),
        _ => current.cloned(),
    }
}

/// Merges one step's suggestions, returning the merged slice and the fields
/// whose value changed.
pub fn merge_section(
    policy: &EmptinessPolicy,
    current: &StepPayload,
    suggested: &StepPayload,
) -> (StepPayload, Vec<FieldId>) {
    let mut merged = current.clone();
    let mut filled = Vec::new();

    for (field, suggestion) in suggested {
        let existing = current.get(field);
        let Some(value) = merge_field(policy, field, existing, Some(suggestion)) else {
            continue;
        };
        if existing != Some(&value) {
            filled.push(field.clone());
        }
        merged.insert(field.clone(), value);
    }

    (merged, filled)
}

/// A suggestion that landed in the payload, with the value it wrote.
pub type AppliedSuggestion = (StepId, FieldId, FieldValue);

/// Removes every applied suggestion whose field still holds the suggested
/// value. Returns the withdrawn fields.
pub fn withdraw_suggestions(
    payload: &mut WizardPayload,
    applied: &[AppliedSuggestion],
) -> Vec<(StepId, FieldId)> {
    let mut withdrawn = Vec::new();
    for (step, field, value) in applied {
        let Some(slice) = payload.get_mut(step) else {
            continue;
        };
        if slice.get(field) != Some(value) {
            continue;
        }
        slice.remove(field);
        if slice.is_empty() {
            payload.remove(step);
        }
        withdrawn.push((*step, field.clone()));
    }
    withdrawn
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    pub payload: WizardPayload,
    pub filled: Vec<(StepId, FieldId)>,
}

pub fn merge_payload(
    policy: &EmptinessPolicy,
    current: &WizardPayload,
    suggested: &WizardPayload,
) -> MergeOutcome {
    let mut payload = current.clone();
    let mut filled = Vec::new();
    let empty = StepPayload::new();

    for (step, section) in suggested {
        let existing = current.get(step).unwrap_or(&empty);
        let (merged, changed) = merge_section(policy, existing, section);
        filled.extend(changed.into_iter().map(|field| (*step, field)));
        if !merged.is_empty() {
            payload.insert(*step, merged);
        }
    }

    MergeOutcome { payload, filled }
}
