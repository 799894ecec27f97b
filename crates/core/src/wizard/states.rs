use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::field::{FieldId, FieldValue, StepPayload};

/// 1-based position of a step inside its wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub u8);

impl StepId {
    pub const FIRST: StepId = StepId(1);

    pub fn next(self) -> StepId {
        StepId(self.0.saturating_add(1))
    }

    pub fn previous(self) -> StepId {
        StepId(self.0.saturating_sub(1).max(1))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardKind {
    VendorOnboarding,
    Requisition,
    DealConfiguration,
}

impl WizardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VendorOnboarding => "vendor_onboarding",
            Self::Requisition => "requisition",
            Self::DealConfiguration => "deal_configuration",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vendor_onboarding" => Some(Self::VendorOnboarding),
            "requisition" => Some(Self::Requisition),
            "deal_configuration" => Some(Self::DealConfiguration),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: StepId,
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// Accumulated payload of a wizard, one slice per step.
pub type WizardPayload = BTreeMap<StepId, StepPayload>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(BTreeMap<FieldId, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(FieldId::from(field), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn remove(&mut self, field: &FieldId) {
        self.0.remove(field);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &str)> {
        self.0.iter().map(|(field, message)| (field, message.as_str()))
    }
}

/// Live in-memory state of one wizard instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardSession {
    pub current_step: StepId,
    pub furthest_reached_step: StepId,
    pub payload: WizardPayload,
    pub validation_errors: ValidationErrors,
}

impl Default for WizardSession {
    fn default() -> Self {
        Self {
            current_step: StepId::FIRST,
            furthest_reached_step: StepId::FIRST,
            payload: WizardPayload::new(),
            validation_errors: ValidationErrors::new(),
        }
    }
}

impl WizardSession {
    pub fn step_payload(&self, step: StepId) -> Option<&StepPayload> {
        self.payload.get(&step)
    }

    pub fn field(&self, step: StepId, field: &str) -> Option<&FieldValue> {
        self.payload.get(&step).and_then(|slice| slice.get(field))
    }

    pub fn has_non_empty_field(&self) -> bool {
        payload_has_non_empty_field(&self.payload)
    }
}

pub fn payload_has_non_empty_field(payload: &WizardPayload) -> bool {
    payload.values().flat_map(|slice| slice.values()).any(|value| !value.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved { from: StepId, to: StepId },
    Unchanged,
    Blocked { error_count: usize },
}

impl NavigationOutcome {
    pub fn moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{StepId, WizardKind, WizardPayload};
    use crate::domain::field::{FieldId, FieldValue, StepPayload};

    #[test]
    fn step_arithmetic_stays_one_based() {
        assert_eq!(StepId(1).previous(), StepId(1));
        assert_eq!(StepId(3).previous(), StepId(2));
        assert_eq!(StepId(3).next(), StepId(4));
    }

    #[test]
    fn wizard_kind_round_trips_through_str() {
        for kind in
            [WizardKind::VendorOnboarding, WizardKind::Requisition, WizardKind::DealConfiguration]
        {
            assert_eq!(WizardKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(WizardKind::parse("unknown"), None);
    }

    #[test]
    fn payload_serializes_step_keys_as_json_object_keys() {
        let mut slice = StepPayload::new();
        slice.insert(FieldId::from("target_price"), FieldValue::number(50));
        let mut payload = WizardPayload::new();
        payload.insert(StepId(2), slice);

        let json = serde_json::to_string(&payload).expect("serialize payload");
        let decoded: WizardPayload = serde_json::from_str(&json).expect("deserialize payload");

        assert!(json.starts_with("{\"2\":"));
        assert_eq!(decoded, payload);
    }
}
