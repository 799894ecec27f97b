use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub String);

impl FieldId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Borrow<str> for FieldId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single form value as captured by a wizard step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Flag(bool),
    Choices(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn number(value: impl Into<Decimal>) -> Self {
        Self::Number(value.into())
    }

    /// Null, numeric zero and the empty string count as "not filled in".
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            Self::Number(number) => number.is_zero(),
            Self::Date(_) | Self::Flag(_) | Self::Choices(_) => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_choices(&self) -> Option<&[String]> {
        match self {
            Self::Choices(choices) => Some(choices.as_slice()),
            _ => None,
        }
    }
}

/// Field values owned by one wizard step.
pub type StepPayload = BTreeMap<FieldId, FieldValue>;

pub fn text_field<'a>(payload: &'a StepPayload, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(FieldValue::as_text).map(str::trim).filter(|text| !text.is_empty())
}

pub fn number_field(payload: &StepPayload, field: &str) -> Option<Decimal> {
    payload.get(field).and_then(FieldValue::as_number)
}

pub fn date_field(payload: &StepPayload, field: &str) -> Option<NaiveDate> {
    payload.get(field).and_then(FieldValue::as_date)
}

pub fn flag_field(payload: &StepPayload, field: &str) -> bool {
    payload.get(field).and_then(FieldValue::as_flag).unwrap_or(false)
}

pub fn choices_field<'a>(payload: &'a StepPayload, field: &str) -> &'a [String] {
    payload.get(field).and_then(FieldValue::as_choices).unwrap_or(&[])
}
