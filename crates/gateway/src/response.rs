use serde::Deserialize;
use serde_json::Value;

use dealdesk_core::domain::counterparty::CounterpartySummary;

const MESSAGE_KEYS: &[&str] = &["message", "error", "detail"];

/// Pulls a human-readable message out of an error response body. Accepts
/// `{"message": ..}`, `{"error": ..}`, `{"detail": ..}` and one level of
/// nesting such as `{"error": {"message": ..}}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_from_value(&value, 0)
}

fn message_from_value(value: &Value, depth: usize) -> Option<String> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_owned())
        }
        Value::Object(map) if depth < 2 => MESSAGE_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|nested| message_from_value(nested, depth + 1)),
        _ => None,
    }
}

/// The directory endpoint answers either with a bare array or wrapped in
/// `{"counterparties": [..]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CounterpartyListBody {
    Wrapped { counterparties: Vec<CounterpartySummary> },
    Bare(Vec<CounterpartySummary>),
}

impl CounterpartyListBody {
    pub(crate) fn into_list(self) -> Vec<CounterpartySummary> {
        match self {
            Self::Wrapped { counterparties } | Self::Bare(counterparties) => counterparties,
        }
    }
}
