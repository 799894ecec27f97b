//! Fan-out of one finalized deal payload to many counterparties.

pub mod orchestrator;
pub mod sanitize;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::counterparty::{CounterpartyId, NegotiationId};

pub use orchestrator::BatchSubmissionOrchestrator;
pub use sanitize::{sanitize_request, MAX_LATE_PENALTY_RATE};

/// Used when a failed request carries no server message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to start negotiation";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Fulfilled { negotiation_id: NegotiationId },
    Rejected { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub counterparty_id: CounterpartyId,
    pub display_name: String,
    pub outcome: BatchOutcome,
}

impl BatchResult {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Fulfilled { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Rejected { .. })
    }
}

/// Results of one batch run, one entry per submitted counterparty in
/// submission order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub results: Vec<BatchResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|result| result.is_fulfilled()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|result| result.is_rejected()).count()
    }

    pub fn failed_ids(&self) -> Vec<CounterpartyId> {
        self.results
            .iter()
            .filter(|result| result.is_rejected())
            .map(|result| result.counterparty_id.clone())
            .collect()
    }

    pub fn summary(&self) -> BatchSummary {
        match (self.succeeded(), self.failed()) {
            (0, 0) => BatchSummary::Empty,
            (succeeded, 0) => BatchSummary::AllSucceeded { count: succeeded },
            (0, failed) => BatchSummary::AllFailed { count: failed },
            (succeeded, failed) => BatchSummary::Partial { succeeded, failed },
        }
    }

    /// The draft is no longer needed once any negotiation exists.
    pub fn should_clear_draft(&self) -> bool {
        self.results.iter().any(BatchResult::is_fulfilled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchSummary {
    AllSucceeded { count: usize },
    Partial { succeeded: usize, failed: usize },
    AllFailed { count: usize },
    Empty,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        matches!(self, Self::Partial { .. } | Self::AllFailed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::AllSucceeded { count: 1 } => "Negotiation started.".to_owned(),
            Self::AllSucceeded { count } => format!("All {count} negotiations started."),
            Self::Partial { succeeded, failed } => {
                format!("{succeeded} negotiations started, {failed} failed.")
            }
            Self::AllFailed { count: 1 } => "The negotiation could not be started.".to_owned(),
            Self::AllFailed { count } => {
                format!("None of the {count} negotiations could be started.")
            }
            Self::Empty => "No counterparties were selected.".to_owned(),
        }
    }
}
