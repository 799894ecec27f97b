use thiserror::Error;

use crate::wizard::states::StepId;

/// Failure reported by one of the remote collaborators (smart defaults,
/// counterparty directory, negotiation creation, progressive step save).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service rejected the request with status {status}")]
    Rejected { status: u16, message: Option<String> },
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("could not decode service response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Message supplied by the remote side, if it sent a usable one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message: Some(message), .. } => {
                Some(message.trim()).filter(|message| !message.is_empty())
            }
            _ => None,
        }
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_owned()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DraftStoreError {
    #[error("draft storage failure: {0}")]
    Storage(String),
    #[error("draft could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("step {step} could not be saved: {source}")]
    ProgressiveSave {
        step: StepId,
        #[source]
        source: ServiceError,
    },
    #[error("step {0} does not exist in this wizard")]
    UnknownStep(StepId),
}

impl WizardError {
    pub fn user_message(&self) -> String {
        match self {
            Self::ProgressiveSave { source, .. } => source
                .message_or("This step could not be saved. Check your connection and try again."),
            Self::UnknownStep(_) => "That step is not part of this form.".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ServiceError, WizardError};
    use crate::wizard::states::StepId;

    #[test]
    fn server_message_is_preferred_over_fallback() {
        let error = ServiceError::Rejected {
            status: 422,
            message: Some("Vendor is blocked for new negotiations".to_owned()),
        };

        assert_eq!(error.message_or("generic"), "Vendor is blocked for new negotiations");
    }

    #[test]
    fn blank_or_missing_server_message_uses_fallback() {
        let blank = ServiceError::Rejected { status: 500, message: Some("   ".to_owned()) };
        let transport = ServiceError::Unavailable("connection reset".to_owned());

        assert_eq!(blank.message_or("generic"), "generic");
        assert_eq!(transport.message_or("generic"), "generic");
    }

    #[test]
    fn progressive_save_failure_has_user_safe_message() {
        let error = WizardError::ProgressiveSave {
            step: StepId(2),
            source: ServiceError::Unavailable("timeout".to_owned()),
        };

        assert_eq!(
            error.user_message(),
            "This step could not be saved. Check your connection and try again."
        );
        assert!(error.to_string().contains("step 2"));
    }
}
