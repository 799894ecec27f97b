pub mod engine;
pub mod flows;
pub mod states;

pub use engine::{WizardFlow, WizardStateMachine};
pub use flows::{DealConfigurationFlow, RequisitionFlow, VendorOnboardingFlow};
pub use states::{
    NavigationOutcome, StepDefinition, StepId, ValidationErrors, WizardKind, WizardPayload,
    WizardSession,
};
