pub mod audit;
pub mod batch;
pub mod config;
pub mod defaults;
pub mod domain;
pub mod drafts;
pub mod errors;
pub mod services;
pub mod wizard;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink};
pub use batch::{
    BatchOutcome, BatchReport, BatchResult, BatchSubmissionOrchestrator, BatchSummary,
};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use defaults::{EmptinessPolicy, ReconcileOutcome, SmartDefaultsReconciler};
pub use domain::counterparty::{CounterpartyId, CounterpartySummary, EntityId, NegotiationId};
pub use domain::field::{FieldId, FieldValue, StepPayload};
pub use domain::negotiation::{NegotiationRef, NegotiationRequest, SmartDefaults};
pub use drafts::{
    DraftKey, DraftPersistenceManager, DraftPolicy, DraftSnapshot, DraftStore, InMemoryDraftStore,
};
pub use errors::{DraftStoreError, ServiceError, WizardError};
pub use services::{
    CounterpartyDirectory, NegotiationGateway, SmartDefaultsFetcher, StepPersistence,
};
pub use wizard::{
    DealConfigurationFlow, NavigationOutcome, RequisitionFlow, StepId, VendorOnboardingFlow,
    WizardFlow, WizardKind, WizardStateMachine,
};
