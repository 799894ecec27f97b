//! Remote operations the wizards depend on. Transport lives behind these
//! traits; `dealdesk-gateway` provides the HTTP implementation.

use async_trait::async_trait;

use crate::domain::counterparty::{CounterpartyId, CounterpartySummary, EntityId};
use crate::domain::field::StepPayload;
use crate::domain::negotiation::{NegotiationRef, NegotiationRequest, SmartDefaults};
use crate::errors::ServiceError;
use crate::wizard::states::StepId;

#[async_trait]
pub trait SmartDefaultsFetcher: Send + Sync {
    async fn fetch_smart_defaults(
        &self,
        entity_id: &EntityId,
        counterparty_id: &CounterpartyId,
    ) -> Result<SmartDefaults, ServiceError>;
}

#[async_trait]
pub trait CounterpartyDirectory: Send + Sync {
    async fn fetch_counterparty_list(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<CounterpartySummary>, ServiceError>;
}

#[async_trait]
pub trait NegotiationGateway: Send + Sync {
    async fn create_negotiation(
        &self,
        counterparty_id: &CounterpartyId,
        request: NegotiationRequest,
    ) -> Result<NegotiationRef, ServiceError>;
}

/// Server-side save of a single step, for wizards that persist progressively.
#[async_trait]
pub trait StepPersistence: Send + Sync {
    async fn persist_entity_step(
        &self,
        entity_id: &EntityId,
        step: StepId,
        payload: &StepPayload,
    ) -> Result<(), ServiceError>;
}
