use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use dealdesk_core::config::ApiConfig;
use dealdesk_core::domain::counterparty::{CounterpartyId, CounterpartySummary, EntityId};
use dealdesk_core::domain::field::StepPayload;
use dealdesk_core::domain::negotiation::{NegotiationRef, NegotiationRequest, SmartDefaults};
use dealdesk_core::errors::ServiceError;
use dealdesk_core::services::{
    CounterpartyDirectory, NegotiationGateway, SmartDefaultsFetcher, StepPersistence,
};
use dealdesk_core::wizard::StepId;

use crate::response::{extract_error_message, CounterpartyListBody};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid api base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// One client for every remote operation the wizards use. Cheap to clone.
#[derive(Clone)]
pub struct HttpProcurementApi {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpProcurementApi {
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            GatewayError::InvalidBaseUrl { url: base_url.to_owned(), reason: error.to_string() }
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "url cannot carry a path".to_owned(),
            });
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, token })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, GatewayError> {
        Self::new(&config.base_url, config.token.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base url.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ServiceError::Unavailable("api base url cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = self.authorize(request).send().await.map_err(|error| {
            warn!(event_name = "gateway.transport_failed", error = %error, "request not delivered");
            ServiceError::Unavailable(error.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body);
        warn!(
            event_name = "gateway.request_rejected",
            status = status.as_u16(),
            server_message = message.as_deref().unwrap_or(""),
            "remote side rejected request"
        );
        Err(ServiceError::Rejected { status: status.as_u16(), message })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|error| ServiceError::Decode(error.to_string()))
    }
}

#[async_trait]
impl SmartDefaultsFetcher for HttpProcurementApi {
    async fn fetch_smart_defaults(
        &self,
        entity_id: &EntityId,
        counterparty_id: &CounterpartyId,
    ) -> Result<SmartDefaults, ServiceError> {
        let url = self.endpoint(&["entities", &entity_id.0, "smart-defaults"])?;
        debug!(event_name = "gateway.smart_defaults", entity_id = %entity_id, "fetching defaults");
        let request = self.client.get(url).query(&[("counterparty", counterparty_id.0.as_str())]);
        self.send_json(request).await
    }
}

#[async_trait]
impl CounterpartyDirectory for HttpProcurementApi {
    async fn fetch_counterparty_list(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<CounterpartySummary>, ServiceError> {
        let url = self.endpoint(&["entities", &entity_id.0, "counterparties"])?;
        let body: CounterpartyListBody = self.send_json(self.client.get(url)).await?;
        Ok(body.into_list())
    }
}

#[async_trait]
impl NegotiationGateway for HttpProcurementApi {
    async fn create_negotiation(
        &self,
        counterparty_id: &CounterpartyId,
        request: NegotiationRequest,
    ) -> Result<NegotiationRef, ServiceError> {
        let url = self.endpoint(&["counterparties", &counterparty_id.0, "negotiations"])?;
        self.send_json(self.client.post(url).json(&request)).await
    }
}

#[async_trait]
impl StepPersistence for HttpProcurementApi {
    async fn persist_entity_step(
        &self,
        entity_id: &EntityId,
        step: StepId,
        payload: &StepPayload,
    ) -> Result<(), ServiceError> {
        let step = step.0.to_string();
        let url = self.endpoint(&["entities", &entity_id.0, "steps", &step])?;
        self.send(self.client.put(url).json(payload)).await?;
        Ok(())
    }
}
