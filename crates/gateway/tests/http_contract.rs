use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use dealdesk_core::batch::BatchSummary;
use dealdesk_core::domain::field::{FieldId, FieldValue, StepPayload};
use dealdesk_core::wizard::flows::deal;
use dealdesk_core::{
    BatchOutcome, BatchSubmissionOrchestrator, CounterpartyDirectory, CounterpartyId, EntityId,
    ServiceError, SmartDefaultsFetcher, StepId, StepPersistence,
};
use dealdesk_gateway::HttpProcurementApi;

#[derive(Debug, Clone)]
struct Recorded {
    route: String,
    authorization: Option<String>,
    query: HashMap<String, String>,
    body: Value,
}

#[derive(Default)]
struct MockProcurement {
    requests: Mutex<Vec<Recorded>>,
}

impl MockProcurement {
    fn record(
        &self,
        route: String,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        body: Value,
    ) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(Recorded { route, authorization, query, body });
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

async fn smart_defaults(
    State(mock): State<Arc<MockProcurement>>,
    Path(entity): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    mock.record(format!("GET /entities/{entity}/smart-defaults"), &headers, query, Value::Null);
    Json(json!({
        "price_quantity": { "target_price": "80", "quantity": null },
        "payment_terms": { "min_days": "0", "max_days": "45" }
    }))
}

async fn counterparties(
    State(mock): State<Arc<MockProcurement>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    let route = format!("GET /entities/{entity}/counterparties");
    mock.record(route, &headers, HashMap::new(), Value::Null);
    Json(json!({
        "counterparties": [
            { "id": "cp-1", "display_name": "Acme Industrial" },
            { "id": "cp-2", "display_name": "Globex", "existing_negotiation_id": "NEG-77" },
            { "id": "cp-3", "display_name": "Initech" }
        ]
    }))
}

async fn create_negotiation(
    State(mock): State<Arc<MockProcurement>>,
    Path(counterparty): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record(
        format!("POST /counterparties/{counterparty}/negotiations"),
        &headers,
        HashMap::new(),
        body,
    );
    match counterparty.as_str() {
        "cp-2" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "message": "Globex is on a sourcing hold" })),
        ),
        "cp-3" => (StatusCode::BAD_GATEWAY, Json(json!({ "status": 502 }))),
        _ => (StatusCode::CREATED, Json(json!({ "id": format!("NEG-{counterparty}") }))),
    }
}

async fn persist_step(
    State(mock): State<Arc<MockProcurement>>,
    Path((entity, step)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    mock.record(format!("PUT /entities/{entity}/steps/{step}"), &headers, HashMap::new(), body);
    if step == "9" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn serve(mock: Arc<MockProcurement>) -> String {
    let router = Router::new()
        .route("/api/entities/{entity}/smart-defaults", get(smart_defaults))
        .route("/api/entities/{entity}/counterparties", get(counterparties))
        .route("/api/counterparties/{counterparty}/negotiations", post(create_negotiation))
        .route("/api/entities/{entity}/steps/{step}", put(persist_step))
        .with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let address = listener.local_addr().expect("mock address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{address}/api")
}

fn client(base_url: &str, token: Option<&str>) -> HttpProcurementApi {
    let token = token.map(|token| SecretString::from(token.to_owned()));
    HttpProcurementApi::new(base_url, token, Duration::from_secs(5)).expect("client")
}

fn entity() -> EntityId {
    EntityId("ENT-42".to_owned())
}

#[tokio::test]
async fn smart_defaults_request_carries_counterparty_and_bearer_token() {
    let mock = Arc::new(MockProcurement::default());
    let api = client(&serve(mock.clone()).await, Some("s3cret"));

    let defaults = api
        .fetch_smart_defaults(&entity(), &CounterpartyId("cp-1".to_owned()))
        .await
        .expect("defaults");

    let pricing = defaults.price_quantity.expect("pricing section");
    assert_eq!(pricing.target_price, Some(Decimal::from(80)));
    assert_eq!(pricing.quantity, None);
    assert_eq!(defaults.payment_terms.and_then(|terms| terms.min_days), Some(Decimal::ZERO));

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].route, "GET /entities/ENT-42/smart-defaults");
    assert_eq!(requests[0].query.get("counterparty").map(String::as_str), Some("cp-1"));
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer s3cret"));
}

#[tokio::test]
async fn counterparty_directory_unwraps_list() {
    let mock = Arc::new(MockProcurement::default());
    let api = client(&serve(mock.clone()).await, None);

    let list = api.fetch_counterparty_list(&entity()).await.expect("directory");

    assert_eq!(list.len(), 3);
    assert_eq!(list[1].display_name, "Globex");
    assert_eq!(list[1].existing_negotiation_id.as_ref().map(|id| id.0.as_str()), Some("NEG-77"));
    assert_eq!(mock.requests()[0].authorization, None);
}

#[tokio::test]
async fn step_persistence_maps_failures_to_service_errors() {
    let mock = Arc::new(MockProcurement::default());
    let api = client(&serve(mock.clone()).await, None);
    let mut payload = StepPayload::new();
    payload.insert(FieldId::from("legal_name"), FieldValue::text("Acme GmbH"));

    api.persist_entity_step(&entity(), StepId(1), &payload).await.expect("saved");
    let failed = api.persist_entity_step(&entity(), StepId(9), &payload).await;

    assert_eq!(failed, Err(ServiceError::Rejected { status: 503, message: None }));
    let requests = mock.requests();
    assert_eq!(requests[0].route, "PUT /entities/ENT-42/steps/1");
    assert_eq!(requests[0].body["legal_name"]["value"], "Acme GmbH");
}

#[tokio::test]
async fn unreachable_server_is_reported_as_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    drop(listener);
    let api = client(&format!("http://{address}/api"), None);

    let result = api.fetch_counterparty_list(&entity()).await;

    assert!(matches!(result, Err(ServiceError::Unavailable(_))));
}

#[tokio::test]
async fn batch_over_http_reports_each_counterparty_in_order() {
    let mock = Arc::new(MockProcurement::default());
    let api = Arc::new(client(&serve(mock.clone()).await, Some("s3cret")));
    let orchestrator = BatchSubmissionOrchestrator::new(api.clone(), api);
    let mut payload = StepPayload::new();
    payload.insert(FieldId::from(deal::TARGET_PRICE), FieldValue::number(50));
    payload.insert(FieldId::from(deal::LATE_PENALTY_RATE), FieldValue::number(35));
    let targets: Vec<CounterpartyId> =
        ["cp-1", "cp-2", "cp-3"].iter().map(|id| CounterpartyId((*id).to_owned())).collect();

    let report = orchestrator.submit_batch(&entity(), &payload, &targets).await;

    assert_eq!(report.summary(), BatchSummary::Partial { succeeded: 1, failed: 2 });
    let names: Vec<&str> =
        report.results.iter().map(|result| result.display_name.as_str()).collect();
    assert_eq!(names, ["Acme Industrial", "Globex", "Initech"]);
    assert!(matches!(
        &report.results[1].outcome,
        BatchOutcome::Rejected { message } if message == "Globex is on a sourcing hold"
    ));
    assert!(matches!(
        &report.results[2].outcome,
        BatchOutcome::Rejected { message } if message == "Failed to start negotiation"
    ));

    let creations: Vec<Recorded> = mock
        .requests()
        .into_iter()
        .filter(|request| request.route.starts_with("POST"))
        .collect();
    assert_eq!(creations.len(), 3);
    let globex = creations
        .iter()
        .find(|request| request.route.contains("cp-2"))
        .expect("globex request");
    assert_eq!(globex.body["link_negotiation_id"], "NEG-77");
    assert_eq!(globex.body["terms"]["late_penalty_rate"], "20");
    assert_eq!(globex.authorization.as_deref(), Some("Bearer s3cret"));
}
