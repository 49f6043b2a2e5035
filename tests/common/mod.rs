#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Requests received by the stub server, per endpoint.
#[derive(Default)]
pub struct StubLog {
    pub intents: Vec<Value>,
    pub updates: Vec<Value>,
    pub payments: Vec<Value>,
}

#[derive(Clone)]
pub struct Stub {
    pub status: StatusCode,
    pub log: Arc<Mutex<StubLog>>,
}

async fn intent(State(stub): State<Stub>, Json(body): Json<Value>) -> Response {
    stub.log.lock().unwrap().intents.push(body);
    if !stub.status.is_success() {
        return stub.status.into_response();
    }
    Json(json!({
        "product": {"name": "Brewly Espresso Maker", "price": 4999, "brand": "Brewly"},
        "alternatives": [
            {"name": "Brewly Espresso Maker", "price": 4999, "brand": "Brewly"},
            {"name": "Brewly Espresso Maker Pro", "price": 12999, "brand": "Brewly"}
        ],
        "agentLogs": [
            {"agent": "ShopperBot", "message": "Processing User Request: 'coffee machine'"},
            {"agent": "ECOMSURFER", "message": "Found 2 matches"}
        ]
    }))
    .into_response()
}

async fn update_product(State(stub): State<Stub>, Json(body): Json<Value>) -> Response {
    stub.log.lock().unwrap().updates.push(body);
    if !stub.status.is_success() {
        return stub.status.into_response();
    }
    Json(json!({"status": "success"})).into_response()
}

async fn pay(State(stub): State<Stub>, Json(body): Json<Value>) -> Response {
    stub.log.lock().unwrap().payments.push(body);
    if !stub.status.is_success() {
        return stub.status.into_response();
    }
    Json(json!({
        "status": "SUCCESS",
        "receiptId": "txn_pay_0001",
        "agentLogs": [
            {"agent": "CredentialsProvider", "message": "Retrieving payment methods..."},
            {"agent": "GlobalPay", "message": "Transaction authorized."}
        ]
    }))
    .into_response()
}

/// Serves the three backend endpoints on an ephemeral port, answering every request
/// with `status` (canned bodies on success). Returns the base URL and the request log.
pub async fn spawn_stub_backend(status: StatusCode) -> (String, Arc<Mutex<StubLog>>) {
    let stub = Stub {
        status,
        log: Arc::new(Mutex::new(StubLog::default())),
    };
    let log = stub.log.clone();
    let app = Router::new()
        .route("/intent", post(intent))
        .route("/update-product", post(update_product))
        .route("/pay", post(pay))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), log)
}

/// A configuration file with every delay shortened to a few milliseconds.
pub fn fast_config() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[delays]
merchant_handoff_ms = 5
product_reveal_ms = 10
auto_payment_ms = 5
payment_handoff_ms = 5
receipt_reveal_ms = 10
log_stagger_ms = 1
"#
    )
    .unwrap();
    file
}
