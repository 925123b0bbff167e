use super::*;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use shared::error::ErrorCode;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    reject_capture_with: Option<(StatusCode, String)>,
}

async fn record(state: &ServerState, path: &str, body: Value) {
    state.requests.lock().await.push((path.to_string(), body));
}

async fn handle_start(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    record(&state, START_CAPTURE_PATH, body).await;
    Json(json!({ "sid": "PK123", "status": "in-progress" }))
}

async fn handle_change_capture(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Response {
    record(&state, CHANGE_CAPTURE_PATH, body).await;
    match &state.reject_capture_with {
        Some((status, body)) => (*status, body.clone()).into_response(),
        None => Json(json!({ "sid": "PK123", "status": "in-progress" })).into_response(),
    }
}

async fn handle_change_status(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&state, CHANGE_STATUS_PATH, body).await;
    Json(json!({ "sid": "PK123", "status": "complete" }))
}

async fn handle_token(State(state): State<ServerState>, Json(body): Json<Value>) -> String {
    record(&state, CHANNEL_TOKEN_PATH, body).await;
    "sync-token-abc".to_string()
}

async fn spawn_gateway(state: ServerState) -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route(START_CAPTURE_PATH, post(handle_start))
        .route(CHANGE_CAPTURE_PATH, post(handle_change_capture))
        .route(CHANGE_STATUS_PATH, post(handle_change_status))
        .route(CHANNEL_TOKEN_PATH, post(handle_token))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/"), state)
}

fn charge() -> CaptureCharge {
    CaptureCharge {
        amount: 0.0,
        currency: "AUD".into(),
        token_type: Some("one-time".into()),
    }
}

#[tokio::test]
async fn posts_wire_shaped_bodies_to_every_endpoint() {
    let (url, state) = spawn_gateway(ServerState::default()).await;
    let gateway = HttpPaymentGateway::new(url);
    assert!(!gateway.base_url().ends_with('/'));

    let call_id = CallId::new("CA42");
    let payment_id = gateway
        .start_capture_session(&call_id, &charge())
        .await
        .expect("start");
    assert_eq!(payment_id, PaymentId::new("PK123"));

    let status = gateway
        .change_capture_target(&call_id, &payment_id, CaptureField::SecurityCode)
        .await
        .expect("change capture");
    assert_eq!(status.as_deref(), Some("in-progress"));

    gateway
        .change_session_status(&call_id, &payment_id, SessionStatus::Cancel)
        .await
        .expect("change status");

    let token = gateway.channel_token("CA42").await.expect("token");
    assert_eq!(token.expose(), "sync-token-abc");

    let requests = state.requests.lock().await.clone();
    let paths: Vec<_> = requests.iter().map(|(path, _)| path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            START_CAPTURE_PATH,
            CHANGE_CAPTURE_PATH,
            CHANGE_STATUS_PATH,
            CHANNEL_TOKEN_PATH
        ]
    );

    assert_eq!(
        requests[0].1,
        json!({
            "callSid": "CA42",
            "chargeAmount": 0.0,
            "currency": "AUD",
            "tokenType": "one-time"
        })
    );

    let change = &requests[1].1;
    assert_eq!(change["callSid"], "CA42");
    assert_eq!(change["paymentSid"], "PK123");
    assert_eq!(change["captureType"], "security-code");
    let key = change["idempotencyKey"].as_str().expect("idempotency key");
    assert!(key.starts_with("CA42"));
    assert!(key["CA42".len()..].parse::<i64>().is_ok());

    assert_eq!(requests[2].1["status"], "cancel");
    assert_eq!(requests[3].1, json!({ "identity": "CA42" }));
}

#[tokio::test]
async fn error_body_on_success_status_is_a_gateway_rejection() {
    let (url, _) = spawn_gateway(ServerState {
        reject_capture_with: Some((
            StatusCode::OK,
            json!({ "error": "Call is not in progress" }).to_string(),
        )),
        ..ServerState::default()
    })
    .await;
    let gateway = HttpPaymentGateway::new(url);

    let err = gateway
        .change_capture_target(
            &CallId::new("CA1"),
            &PaymentId::new("PK1"),
            CaptureField::CardNumber,
        )
        .await
        .expect_err("rejected");
    match err {
        CaptureError::Gateway {
            message,
            code,
            hint,
        } => {
            assert_eq!(message, "Call is not in progress");
            assert_eq!(code, ErrorCode::CallNotActive);
            assert!(hint.is_some());
        }
        other => panic!("expected gateway error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_status_carries_the_body_text() {
    let (url, _) = spawn_gateway(ServerState {
        reject_capture_with: Some((
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests".to_string(),
        )),
        ..ServerState::default()
    })
    .await;
    let gateway = HttpPaymentGateway::new(url);

    let err = gateway
        .change_capture_target(
            &CallId::new("CA1"),
            &PaymentId::new("PK1"),
            CaptureField::CardNumber,
        )
        .await
        .expect_err("rejected");
    assert!(matches!(
        err,
        CaptureError::Gateway {
            code: ErrorCode::RateLimited,
            ..
        }
    ));
}

#[tokio::test]
async fn unreachable_gateway_is_a_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = HttpPaymentGateway::new(format!("http://{addr}"));
    let err = gateway
        .start_capture_session(&CallId::new("CA1"), &charge())
        .await
        .expect_err("nothing listening");
    match err {
        CaptureError::Network(message) => {
            assert_eq!(message, "payment gateway unreachable");
            assert!(!message.contains(&addr.port().to_string()));
        }
        other => panic!("expected network error, got {other:?}"),
    }
}

#[test]
fn idempotency_key_is_call_id_followed_by_millis() {
    let key = idempotency_key(&CallId::new("CA9"));
    let millis: i64 = key.trim_start_matches("CA9").parse().expect("millis");
    assert!(millis > 0);
}
