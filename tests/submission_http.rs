use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use packet_scanner::{
    CaptureTarget, FieldRouter, HttpPacketBackend, PacketBackend, SubmissionController,
    SubmissionError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct MockBackend {
    received: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
    reply: Value,
}

async fn update_packet_info(
    State(backend): State<MockBackend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.received.lock().push(body);
    (backend.status, Json(backend.reply.clone()))
}

/// Serve the mock on an ephemeral port; returns its base URL and request log
async fn spawn_backend(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = MockBackend {
        received: Arc::clone(&received),
        status,
        reply,
    };

    let app = Router::new()
        .route("/updatePacketInfo", post(update_packet_info))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}", addr), received)
}

fn controller_for(base: &str) -> SubmissionController {
    let url = format!("{}/updatePacketInfo", base).parse().unwrap();
    let backend = HttpPacketBackend::new(url, Duration::from_secs(2)).unwrap();
    SubmissionController::new(Arc::new(backend) as Arc<dyn PacketBackend>)
}

fn complete_router() -> FieldRouter {
    let mut router = FieldRouter::new();
    router.write(CaptureTarget::PacketId, "P1".into());
    router.write(CaptureTarget::StartSequence, 1i64.into());
    router.write(CaptureTarget::EndSequence, 100i64.into());
    router
}

#[tokio::test]
async fn test_backend_message_becomes_status() {
    let (base, received) = spawn_backend(StatusCode::OK, json!({"message": "ok"})).await;
    let controller = controller_for(&base);

    let message = controller.submit(&complete_router()).await.unwrap();

    assert_eq!(message, "ok");
    assert_eq!(
        *received.lock(),
        vec![json!({"packet_id": "P1", "start_sequence": 1, "end_sequence": 100})]
    );
}

#[tokio::test]
async fn test_server_error_maps_to_generic_failure() {
    let (base, received) = spawn_backend(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"message": "database down"}),
    )
    .await;
    let controller = controller_for(&base);

    let err = controller.submit(&complete_router()).await.unwrap_err();

    assert!(matches!(err, SubmissionError::Status { status: 500 }));
    assert_eq!(err.status_message(), "Error updating packet info");
    assert_eq!(received.lock().len(), 1);
}

#[tokio::test]
async fn test_reply_without_message_is_rejected() {
    let (base, _received) = spawn_backend(StatusCode::OK, json!({"status": "stored"})).await;
    let controller = controller_for(&base);

    let err = controller.submit(&complete_router()).await.unwrap_err();

    assert!(matches!(err, SubmissionError::InvalidResponse { .. }));
    assert_eq!(err.status_message(), "Error updating packet info");
}

#[tokio::test]
async fn test_connection_refused_maps_to_generic_failure() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let controller = controller_for(&format!("http://{}", addr));
    let err = controller.submit(&complete_router()).await.unwrap_err();

    assert!(matches!(err, SubmissionError::Transport { .. }));
    assert_eq!(err.status_message(), "Error updating packet info");
}

#[tokio::test]
async fn test_incomplete_packet_is_never_posted() {
    let (base, received) = spawn_backend(StatusCode::OK, json!({"message": "ok"})).await;
    let controller = controller_for(&base);

    let mut router = complete_router();
    router.reset(CaptureTarget::EndSequence);

    let err = controller.submit(&router).await.unwrap_err();

    assert!(matches!(err, SubmissionError::Incomplete));
    assert_eq!(err.to_string(), "All fields must be scanned.");
    assert!(received.lock().is_empty());
}
