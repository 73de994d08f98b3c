use async_trait::async_trait;
use packet_scanner::{
    BackendResponse, CameraPlatform, CaptureTarget, CapturedValue, DecodeStreamBuilder,
    DisplaySurface, EventBus, EventFilter, EventReceiver, OperatorCommand, PacketBackend,
    ScannerEvent, ScannerSession, ShutdownReason, SimulatedPlatform, StreamState,
    SubmissionController, SubmissionError, SubmissionPacket,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Default)]
struct AcceptingBackend {
    sent: Mutex<Vec<SubmissionPacket>>,
}

#[async_trait]
impl PacketBackend for AcceptingBackend {
    async fn update_packet_info(
        &self,
        packet: &SubmissionPacket,
    ) -> Result<BackendResponse, SubmissionError> {
        self.sent.lock().push(packet.clone());
        Ok(BackendResponse {
            message: format!("Packet {} updated", packet.packet_id),
        })
    }
}

fn session_for(
    script: &str,
    backend: &Arc<AcceptingBackend>,
) -> (ScannerSession, Arc<EventBus>) {
    let platform = Arc::new(
        SimulatedPlatform::from_payload_lines(script).with_frame_interval(Duration::from_millis(100)),
    );
    let stream = DecodeStreamBuilder::new()
        .platform(platform as Arc<dyn CameraPlatform>)
        .build()
        .unwrap();
    let event_bus = Arc::new(EventBus::new(64));
    let session = ScannerSession::new(
        stream,
        DisplaySurface::headless(),
        SubmissionController::new(Arc::clone(backend) as Arc<dyn PacketBackend>),
        Arc::clone(&event_bus),
    );

    (session, event_bus)
}

/// Wait for the next field capture announced on the bus
async fn next_capture(receiver: &mut EventReceiver) -> (CaptureTarget, String) {
    let event = timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("capture within timeout")
        .unwrap();

    match event {
        ScannerEvent::FieldCaptured { target, value, .. } => (target, value.to_string()),
        other => panic!("Expected field capture, got {:?}", other),
    }
}

#[tokio::test]
async fn test_operator_scans_three_codes_and_submits() {
    let backend = Arc::new(AcceptingBackend::default());
    let (mut session, event_bus) = session_for(
        "PKT-7781\n{\"start_sequence\": 1, \"end_sequence\": 500}\n{\"start_sequence\": 1, \"end_sequence\": 500}\n",
        &backend,
    );
    let mut captures = event_bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["field_captured"]),
        "captures",
    );
    let mut statuses = event_bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["status_changed"]),
        "statuses",
    );

    let (tx, rx) = mpsc::channel(8);
    let runner = tokio::spawn(async move {
        let reason = session.run(rx).await.unwrap();
        (reason, session)
    });

    assert_eq!(
        next_capture(&mut captures).await,
        (CaptureTarget::PacketId, "PKT-7781".to_string())
    );

    tx.send(OperatorCommand::SelectTarget(CaptureTarget::StartSequence))
        .await
        .unwrap();
    assert_eq!(
        next_capture(&mut captures).await,
        (CaptureTarget::StartSequence, "1".to_string())
    );

    tx.send(OperatorCommand::NextTarget).await.unwrap();
    assert_eq!(
        next_capture(&mut captures).await,
        (CaptureTarget::EndSequence, "500".to_string())
    );

    tx.send(OperatorCommand::Submit).await.unwrap();
    let submitted = loop {
        let event = timeout(Duration::from_secs(2), statuses.recv())
            .await
            .unwrap()
            .unwrap();
        if let ScannerEvent::StatusChanged { message, .. } = event {
            if message.contains("updated") {
                break message;
            }
        }
    };
    assert_eq!(submitted, "Packet PKT-7781 updated");

    tx.send(OperatorCommand::Quit).await.unwrap();
    let (reason, session) = timeout(Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, ShutdownReason::UserRequest);
    assert_eq!(session.stream_state(), StreamState::Stopped);

    let sent = backend.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packet_id, CapturedValue::from("PKT-7781"));
    assert_eq!(sent[0].start_sequence, CapturedValue::from(1i64));
    assert_eq!(sent[0].end_sequence, CapturedValue::from(500i64));
}

#[tokio::test]
async fn test_insecure_origin_reports_status_and_stays_operable() {
    let backend = Arc::new(AcceptingBackend::default());
    let platform = Arc::new(
        SimulatedPlatform::from_payload_lines("P1").with_origin("http://10.0.0.5:3000"),
    );
    let stream = DecodeStreamBuilder::new()
        .platform(platform as Arc<dyn CameraPlatform>)
        .build()
        .unwrap();
    let mut session = ScannerSession::new(
        stream,
        DisplaySurface::headless(),
        SubmissionController::new(Arc::clone(&backend) as Arc<dyn PacketBackend>),
        Arc::new(EventBus::new(16)),
    );

    assert!(session.start_scanning().await.is_err());
    let status = session.status().unwrap().clone();
    assert!(status.is_error);
    assert!(status.text.contains("HTTPS"));

    // Operator actions still work without a camera
    session.reset(CaptureTarget::PacketId);
    assert_eq!(session.status().unwrap().text, "Packet ID reset.");
    assert!(session.submit().await.is_err());
    assert!(backend.sent.lock().is_empty());
}
