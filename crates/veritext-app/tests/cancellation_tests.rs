//! Integration tests for first-class cancellation.

mod common;

use tokio::sync::watch;
use veritext_app::{ScanOutcome, ScanRuntime, run_scan};
use veritext_contract::UploadHandshake;
use veritext_core::ChunkPlan;
use veritext_upload::{
    StreamFrame, UploadOutcome, UploadPhase, UploadSession, run_chunked_upload,
};
use veritext_view::ScanPhase;

#[tokio::test]
async fn cancellation_tests_pre_armed_cancel_stops_before_first_chunk() {
    let bytes = vec![0_u8; 256];
    let mut source: &[u8] = &bytes;

    let mut transport = common::ScriptedTransport::new(Vec::new());
    let mut session = UploadSession::new(ChunkPlan::new(256, 64).expect("plan should build"));
    let (cancel_tx, mut cancel) = watch::channel(false);
    cancel_tx.send(true).expect("cancel send should work");

    let outcome = run_chunked_upload(
        &mut transport,
        &mut session,
        &mut source,
        &UploadHandshake {
            folder_name: "thesis".to_string(),
            file_size: 256,
        },
        &mut cancel,
        |_| {},
    )
    .await
    .expect("cancellation is not an error");

    assert_eq!(outcome, UploadOutcome::Cancelled);
    assert_eq!(session.phase(), UploadPhase::Cancelled);
    assert_eq!(session.bytes_sent(), 0);
    assert!(transport.closed, "socket must be closed promptly");

    // Handshake only; no binary frames, no sentinel.
    assert_eq!(transport.binary_lens().len(), 0);
    assert_eq!(transport.text_frames().len(), 1);
}

#[tokio::test]
async fn cancellation_tests_mid_session_cancel_wins_the_receive_loop() {
    let bytes = vec![0_u8; 64];

    // Peer sends one progress frame then goes quiet; the blocked receiver
    // leaves cancellation as the only way out.
    let transport = common::ScriptedTransport::new(vec![common::upload_progress_frame(
        "uploading", 40.0,
    )])
    .blocking_when_empty();
    let session = UploadSession::new(ChunkPlan::new(64, 64).expect("plan should build"));
    let (cancel_tx, cancel) = watch::channel(false);

    let driver = tokio::spawn(async move {
        let mut transport = transport;
        let mut session = session;
        let mut source: &[u8] = &bytes;
        let mut cancel = cancel;
        let outcome = run_chunked_upload(
            &mut transport,
            &mut session,
            &mut source,
            &UploadHandshake {
                folder_name: "thesis".to_string(),
                file_size: 64,
            },
            &mut cancel,
            |_| {},
        )
        .await;
        (outcome, transport, session)
    });

    tokio::task::yield_now().await;
    cancel_tx.send(true).expect("cancel send should work");

    let (outcome, transport, session) = driver.await.expect("driver task should finish");
    assert_eq!(
        outcome.expect("cancellation is not an error"),
        UploadOutcome::Cancelled
    );
    assert_eq!(session.phase(), UploadPhase::Cancelled);
    assert_eq!(session.bytes_sent(), 64, "chunks already sent stay counted");
    assert!(transport.closed);
}

#[tokio::test]
async fn cancellation_tests_scan_state_stays_inspectable() {
    let transport = common::ScriptedTransport::new(vec![
        common::page_count_frame(3),
        common::classification_frame(1, 1, "kept text", 2),
        common::page_completed_frame(1),
    ])
    .blocking_when_empty();
    let (cancel_tx, cancel) = watch::channel(false);

    let driver = tokio::spawn(async move {
        let mut transport = transport;
        let mut runtime = ScanRuntime::new("test");
        let mut cancel = cancel;
        let outcome = run_scan(&mut transport, &mut runtime, vec![1, 2, 3], &mut cancel).await;
        (outcome, transport, runtime)
    });

    // Let the driver drain the scripted frames before cancelling.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    cancel_tx.send(true).expect("cancel send should work");

    let (outcome, transport, runtime) = driver.await.expect("driver task should finish");
    assert_eq!(
        outcome.expect("cancellation is not an error"),
        ScanOutcome::Cancelled
    );
    assert!(transport.closed);

    // Partial aggregation survives cancellation, consistent and readable.
    assert_eq!(runtime.view().progress.phase(), ScanPhase::Cancelled);
    assert_eq!(runtime.aggregator().histogram().total(), 9);
    assert_eq!(runtime.aggregator().pages().entries(1).len(), 1);
    assert_eq!(runtime.view().cursor.total_pages(), 1);
}
