//! End-to-end scan session tests over a scripted transport.

mod common;

use tokio::sync::watch;
use veritext_app::{AppError, ScanOutcome, ScanRuntime, run_scan};
use veritext_core::Label;
use veritext_upload::{StreamFrame, UploadError};
use veritext_view::ScanPhase;

#[tokio::test]
async fn scan_session_tests_full_stream_aggregates_and_completes() {
    let mut transport = common::ScriptedTransport::new(vec![
        StreamFrame::Text("Connected. Send PDF bytes now.".to_string()),
        common::page_count_frame(2),
        common::classification_frame(1, 1, "written by machine", 0),
        common::classification_frame(1, 2, "written by hand", 2),
        StreamFrame::Text(r#"{"page":1,"chunk":3,"error":"model offline"}"#.to_string()),
        common::page_completed_frame(1),
        common::classification_frame(2, 1, "mystery text", 99),
        StreamFrame::Text("%%% not json %%%".to_string()),
        common::classification_frame(2, 2, "polished prose", 3),
        common::page_completed_frame(2),
        common::done_frame(),
    ]);

    let mut runtime = ScanRuntime::new("test");
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let outcome = run_scan(&mut transport, &mut runtime, vec![0_u8; 32], &mut cancel)
        .await
        .expect("scan should complete");
    assert_eq!(outcome, ScanOutcome::Completed);

    // The PDF went out as exactly one binary frame.
    assert_eq!(transport.binary_lens(), vec![32]);
    assert!(transport.closed);

    let histogram = runtime.aggregator().histogram();
    assert_eq!(histogram.weight(Label::Ai), 18);
    assert_eq!(histogram.weight(Label::Human), 15);
    assert_eq!(histogram.weight(Label::Polished), 14);
    assert_eq!(histogram.total(), 47);

    assert_eq!(runtime.aggregator().dropped_unknown(), 1);
    assert_eq!(runtime.view().chunk_failures, 1);
    assert_eq!(runtime.view().malformed_frames, 1);
    assert_eq!(runtime.view().cursor.total_pages(), 2);
    assert_eq!(runtime.view().progress.phase(), ScanPhase::Done);
    assert_eq!(runtime.view().progress.percent(), 100.0);
    assert_eq!(runtime.chunks_processed(), 3);
}

#[tokio::test]
async fn scan_session_tests_connect_failure_is_terminal() {
    let mut transport = common::ScriptedTransport::failing_connect();
    let mut runtime = ScanRuntime::new("test");
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let error = run_scan(&mut transport, &mut runtime, vec![1], &mut cancel)
        .await
        .expect_err("connect failure must surface");

    assert!(matches!(
        error,
        AppError::Upload(UploadError::Stream(_))
    ));
    assert_eq!(runtime.view().progress.phase(), ScanPhase::Failed);
    assert!(runtime.view().status_line.contains("connection failed"));
}

#[tokio::test]
async fn scan_session_tests_peer_close_before_done_fails_the_session() {
    let mut transport = common::ScriptedTransport::new(vec![
        common::page_count_frame(3),
        common::classification_frame(1, 1, "partial", 0),
    ]);
    let mut runtime = ScanRuntime::new("test");
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let error = run_scan(&mut transport, &mut runtime, vec![1], &mut cancel)
        .await
        .expect_err("early close must surface");

    assert!(matches!(
        error,
        AppError::Upload(UploadError::ConnectionClosed)
    ));
    assert_eq!(runtime.view().progress.phase(), ScanPhase::Failed);

    // Partial aggregation stays readable after the failure.
    assert_eq!(runtime.aggregator().histogram().total(), 7);
}

#[tokio::test]
async fn scan_session_tests_peer_close_right_after_done_still_completes() {
    // No explicit close frame: the transport reports end-of-stream after the
    // done message has been consumed.
    let mut transport = common::ScriptedTransport::new(vec![
        common::page_count_frame(1),
        common::page_completed_frame(1),
        common::done_frame(),
    ]);
    let mut runtime = ScanRuntime::new("test");
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let outcome = run_scan(&mut transport, &mut runtime, vec![1], &mut cancel)
        .await
        .expect("scan should complete");
    assert_eq!(outcome, ScanOutcome::Completed);
}
