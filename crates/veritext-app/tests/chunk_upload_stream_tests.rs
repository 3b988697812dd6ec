//! Integration tests for the chunked upload frame sequence.

mod common;

use tokio::sync::watch;
use veritext_contract::{END_OF_STREAM_SENTINEL, UploadHandshake};
use veritext_core::{ChunkPlan, DEFAULT_CHUNK_SIZE};
use veritext_upload::{
    StreamFrame, UploadOutcome, UploadPhase, UploadSession, run_chunked_upload,
};

const MIB: u64 = 1024 * 1024;

fn handshake(total: u64) -> UploadHandshake {
    UploadHandshake {
        folder_name: "thesis".to_string(),
        file_size: total,
    }
}

#[tokio::test]
async fn chunk_upload_stream_tests_three_mib_yields_three_frames_then_sentinel() {
    let bytes = vec![7_u8; (3 * MIB) as usize];
    let mut source: &[u8] = &bytes;

    let mut transport = common::ScriptedTransport::new(vec![
        common::upload_progress_frame("uploading", 50.0),
        common::upload_progress_frame("extracting", 75.0),
        common::upload_progress_frame("done", 100.0),
    ]);
    let mut session = UploadSession::new(
        ChunkPlan::new(3 * MIB, DEFAULT_CHUNK_SIZE).expect("plan should build"),
    );
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let mut seen = Vec::new();
    let outcome = run_chunked_upload(
        &mut transport,
        &mut session,
        &mut source,
        &handshake(3 * MIB),
        &mut cancel,
        |message| seen.push(message.clone()),
    )
    .await
    .expect("upload should complete");

    assert_eq!(outcome, UploadOutcome::Completed);
    assert_eq!(session.phase(), UploadPhase::Done);
    assert_eq!(session.bytes_sent(), 3 * MIB);
    assert_eq!(session.chunks_sent(), 3);
    assert_eq!(seen.len(), 3);

    // Exact frame order: handshake, three binary chunks, sentinel.
    assert_eq!(transport.sent.len(), 5);
    match &transport.sent[0] {
        StreamFrame::Text(text) => assert!(text.contains("\"folderName\":\"thesis\"")),
        StreamFrame::Binary(_) => panic!("first frame must be the handshake"),
    }
    for frame in &transport.sent[1..4] {
        match frame {
            StreamFrame::Binary(bytes) => assert_eq!(bytes.len() as u64, MIB),
            StreamFrame::Text(_) => panic!("chunks must be binary frames"),
        }
    }
    assert_eq!(
        transport.sent[4],
        StreamFrame::Text(END_OF_STREAM_SENTINEL.to_string()),
        "sentinel must follow the final chunk"
    );
}

#[tokio::test]
async fn chunk_upload_stream_tests_trailing_remainder_is_one_short_frame() {
    let total = 2 * MIB + 512;
    let bytes = vec![1_u8; total as usize];
    let mut source: &[u8] = &bytes;

    let mut transport =
        common::ScriptedTransport::new(vec![common::upload_progress_frame("done", 100.0)]);
    let mut session =
        UploadSession::new(ChunkPlan::new(total, DEFAULT_CHUNK_SIZE).expect("plan should build"));
    let (_cancel_tx, mut cancel) = watch::channel(false);

    run_chunked_upload(
        &mut transport,
        &mut session,
        &mut source,
        &handshake(total),
        &mut cancel,
        |_| {},
    )
    .await
    .expect("upload should complete");

    assert_eq!(
        transport.binary_lens(),
        vec![MIB as usize, MIB as usize, 512]
    );
}

#[tokio::test]
async fn chunk_upload_stream_tests_server_failure_is_terminal() {
    let bytes = vec![0_u8; 64];
    let mut source: &[u8] = &bytes;

    let mut transport = common::ScriptedTransport::new(vec![StreamFrame::Text(
        r#"{"error":"disk full","status":"failed"}"#.to_string(),
    )]);
    let mut session =
        UploadSession::new(ChunkPlan::new(64, 32).expect("plan should build"));
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let result = run_chunked_upload(
        &mut transport,
        &mut session,
        &mut source,
        &handshake(64),
        &mut cancel,
        |_| {},
    )
    .await;

    assert!(result.is_err());
    assert_eq!(session.phase(), UploadPhase::Failed);
    assert!(transport.closed, "socket must be closed on failure");
}

#[tokio::test]
async fn chunk_upload_stream_tests_peer_close_before_done_is_an_error() {
    let bytes = vec![0_u8; 64];
    let mut source: &[u8] = &bytes;

    // No inbound frames scripted: the peer closes right after the sentinel.
    let mut transport = common::ScriptedTransport::new(Vec::new());
    let mut session = UploadSession::new(ChunkPlan::new(64, 64).expect("plan should build"));
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let result = run_chunked_upload(
        &mut transport,
        &mut session,
        &mut source,
        &handshake(64),
        &mut cancel,
        |_| {},
    )
    .await;

    assert!(result.is_err());
    assert_eq!(session.phase(), UploadPhase::Failed);
}
