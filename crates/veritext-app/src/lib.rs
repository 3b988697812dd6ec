#![warn(missing_docs)]
//! # veritext-app
//!
//! ## Purpose
//! Orchestrates auth, streaming upload, scan ingestion, aggregation, and
//! view state for `veritext`.
//!
//! ## Responsibilities
//! - Derive service endpoint URLs from one configured API base.
//! - Fold scan-socket messages into aggregator + view state with the
//!   drop/continue policies the contract mandates.
//! - Drive complete scan and chunked-upload sessions with first-class
//!   cancellation.
//! - Enforce single-flight sessions: starting a new session cancels any
//!   prior in-flight one.
//!
//! ## Data flow
//! Auth/session token + validated file -> socket transport -> inbound frames
//! -> [`ScanRuntime::apply_scan_frame`] -> histogram/page buffer/view ->
//! status projection for the shell.
//!
//! ## Ownership and lifetimes
//! This crate passes owned frames and state snapshots between subsystems to
//! avoid hidden aliasing between long-lived runtime stages.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Per-chunk server errors
//! and malformed frames never abort a session; they increment view counters
//! and processing continues.
//!
//! ## Security and privacy notes
//! - Bearer tokens flow through headers only; [`redact_sensitive`] strips
//!   secret markers from log-safe status text.
//! - Cancellation closes sockets promptly and leaves aggregated state
//!   consistent and inspectable.

use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;
use veritext_aggregate::{LegendEntry, ScanAggregator};
use veritext_auth::AuthError;
use veritext_contract::{
    ContractError, ScanFrame, ScanServerMessage, UploadHandshake, UploadServerMessage,
    UploadStatus, parse_scan_frame,
};
use veritext_core::{CoreError, PageEntry};
use veritext_upload::{
    RestError, StreamFrame, StreamTransport, UploadError, UploadOutcome, UploadSession,
    run_chunked_upload, validate_project_upload,
};
use veritext_view::{ScanPhase, ViewError, ViewState};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("VERITEXT_VERSION");

/// WebSocket path of the chunked project upload endpoint.
pub const UPLOAD_SOCKET_PATH: &str = "/ws/upload";

/// WebSocket path of the PDF scan endpoint.
pub const SCAN_SOCKET_PATH: &str = "/ws/ocr/pdf";

/// REST path of the login endpoint.
pub const LOGIN_PATH: &str = "/api/login";

/// REST path of the project creation endpoint.
pub const PROJECT_NEW_PATH: &str = "/api/project/new";

/// REST path of the one-shot analysis endpoint.
pub const ANALYZE_PATH: &str = "/api/pdf/actual";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Joins an HTTP API base with a REST path.
///
/// # Errors
/// Returns [`AppError::InvalidEndpoint`] for unparseable bases.
pub fn rest_endpoint(api_base: &str, path: &str) -> Result<String, AppError> {
    let base = parse_base(api_base)?;
    let mut url = base;
    url.set_path(path);
    Ok(url.to_string())
}

/// Derives the WebSocket endpoint for `path` from an HTTP API base
/// (`http` -> `ws`, `https` -> `wss`).
///
/// # Errors
/// Returns [`AppError::InvalidEndpoint`] for unparseable bases or schemes
/// outside http/https/ws/wss.
pub fn socket_endpoint(api_base: &str, path: &str) -> Result<Url, AppError> {
    let mut url = parse_base(api_base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AppError::InvalidEndpoint(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };

    url.set_scheme(scheme)
        .map_err(|()| AppError::InvalidEndpoint("scheme rewrite failed".to_string()))?;
    url.set_path(path);
    Ok(url)
}

fn parse_base(api_base: &str) -> Result<Url, AppError> {
    Url::parse(api_base)
        .map_err(|error| AppError::InvalidEndpoint(format!("invalid api base: {error}")))
}

/// Session-scoped runtime state: aggregation plus view model.
#[derive(Debug, Clone)]
pub struct ScanRuntime {
    aggregator: ScanAggregator,
    view: ViewState,
    chunks_processed: u64,
}

impl ScanRuntime {
    /// Creates a fresh runtime.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            aggregator: ScanAggregator::new(),
            view: ViewState::new(version),
            chunks_processed: 0,
        }
    }

    /// Aggregated statistics snapshot.
    pub fn aggregator(&self) -> &ScanAggregator {
        &self.aggregator
    }

    /// Mutable aggregator access for the one-shot analysis path.
    pub fn aggregator_mut(&mut self) -> &mut ScanAggregator {
        &mut self.aggregator
    }

    /// View-model snapshot.
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Mutable view access for drivers and shells.
    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    /// Classified chunks recorded this session.
    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed
    }

    /// Legend rows for the current histogram.
    pub fn legend(&self) -> Vec<LegendEntry> {
        self.aggregator.legend()
    }

    /// Entries buffered for the cursor's current page.
    pub fn current_page_entries(&self) -> &[PageEntry] {
        self.aggregator
            .pages()
            .entries(self.view.cursor.current_page())
    }

    /// Applies one parsed scan-socket frame to runtime state.
    ///
    /// Policy per message kind:
    /// - greetings and hints update status/progress only;
    /// - classifications with unknown categories are dropped silently;
    /// - per-chunk errors and malformed payloads are recorded and the
    ///   session continues;
    /// - page completion advances synthetic progress;
    /// - document completion is terminal success.
    pub fn apply_scan_frame(&mut self, frame: &ScanFrame) {
        match frame {
            ScanFrame::Greeting(text) => {
                self.view.set_status(text.clone());
            }
            ScanFrame::Message(message) => self.apply_scan_message(message),
        }
    }

    fn apply_scan_message(&mut self, message: &ScanServerMessage) {
        match message {
            ScanServerMessage::PageCountHint { total_pages } => {
                self.view.progress.set_expected_units(*total_pages);
                self.view
                    .set_status(format!("Document has {total_pages} pages"));
            }
            ScanServerMessage::Classification(wire) => match wire.resolve() {
                Ok(Some(event)) => {
                    let page = event.page;
                    let chunk = event.chunk_index + 1;
                    if self.aggregator.apply_event(&event).is_err() {
                        self.view.record_malformed_frame();
                        return;
                    }

                    self.view.cursor.observe_page(page);
                    self.chunks_processed += 1;
                    self.view.set_status(format!(
                        "Processing page {page}, chunk {chunk} ({} chunks total)",
                        self.chunks_processed
                    ));
                }
                Ok(None) => {
                    // Unknown category: dropped, not counted, not buffered.
                }
                Err(_) => self.view.record_malformed_frame(),
            },
            ScanServerMessage::ChunkFailed { page, chunk, error } => {
                self.view.record_chunk_failure(*page, *chunk, error);
            }
            ScanServerMessage::PageCompleted { page } => {
                self.view.cursor.observe_page(*page);
                self.view.progress.on_unit_completed();
                self.view.set_status(format!("Page {page} completed"));
            }
            ScanServerMessage::DocumentDone => {
                self.view.progress.on_done();
                self.view.set_status("Scan completed for all pages");
            }
        }
    }

    /// Applies one upload-socket progress message to the view.
    pub fn apply_upload_message(&mut self, message: &UploadServerMessage) {
        apply_upload_message_to_view(&mut self.view, message);
    }

    /// Resets all per-session state for a fresh scan.
    pub fn reset_for_new_session(&mut self) {
        self.aggregator.reset();
        self.view.reset_for_new_session();
        self.chunks_processed = 0;
    }
}

/// Terminal result of one driven scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Server reported the whole document done.
    Completed,
    /// Caller cancelled before completion.
    Cancelled,
}

/// Streams one PDF through the scan socket and folds the classification
/// stream into `runtime`.
///
/// The document travels as a single binary frame; the server pushes the
/// page-count hint, classification events, per-chunk errors, page
/// completions, and a final done message. Malformed frames and per-chunk
/// errors never abort the session.
///
/// # Errors
/// Connection-level failures are terminal: the tracker moves to `Failed` and
/// the error is returned. Cancellation is not an error; it yields
/// [`ScanOutcome::Cancelled`] with runtime state intact.
pub async fn run_scan<T>(
    transport: &mut T,
    runtime: &mut ScanRuntime,
    document: Vec<u8>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<ScanOutcome, AppError>
where
    T: StreamTransport + ?Sized,
{
    match drive_scan(transport, runtime, document, cancel).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            runtime.view_mut().progress.on_failed();
            runtime
                .view_mut()
                .set_status("WebSocket connection failed. Check server status.");
            let _ = transport.close().await;
            Err(error)
        }
    }
}

async fn drive_scan<T>(
    transport: &mut T,
    runtime: &mut ScanRuntime,
    document: Vec<u8>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<ScanOutcome, AppError>
where
    T: StreamTransport + ?Sized,
{
    runtime.view_mut().progress.on_connecting();
    runtime.view_mut().set_status("Connecting to scan socket");
    transport.connect().await.map_err(UploadError::Stream)?;

    if *cancel.borrow() {
        return finish_scan_cancelled(transport, runtime).await;
    }

    let document_len = document.len();
    transport
        .send_binary(document)
        .await
        .map_err(UploadError::Stream)?;
    info!(bytes = document_len, "document submitted for scan");

    let mut greeting_allowed = true;
    let mut cancel_active = true;
    loop {
        tokio::select! {
            changed = cancel.changed(), if cancel_active => {
                match changed {
                    Ok(()) if *cancel.borrow() => {
                        return finish_scan_cancelled(transport, runtime).await;
                    }
                    Ok(()) => {}
                    Err(_) => cancel_active = false,
                }
            }
            frame = transport.next_frame() => {
                match frame.map_err(UploadError::Stream)? {
                    None => {
                        // Some servers close right after the done message.
                        if runtime.view().progress.phase() == ScanPhase::Done {
                            return Ok(ScanOutcome::Completed);
                        }
                        return Err(AppError::Upload(UploadError::ConnectionClosed));
                    }
                    Some(StreamFrame::Binary(_)) => {}
                    Some(StreamFrame::Text(raw)) => {
                        match parse_scan_frame(&raw, greeting_allowed) {
                            Ok(frame) => {
                                if matches!(frame, ScanFrame::Message(_)) {
                                    greeting_allowed = false;
                                }

                                let done = matches!(
                                    frame,
                                    ScanFrame::Message(ScanServerMessage::DocumentDone)
                                );
                                runtime.apply_scan_frame(&frame);

                                if done {
                                    transport.close().await.map_err(UploadError::Stream)?;
                                    return Ok(ScanOutcome::Completed);
                                }
                            }
                            Err(error) => {
                                warn!(%error, "discarding malformed scan frame");
                                runtime.view_mut().record_malformed_frame();
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn finish_scan_cancelled<T>(
    transport: &mut T,
    runtime: &mut ScanRuntime,
) -> Result<ScanOutcome, AppError>
where
    T: StreamTransport + ?Sized,
{
    runtime.view_mut().progress.on_cancelled();
    runtime.view_mut().set_status("Scan cancelled");
    transport.close().await.map_err(UploadError::Stream)?;
    Ok(ScanOutcome::Cancelled)
}

/// Streams one project archive through the chunked upload socket, mirroring
/// server progress into `runtime`'s view state.
///
/// # Errors
/// Validation failures surface before any network I/O; socket failures are
/// terminal for the session.
pub async fn run_project_stream<T, R>(
    transport: &mut T,
    runtime: &mut ScanRuntime,
    source: &mut R,
    file_name: &str,
    file_size: u64,
    project_name: &str,
    chunk_size: u64,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(UploadOutcome, UploadSession), AppError>
where
    T: StreamTransport + ?Sized,
    R: tokio::io::AsyncRead + Unpin + Send,
{
    validate_project_upload(project_name, file_name, file_size)
        .map_err(UploadError::Validation)?;

    let plan = veritext_core::ChunkPlan::new(file_size, chunk_size)?;
    let mut session = UploadSession::new(plan);
    let handshake = UploadHandshake {
        folder_name: project_name.to_string(),
        file_size,
    };

    runtime.view_mut().progress.on_connecting();
    runtime.view_mut().set_status("Connecting to upload socket");

    let view = runtime.view_mut();
    let outcome = run_chunked_upload(
        transport,
        &mut session,
        source,
        &handshake,
        cancel,
        |message| apply_upload_message_to_view(view, message),
    )
    .await;

    match outcome {
        Ok(outcome) => {
            if outcome == UploadOutcome::Cancelled {
                runtime.view_mut().progress.on_cancelled();
                runtime.view_mut().set_status("Upload cancelled");
            }
            Ok((outcome, session))
        }
        Err(error) => {
            runtime.view_mut().progress.on_failed();
            runtime
                .view_mut()
                .set_status(format!("Upload failed: {error}"));
            Err(error.into())
        }
    }
}

fn apply_upload_message_to_view(view: &mut ViewState, message: &UploadServerMessage) {
    match message {
        UploadServerMessage::Progress { status, progress } => match status {
            UploadStatus::Done => {
                view.progress.on_done();
                view.set_status("Upload complete");
            }
            UploadStatus::Uploading => {
                view.progress.on_reported_percent("uploading", *progress);
            }
            UploadStatus::Extracting => {
                view.progress.on_reported_percent("extracting", *progress);
            }
        },
        UploadServerMessage::Failed { error } => {
            view.progress.on_failed();
            view.set_status(format!("Upload failed: {error}"));
        }
    }
}

/// Single-flight guard over scan/upload sessions.
///
/// Starting a new session cancels any prior in-flight one before handing out
/// a fresh cancel receiver, so two sessions never write into the same
/// runtime state.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Option<watch::Sender<bool>>,
}

impl SessionSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any previous session and returns the new session's cancel
    /// receiver. Keep the slot alive for the session's duration; dropping it
    /// detaches cancellation.
    pub fn begin(&mut self) -> watch::Receiver<bool> {
        if let Some(previous) = self.current.take() {
            let _ = previous.send(true);
        }

        let (sender, receiver) = watch::channel(false);
        self.current = Some(sender);
        receiver
    }

    /// Cancels the active session, if any.
    pub fn cancel_active(&mut self) {
        if let Some(sender) = self.current.as_ref() {
            let _ = sender.send(true);
        }
    }

    /// Returns `true` while a session holds an un-cancelled receiver.
    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|sender| !*sender.borrow())
    }
}

/// Consolidated runtime status snapshot for simple shell projection.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeStatus {
    /// Session phase as human-readable string.
    pub phase: String,
    /// Displayed progress percentage.
    pub percent: f64,
    /// Current status line.
    pub status: String,
    /// Pages with buffered content.
    pub pages: u32,
    /// Total histogram weight.
    pub total_weight: u64,
    /// Non-fatal per-chunk failures.
    pub chunk_failures: u64,
    /// Discarded malformed frames.
    pub malformed_frames: u64,
    /// Classifications dropped for unknown categories.
    pub dropped_unknown: u64,
}

/// Projects runtime state into a flat status snapshot.
pub fn project_runtime_status(runtime: &ScanRuntime) -> RuntimeStatus {
    RuntimeStatus {
        phase: format!("{:?}", runtime.view().progress.phase()),
        percent: runtime.view().progress.percent(),
        status: runtime.view().status_line.clone(),
        pages: runtime.aggregator().max_page(),
        total_weight: runtime.aggregator().histogram().total(),
        chunk_failures: runtime.view().chunk_failures,
        malformed_frames: runtime.view().malformed_frames,
        dropped_unknown: runtime.aggregator().dropped_unknown(),
    }
}

/// Redacts common secret markers in log-safe output.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in ["token", "authorization", "bearer", "email"] {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    if let Some(position) = lower.find(key) {
        let prefix = &input[..position];
        return format!("{prefix}{key}=<redacted>");
    }

    input.to_string()
}

/// App integration error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Auth subsystem error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Streaming upload/scan error.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    /// REST client error.
    #[error("rest error: {0}")]
    Rest(#[from] RestError),
    /// Wire contract error.
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// View-model error.
    #[error("view error: {0}")]
    View(#[from] ViewError),
    /// Endpoint derivation failure.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
