#![warn(missing_docs)]
//! # veritext-upload
//!
//! ## Purpose
//! Implements the client side of the detection service's upload surfaces:
//! the chunked WebSocket streaming protocol and the authenticated REST
//! endpoints.
//!
//! ## Responsibilities
//! - Model one streaming upload as an explicit session state machine.
//! - Abstract the socket behind [`StreamTransport`] with a
//!   tokio-tungstenite implementation.
//! - Drive handshake -> serialized chunk sends -> sentinel -> progress loop,
//!   with cancellation as a first-class transition.
//! - Execute multipart REST uploads with bounded retry and failure
//!   classification.
//!
//! ## Data flow
//! [`veritext_core::ChunkPlan`] bounds reads; each chunk is fully read into
//! memory, sent as one binary frame, then the next read begins. Inbound
//! progress frames are decoded by `veritext-contract` and surfaced through a
//! caller-provided callback.
//!
//! ## Ownership and lifetimes
//! Sessions, transports, and requests are owned values; retries never borrow
//! transient response buffers.
//!
//! ## Error model
//! Socket-level failures are terminal for a streaming session ([`UploadPhase::Failed`]);
//! there is deliberately no retry, resume, or reconnect on that path. REST
//! failures are classified [`FailureClass::Recoverable`] or
//! [`FailureClass::Fatal`]; only recoverable ones are retried.
//!
//! ## Security and privacy notes
//! Bearer tokens are carried in headers only and never logged. Upload bytes
//! are digested (sha256) solely for idempotency keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;
use veritext_contract::{
    ContractError, END_OF_STREAM_SENTINEL, UploadHandshake, UploadServerMessage, UploadStatus,
    parse_api_failure, parse_analyze_response, parse_project_created, parse_upload_message,
    AnalyzeResponse, ProjectCreated,
};
use veritext_core::{ChunkPlan, CoreError, MAX_UPLOAD_BYTES};

/// Lifecycle states of one streaming upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Session created, socket not yet opened.
    Idle,
    /// Socket connection in progress.
    Connecting,
    /// Binary chunks are being transmitted.
    Sending,
    /// Sentinel sent; waiting for server progress to finish.
    AwaitingServer,
    /// Server confirmed completion.
    Done,
    /// Terminal failure; a new session is required to recover.
    Failed,
    /// Caller cancelled; socket closed, no further sends.
    Cancelled,
}

impl UploadPhase {
    /// Returns `true` for absorbing states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadPhase::Done | UploadPhase::Failed | UploadPhase::Cancelled
        )
    }
}

/// State machine for one streaming upload.
///
/// Owned exclusively by the driver for the duration of one upload and
/// destroyed (or left in a terminal state) when the socket closes.
/// `bytes_sent` is monotonically non-decreasing and never exceeds the plan's
/// total.
#[derive(Debug, Clone)]
pub struct UploadSession {
    plan: ChunkPlan,
    bytes_sent: u64,
    chunks_sent: u64,
    phase: UploadPhase,
}

impl UploadSession {
    /// Creates a session in [`UploadPhase::Idle`].
    pub fn new(plan: ChunkPlan) -> Self {
        Self {
            plan,
            bytes_sent: 0,
            chunks_sent: 0,
            phase: UploadPhase::Idle,
        }
    }

    /// Chunk plan this session transmits.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Bytes confirmed as handed to the transport so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Binary frames handed to the transport so far.
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    /// Fraction of the source transmitted, in `[0.0, 1.0]`.
    pub fn progress_fraction(&self) -> f64 {
        self.bytes_sent as f64 / self.plan.total_bytes() as f64
    }

    /// Transition `Idle -> Connecting`.
    ///
    /// # Errors
    /// Returns [`UploadError::IllegalTransition`] from any other phase.
    pub fn begin_connect(&mut self) -> Result<(), UploadError> {
        if self.phase != UploadPhase::Idle {
            return Err(self.illegal("begin_connect"));
        }
        self.phase = UploadPhase::Connecting;
        Ok(())
    }

    /// Transition `Connecting -> Sending`.
    ///
    /// # Errors
    /// Returns [`UploadError::IllegalTransition`] from any other phase.
    pub fn on_connected(&mut self) -> Result<(), UploadError> {
        if self.phase != UploadPhase::Connecting {
            return Err(self.illegal("on_connected"));
        }
        self.phase = UploadPhase::Sending;
        Ok(())
    }

    /// Records one transmitted chunk.
    ///
    /// # Errors
    /// Returns [`UploadError::IllegalTransition`] outside `Sending` and
    /// [`CoreError::ByteOverrun`] when accounting would exceed the declared
    /// total.
    pub fn record_chunk_sent(&mut self, len: u64) -> Result<(), UploadError> {
        if self.phase != UploadPhase::Sending {
            return Err(self.illegal("record_chunk_sent"));
        }

        let sent = self.bytes_sent + len;
        if sent > self.plan.total_bytes() {
            return Err(UploadError::Core(CoreError::ByteOverrun {
                sent,
                total: self.plan.total_bytes(),
            }));
        }

        self.bytes_sent = sent;
        self.chunks_sent += 1;
        Ok(())
    }

    /// Transition `Sending -> AwaitingServer` once the source is exhausted.
    ///
    /// # Errors
    /// Returns [`UploadError::IllegalTransition`] when called early or from
    /// the wrong phase.
    pub fn finish_sending(&mut self) -> Result<(), UploadError> {
        if self.phase != UploadPhase::Sending || self.bytes_sent != self.plan.total_bytes() {
            return Err(self.illegal("finish_sending"));
        }
        self.phase = UploadPhase::AwaitingServer;
        Ok(())
    }

    /// Transition `AwaitingServer -> Done`.
    ///
    /// # Errors
    /// Returns [`UploadError::IllegalTransition`] from any other phase.
    pub fn complete(&mut self) -> Result<(), UploadError> {
        if self.phase != UploadPhase::AwaitingServer {
            return Err(self.illegal("complete"));
        }
        self.phase = UploadPhase::Done;
        Ok(())
    }

    /// Marks the session failed. No-op when already terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = UploadPhase::Failed;
        }
    }

    /// Marks the session cancelled. No-op when already terminal.
    pub fn cancel(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = UploadPhase::Cancelled;
        }
    }

    fn illegal(&self, action: &'static str) -> UploadError {
        UploadError::IllegalTransition(format!("{action} in phase {:?}", self.phase))
    }
}

/// One inbound or outbound socket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Raw binary frame.
    Binary(Vec<u8>),
}

/// Frame-level socket abstraction used by upload and scan drivers.
///
/// Implementations own connection state; drivers own ordering. Test doubles
/// script inbound frames and record outbound ones.
#[async_trait]
pub trait StreamTransport: Send {
    /// Opens the connection.
    async fn connect(&mut self) -> Result<(), StreamError>;

    /// Sends one text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), StreamError>;

    /// Sends one binary frame.
    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), StreamError>;

    /// Receives the next data frame; `None` once the peer closed.
    async fn next_frame(&mut self) -> Result<Option<StreamFrame>, StreamError>;

    /// Closes the connection. Safe to call repeatedly.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// WebSocket transport backed by tokio-tungstenite.
pub struct WsTransport {
    url: Url,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsTransport {
    /// Creates a disconnected transport for `url`.
    pub fn new(url: Url) -> Self {
        Self { url, stream: None }
    }
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn connect(&mut self) -> Result<(), StreamError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|error| StreamError::Connect(error.to_string()))?;
        info!(url = %self.url, "websocket connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        let stream = self.stream.as_mut().ok_or(StreamError::NotConnected)?;
        stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|error| StreamError::Send(error.to_string()))
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), StreamError> {
        let stream = self.stream.as_mut().ok_or(StreamError::NotConnected)?;
        stream
            .send(Message::Binary(bytes))
            .await
            .map_err(|error| StreamError::Send(error.to_string()))
    }

    async fn next_frame(&mut self) -> Result<Option<StreamFrame>, StreamError> {
        let stream = self.stream.as_mut().ok_or(StreamError::NotConnected)?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(StreamFrame::Text(text))),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(StreamFrame::Binary(bytes)));
                }
                // Control frames are transport noise to the drivers.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(error)) => return Err(StreamError::Receive(error.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        Ok(())
    }
}

/// Terminal result of one driven streaming upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Server confirmed the upload and extraction finished.
    Completed,
    /// Caller cancelled before completion.
    Cancelled,
}

/// Streams one source through the chunked upload protocol.
///
/// Protocol order: JSON handshake text frame, then every chunk as one binary
/// frame in strict file order (each slice fully read before its send, the
/// next read only after the send completes), then the `"__END__"` sentinel
/// text frame, then a progress loop until the server reports `done`.
///
/// The cancel channel is observed between every serialized step and inside
/// the progress loop; on cancellation the socket is closed promptly, no
/// further chunk reads happen, and the session ends in
/// [`UploadPhase::Cancelled`].
///
/// # Errors
/// Any socket or source failure is terminal: the session moves to
/// [`UploadPhase::Failed`] and the error is returned. There is no retry or
/// resume on this path.
pub async fn run_chunked_upload<R, T, F>(
    transport: &mut T,
    session: &mut UploadSession,
    source: &mut R,
    handshake: &UploadHandshake,
    cancel: &mut watch::Receiver<bool>,
    on_message: F,
) -> Result<UploadOutcome, UploadError>
where
    R: AsyncRead + Unpin + Send,
    T: StreamTransport + ?Sized,
    F: FnMut(&UploadServerMessage),
{
    match drive_chunked_upload(transport, session, source, handshake, cancel, on_message).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            session.fail();
            let _ = transport.close().await;
            Err(error)
        }
    }
}

async fn drive_chunked_upload<R, T, F>(
    transport: &mut T,
    session: &mut UploadSession,
    source: &mut R,
    handshake: &UploadHandshake,
    cancel: &mut watch::Receiver<bool>,
    mut on_message: F,
) -> Result<UploadOutcome, UploadError>
where
    R: AsyncRead + Unpin + Send,
    T: StreamTransport + ?Sized,
    F: FnMut(&UploadServerMessage),
{
    let plan = *session.plan();

    session.begin_connect()?;
    transport.connect().await?;
    session.on_connected()?;

    transport.send_text(&handshake.to_json()?).await?;
    info!(
        folder = %handshake.folder_name,
        total_bytes = plan.total_bytes(),
        chunks = plan.chunk_count(),
        "upload handshake sent"
    );

    for index in 0..plan.chunk_count() {
        if cancelled(cancel) {
            return finish_cancelled(transport, session).await;
        }

        // Serialized window: the slice is fully in memory before the send,
        // bounding usage to one chunk.
        let Some(len) = plan.chunk_len(index) else {
            break;
        };
        let mut buffer = vec![0_u8; len as usize];
        source.read_exact(&mut buffer).await?;

        transport.send_binary(buffer).await?;
        session.record_chunk_sent(len)?;
        debug!(chunk = index, bytes = len, "chunk transmitted");
    }

    if cancelled(cancel) {
        return finish_cancelled(transport, session).await;
    }

    session.finish_sending()?;
    transport.send_text(END_OF_STREAM_SENTINEL).await?;

    let mut cancel_active = true;
    loop {
        tokio::select! {
            changed = cancel.changed(), if cancel_active => {
                match changed {
                    Ok(()) if *cancel.borrow() => {
                        return finish_cancelled(transport, session).await;
                    }
                    Ok(()) => {}
                    // Sender dropped: cancellation can no longer arrive.
                    Err(_) => cancel_active = false,
                }
            }
            frame = transport.next_frame() => {
                match frame? {
                    None => return Err(UploadError::ConnectionClosed),
                    Some(StreamFrame::Binary(_)) => {}
                    Some(StreamFrame::Text(raw)) => {
                        let message = match parse_upload_message(&raw) {
                            Ok(message) => message,
                            Err(error) => {
                                warn!(%error, "discarding malformed upload progress frame");
                                continue;
                            }
                        };

                        on_message(&message);
                        match message {
                            UploadServerMessage::Failed { error } => {
                                return Err(UploadError::ServerFailure(error));
                            }
                            UploadServerMessage::Progress {
                                status: UploadStatus::Done,
                                ..
                            } => {
                                session.complete()?;
                                transport.close().await?;
                                return Ok(UploadOutcome::Completed);
                            }
                            UploadServerMessage::Progress { .. } => {}
                        }
                    }
                }
            }
        }
    }
}

fn cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

async fn finish_cancelled<T>(
    transport: &mut T,
    session: &mut UploadSession,
) -> Result<UploadOutcome, UploadError>
where
    T: StreamTransport + ?Sized,
{
    session.cancel();
    transport.close().await?;
    info!(
        bytes_sent = session.bytes_sent(),
        "upload cancelled by caller"
    );
    Ok(UploadOutcome::Cancelled)
}

/// Pre-network validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Project name must be non-blank.
    #[error("project name must be non-empty")]
    EmptyProjectName,
    /// Source file has the wrong extension for this surface.
    #[error("file must have a {expected} extension")]
    WrongExtension {
        /// Required extension including the dot.
        expected: &'static str,
    },
    /// Source file is empty.
    #[error("source file is empty")]
    EmptySource,
    /// Source file exceeds the accepted size cap.
    #[error("source file of {size} bytes exceeds the {limit} byte limit")]
    Oversized {
        /// Actual size in bytes.
        size: u64,
        /// Enforced limit in bytes.
        limit: u64,
    },
}

/// Validates inputs for a project (ZIP) upload before any network I/O.
///
/// # Errors
/// Returns the first violated [`ValidationError`].
pub fn validate_project_upload(
    project_name: &str,
    file_name: &str,
    size_bytes: u64,
) -> Result<(), ValidationError> {
    if project_name.trim().is_empty() {
        return Err(ValidationError::EmptyProjectName);
    }
    validate_source(file_name, size_bytes, ".zip")
}

/// Validates inputs for a scan/analysis (PDF) upload before any network I/O.
///
/// # Errors
/// Returns the first violated [`ValidationError`].
pub fn validate_scan_source(file_name: &str, size_bytes: u64) -> Result<(), ValidationError> {
    validate_source(file_name, size_bytes, ".pdf")
}

fn validate_source(
    file_name: &str,
    size_bytes: u64,
    expected: &'static str,
) -> Result<(), ValidationError> {
    if !file_name.to_ascii_lowercase().ends_with(expected) {
        return Err(ValidationError::WrongExtension { expected });
    }
    if size_bytes == 0 {
        return Err(ValidationError::EmptySource);
    }
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(ValidationError::Oversized {
            size: size_bytes,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// Hex-encoded sha256 digest of upload bytes, used as an idempotency key.
pub fn idempotency_key_for_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Retry policy for the REST path.
///
/// `max_retries` bounds total attempts; delays grow exponentially from
/// `base_delay_ms`, capped at `max_delay_ms`, with up to `jitter_ms` of
/// uniform jitter added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed (first try included).
    pub max_retries: u32,
    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum uniform jitter added per delay, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay_ms.saturating_mul(1_u64 << exponent);
        let capped = exponential.min(self.max_delay_ms);

        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            let seed = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.subsec_nanos() as u64);
            StdRng::seed_from_u64(seed).random_range(0..=self.jitter_ms)
        };

        Duration::from_millis(capped.saturating_add(jitter))
    }
}

/// Whether a failure can be retried or must surface immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient; a retry or continued session processing is sensible.
    Recoverable,
    /// Permanent for this session/request; retrying cannot help.
    Fatal,
}

/// Classifies REST failures for the retry loop.
pub fn classify_rest_error(error: &RestError) -> FailureClass {
    match error {
        RestError::Transport(_) | RestError::Server { .. } => FailureClass::Recoverable,
        RestError::Client { .. } | RestError::Contract(_) | RestError::Validation(_) => {
            FailureClass::Fatal
        }
    }
}

/// Classifies streaming upload failures.
///
/// Malformed inbound frames are recoverable (the session keeps processing);
/// every other failure on the streaming path is terminal for the session.
pub fn classify_upload_error(error: &UploadError) -> FailureClass {
    match error {
        UploadError::Contract(_) => FailureClass::Recoverable,
        _ => FailureClass::Fatal,
    }
}

/// Raw response handed back by a REST transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw UTF-8 body.
    pub body: String,
}

/// Multipart project upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectUploadRequest {
    /// Project name form field.
    pub project_name: String,
    /// Original archive file name.
    pub file_name: String,
    /// Archive bytes.
    pub bytes: Vec<u8>,
    /// Content digest attached as an idempotency key.
    pub idempotency_key: String,
}

/// Multipart document analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUploadRequest {
    /// Original document file name.
    pub file_name: String,
    /// Document bytes.
    pub bytes: Vec<u8>,
}

/// Abstract transport used by the REST client.
#[async_trait]
pub trait RestTransport: Send + Sync {
    /// Posts one project upload.
    async fn post_project(
        &self,
        endpoint: &str,
        token: &str,
        request: &ProjectUploadRequest,
    ) -> Result<RestResponse, RestError>;

    /// Posts one document for one-shot analysis.
    async fn post_analyze(
        &self,
        endpoint: &str,
        token: &str,
        request: &DocumentUploadRequest,
    ) -> Result<RestResponse, RestError>;
}

/// HTTP transport implementation backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpRestTransport {
    http: reqwest::Client,
}

impl HttpRestTransport {
    /// Creates a transport over a fresh HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    async fn execute(
        &self,
        endpoint: &str,
        token: &str,
        form: reqwest::multipart::Form,
        idempotency_key: Option<&str>,
    ) -> Result<RestResponse, RestError> {
        let mut request = self.http.post(endpoint).bearer_auth(token).multipart(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| RestError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| RestError::Transport(error.to_string()))?;

        Ok(RestResponse { status, body })
    }
}

#[async_trait]
impl RestTransport for HttpRestTransport {
    async fn post_project(
        &self,
        endpoint: &str,
        token: &str,
        request: &ProjectUploadRequest,
    ) -> Result<RestResponse, RestError> {
        let form = reqwest::multipart::Form::new()
            .part(
                "zip_file",
                reqwest::multipart::Part::bytes(request.bytes.clone())
                    .file_name(request.file_name.clone()),
            )
            .text("project_name", request.project_name.clone());

        self.execute(endpoint, token, form, Some(&request.idempotency_key))
            .await
    }

    async fn post_analyze(
        &self,
        endpoint: &str,
        token: &str,
        request: &DocumentUploadRequest,
    ) -> Result<RestResponse, RestError> {
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(request.bytes.clone())
                .file_name(request.file_name.clone()),
        );

        self.execute(endpoint, token, form, None).await
    }
}

/// Report of one successful project upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
    /// Parsed success payload.
    pub project: ProjectCreated,
}

/// Report of one successful document analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeReport {
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
    /// Parsed analysis payload.
    pub response: AnalyzeResponse,
}

enum RestRequest<'a> {
    Project(&'a ProjectUploadRequest),
    Analyze(&'a DocumentUploadRequest),
}

/// REST client for project creation and one-shot analysis.
#[derive(Clone)]
pub struct RestApiClient {
    project_endpoint: String,
    analyze_endpoint: String,
    retry: RetryPolicy,
    transport: Arc<dyn RestTransport>,
}

impl RestApiClient {
    /// Creates a validated REST client.
    ///
    /// # Errors
    /// Returns [`RestError::Validation`] when an endpoint is unparseable or
    /// uses plaintext HTTP on a non-loopback host.
    pub fn new(
        project_endpoint: impl Into<String>,
        analyze_endpoint: impl Into<String>,
        retry: RetryPolicy,
        transport: Arc<dyn RestTransport>,
    ) -> Result<Self, RestError> {
        let project_endpoint = project_endpoint.into();
        let analyze_endpoint = analyze_endpoint.into();
        validate_rest_endpoint(&project_endpoint)?;
        validate_rest_endpoint(&analyze_endpoint)?;

        Ok(Self {
            project_endpoint,
            analyze_endpoint,
            retry,
            transport,
        })
    }

    /// Uploads one project archive with retry on recoverable failures.
    ///
    /// # Errors
    /// Returns the final error once attempts are exhausted, or immediately
    /// for [`FailureClass::Fatal`] failures.
    pub async fn upload_project(
        &self,
        project_name: &str,
        file_name: &str,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<UploadReport, RestError> {
        validate_project_upload(project_name, file_name, bytes.len() as u64)?;

        let request = ProjectUploadRequest {
            project_name: project_name.to_string(),
            file_name: file_name.to_string(),
            idempotency_key: idempotency_key_for_bytes(&bytes),
            bytes,
        };

        let (attempts, response) = self
            .post_with_retry(RestRequest::Project(&request), token)
            .await?;
        let project = parse_project_created(&response.body)?;

        Ok(UploadReport { attempts, project })
    }

    /// Submits one document for one-shot analysis with retry.
    ///
    /// # Errors
    /// Returns the final error once attempts are exhausted, or immediately
    /// for [`FailureClass::Fatal`] failures.
    pub async fn analyze_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<AnalyzeReport, RestError> {
        validate_scan_source(file_name, bytes.len() as u64)?;

        let request = DocumentUploadRequest {
            file_name: file_name.to_string(),
            bytes,
        };

        let (attempts, response) = self
            .post_with_retry(RestRequest::Analyze(&request), token)
            .await?;
        let parsed = parse_analyze_response(&response.body)?;

        Ok(AnalyzeReport {
            attempts,
            response: parsed,
        })
    }

    async fn post_with_retry(
        &self,
        request: RestRequest<'_>,
        token: &str,
    ) -> Result<(u32, RestResponse), RestError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = match &request {
                RestRequest::Project(project) => {
                    self.transport
                        .post_project(&self.project_endpoint, token, project)
                        .await
                }
                RestRequest::Analyze(document) => {
                    self.transport
                        .post_analyze(&self.analyze_endpoint, token, document)
                        .await
                }
            };

            let error = match result {
                Ok(response) if (200..300).contains(&response.status) => {
                    return Ok((attempt, response));
                }
                Ok(response) => status_error(&response),
                Err(error) => error,
            };

            if classify_rest_error(&error) == FailureClass::Fatal
                || attempt >= self.retry.max_retries
            {
                return Err(error);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(attempt, ?delay, %error, "retrying recoverable REST failure");
            tokio::time::sleep(delay).await;
        }
    }
}

fn status_error(response: &RestResponse) -> RestError {
    let message = parse_api_failure(&response.body).message().to_string();
    if response.status >= 500 {
        RestError::Server {
            status: response.status,
            message,
        }
    } else {
        RestError::Client {
            status: response.status,
            message,
        }
    }
}

fn validate_rest_endpoint(endpoint: &str) -> Result<(), RestError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| RestError::Validation(format!("invalid endpoint url: {error}")))?;

    let loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "::1"));
    if parsed.scheme() != "https" && !loopback {
        return Err(RestError::Validation(
            "plaintext http is only allowed for loopback hosts".to_string(),
        ));
    }

    Ok(())
}

/// Errors produced by the streaming upload path.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Session state machine was driven out of order.
    #[error("illegal session transition: {0}")]
    IllegalTransition(String),
    /// Core validation failure (chunk accounting, page numbers).
    #[error("core validation failure: {0}")]
    Core(#[from] CoreError),
    /// Socket-level failure; terminal for the session.
    #[error("stream transport failure: {0}")]
    Stream(#[from] StreamError),
    /// Local source read failure.
    #[error("source read failure: {0}")]
    Source(#[from] std::io::Error),
    /// Inbound frame violated the wire contract.
    #[error("wire contract failure: {0}")]
    Contract(#[from] ContractError),
    /// Server reported a terminal failure for the session.
    #[error("server reported upload failure: {0}")]
    ServerFailure(String),
    /// Peer closed the socket before reporting completion.
    #[error("socket closed before completion")]
    ConnectionClosed,
    /// Input rejected before any network I/O.
    #[error("validation failure: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors produced by stream transports.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connection could not be established.
    #[error("connect failure: {0}")]
    Connect(String),
    /// A frame could not be transmitted.
    #[error("send failure: {0}")]
    Send(String),
    /// A frame could not be received.
    #[error("receive failure: {0}")]
    Receive(String),
    /// Operation attempted before `connect`.
    #[error("transport is not connected")]
    NotConnected,
}

/// Errors produced by the REST path.
#[derive(Debug, Error)]
pub enum RestError {
    /// Network-level failure before a status code was received.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Server-side failure (5xx).
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Failure description from the response body.
        message: String,
    },
    /// Request rejected by the server (4xx).
    #[error("client error {status}: {message}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Failure description from the response body.
        message: String,
    },
    /// Response body violated the wire contract.
    #[error("invalid response body: {0}")]
    Contract(#[from] ContractError),
    /// Input rejected before any network I/O.
    #[error("validation failure: {0}")]
    Validation(String),
}

impl From<ValidationError> for RestError {
    fn from(error: ValidationError) -> Self {
        RestError::Validation(error.to_string())
    }
}
