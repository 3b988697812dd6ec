#![warn(missing_docs)]
//! # veritext-contract
//!
//! ## Purpose
//! Defines the wire contract between the client and the detection service:
//! WebSocket handshake/messages for the upload and scan paths, REST payload
//! shapes, and the category-index mapping.
//!
//! ## Responsibilities
//! - Encode the upload handshake and end-of-stream sentinel.
//! - Parse server progress messages on the upload socket.
//! - Parse the five scan-socket message shapes by field dispatch.
//! - Map wire category indices onto [`veritext_core::Label`].
//!
//! ## Data flow
//! Raw socket text frames -> [`parse_upload_message`] / [`parse_scan_frame`]
//! -> typed messages consumed by aggregation and view-model code.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned structs to avoid borrowing from transient network
//! buffers.
//!
//! ## Error model
//! Invalid JSON or missing mandatory fields return [`ContractError`]. Unknown
//! category indices are not an error here; resolution returns `None` and the
//! drop policy lives in aggregation.
//!
//! ## Security and privacy notes
//! This crate processes only document text and classifier output; it never
//! sees credentials or tokens.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use veritext_core::{ClassificationEvent, CoreError, Label};

/// Text frame that terminates the binary chunk sequence on the upload socket.
pub const END_OF_STREAM_SENTINEL: &str = "__END__";

/// Client -> server upload handshake, sent once per session as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadHandshake {
    /// Logical target name on the server (project/folder).
    #[serde(rename = "folderName")]
    pub folder_name: String,
    /// Declared source size in bytes.
    #[serde(rename = "fileSize")]
    pub file_size: u64,
}

impl UploadHandshake {
    /// Serializes the handshake to its wire JSON form.
    ///
    /// # Errors
    /// Returns [`ContractError::Decode`] when JSON encoding fails.
    pub fn to_json(&self) -> Result<String, ContractError> {
        serde_json::to_string(self).map_err(ContractError::Decode)
    }
}

/// Server-reported phase of one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Chunk bytes are being received.
    Uploading,
    /// Archive extraction is in progress.
    Extracting,
    /// Upload and extraction finished.
    Done,
}

/// Server -> client message on the upload socket.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadServerMessage {
    /// Progress report with a 0-100 percentage.
    Progress {
        /// Current phase.
        status: UploadStatus,
        /// Percentage in `[0, 100]` (clamped by the view layer).
        progress: f64,
    },
    /// Terminal server-side failure for the session.
    Failed {
        /// Server-provided failure description.
        error: String,
    },
}

#[derive(Deserialize)]
struct RawUploadMessage {
    status: Option<String>,
    progress: Option<f64>,
    error: Option<String>,
}

/// Parses one upload-socket text frame.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON and
/// [`ContractError::InvalidContract`] for JSON that matches no known shape.
pub fn parse_upload_message(raw: &str) -> Result<UploadServerMessage, ContractError> {
    let parsed: RawUploadMessage = serde_json::from_str(raw).map_err(ContractError::Decode)?;

    if let Some(error) = parsed.error {
        return Ok(UploadServerMessage::Failed { error });
    }

    let status = match parsed.status.as_deref() {
        Some("uploading") => UploadStatus::Uploading,
        Some("extracting") => UploadStatus::Extracting,
        Some("done") => UploadStatus::Done,
        Some(other) => {
            return Err(ContractError::InvalidContract(format!(
                "unknown upload status '{other}'"
            )));
        }
        None => {
            return Err(ContractError::InvalidContract(
                "upload message carries neither status nor error".to_string(),
            ));
        }
    };

    Ok(UploadServerMessage::Progress {
        status,
        progress: parsed.progress.unwrap_or(0.0),
    })
}

/// Classification payload attached to one scan-socket chunk message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireClassificationData {
    /// Text the classifier received.
    pub input: String,
    /// Wire category index.
    pub result: u32,
}

/// One classified chunk as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireClassification {
    /// One-based page number.
    pub page: u32,
    /// One-based chunk number within the page as sent by the server.
    pub chunk: u32,
    /// Classified text slice.
    pub text: String,
    /// Classifier verdict.
    pub data: WireClassificationData,
}

impl WireClassification {
    /// Resolves the wire category index into a typed event.
    ///
    /// Returns `Ok(None)` for unknown indices so callers can apply the
    /// drop-and-continue policy.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPageNumber`] when the page number is 0.
    pub fn resolve(&self) -> Result<Option<ClassificationEvent>, CoreError> {
        let Some(label) = Label::from_index(self.data.result) else {
            return Ok(None);
        };

        // Server chunk numbering is one-based; events are zero-based.
        let chunk_index = self.chunk.saturating_sub(1);
        ClassificationEvent::new(self.page, chunk_index, self.text.clone(), label).map(Some)
    }
}

/// Server -> client message on the scan socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanServerMessage {
    /// One-time page-count hint sent after PDF decoding.
    PageCountHint {
        /// Total pages in the document.
        total_pages: u32,
    },
    /// One classified chunk.
    Classification(WireClassification),
    /// Non-fatal per-chunk classification failure.
    ChunkFailed {
        /// One-based page number.
        page: u32,
        /// One-based chunk number.
        chunk: u32,
        /// Server-provided failure description.
        error: String,
    },
    /// All chunks of one page have been processed.
    PageCompleted {
        /// One-based page number.
        page: u32,
    },
    /// Whole document finished.
    DocumentDone,
}

/// Outcome of classifying one scan-socket text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanFrame {
    /// Plain-text greeting sent before the first JSON message.
    Greeting(String),
    /// A parsed protocol message.
    Message(ScanServerMessage),
}

#[derive(Deserialize)]
struct RawScanMessage {
    #[serde(rename = "total pages")]
    total_pages: Option<u32>,
    status: Option<String>,
    page: Option<u32>,
    chunk: Option<u32>,
    text: Option<String>,
    data: Option<WireClassificationData>,
    error: Option<String>,
}

/// Parses one scan-socket text frame.
///
/// The scan server greets with a plain text line before its first JSON
/// message; while `greeting_allowed` is set, non-JSON frames are returned as
/// [`ScanFrame::Greeting`] instead of an error.
///
/// # Errors
/// Returns [`ContractError::Decode`] for non-JSON frames once greetings are
/// no longer allowed, and [`ContractError::InvalidContract`] for JSON that
/// matches no known shape.
pub fn parse_scan_frame(raw: &str, greeting_allowed: bool) -> Result<ScanFrame, ContractError> {
    let parsed: RawScanMessage = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            if greeting_allowed {
                return Ok(ScanFrame::Greeting(raw.to_string()));
            }
            return Err(ContractError::Decode(error));
        }
    };

    if let Some(total_pages) = parsed.total_pages {
        return Ok(ScanFrame::Message(ScanServerMessage::PageCountHint {
            total_pages,
        }));
    }

    if let Some(error) = parsed.error {
        let (Some(page), Some(chunk)) = (parsed.page, parsed.chunk) else {
            return Err(ContractError::InvalidContract(
                "chunk error message is missing page or chunk".to_string(),
            ));
        };
        return Ok(ScanFrame::Message(ScanServerMessage::ChunkFailed {
            page,
            chunk,
            error,
        }));
    }

    if let Some(data) = parsed.data {
        let (Some(page), Some(chunk), Some(text)) = (parsed.page, parsed.chunk, parsed.text)
        else {
            return Err(ContractError::InvalidContract(
                "classification message is missing page, chunk, or text".to_string(),
            ));
        };
        return Ok(ScanFrame::Message(ScanServerMessage::Classification(
            WireClassification {
                page,
                chunk,
                text,
                data,
            },
        )));
    }

    match parsed.status.as_deref() {
        Some("done") => Ok(ScanFrame::Message(ScanServerMessage::DocumentDone)),
        Some("completed") => {
            let Some(page) = parsed.page else {
                return Err(ContractError::InvalidContract(
                    "page completion message is missing page".to_string(),
                ));
            };
            Ok(ScanFrame::Message(ScanServerMessage::PageCompleted { page }))
        }
        Some(other) => Err(ContractError::InvalidContract(format!(
            "unknown scan status '{other}'"
        ))),
        None => Err(ContractError::InvalidContract(
            "scan message matches no known shape".to_string(),
        )),
    }
}

/// REST response for a successfully created project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCreated {
    /// Human-readable confirmation.
    #[serde(default)]
    pub message: String,
    /// Echoed project name.
    pub project_name: String,
    /// Extracted size in bytes.
    #[serde(default)]
    pub extracted_size_bytes: u64,
    /// Extracted size as a formatted megabyte string.
    pub extracted_size_mb: String,
}

/// REST failure payload; servers use either `detail` or `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiFailure {
    /// FastAPI-style failure detail.
    #[serde(default)]
    pub detail: Option<String>,
    /// Alternate failure field.
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiFailure {
    /// Best-effort human-readable failure message.
    pub fn message(&self) -> &str {
        self.detail
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("unknown server error")
    }
}

/// REST response of the one-shot analysis endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// Base64-encoded highlighted PDF returned by the server.
    pub pdf_bytes: String,
    /// `(text, category index)` pairs for the whole document.
    pub data: Vec<(String, u32)>,
}

/// Parses the project-creation success payload.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON and
/// [`ContractError::InvalidContract`] when the echoed project name is blank.
pub fn parse_project_created(raw: &str) -> Result<ProjectCreated, ContractError> {
    let parsed: ProjectCreated = serde_json::from_str(raw).map_err(ContractError::Decode)?;

    if parsed.project_name.trim().is_empty() {
        return Err(ContractError::InvalidContract(
            "project_name is empty".to_string(),
        ));
    }

    Ok(parsed)
}

/// Parses a REST failure body, tolerating unknown shapes.
pub fn parse_api_failure(raw: &str) -> ApiFailure {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Parses the one-shot analysis response.
///
/// # Errors
/// Returns [`ContractError::Decode`] for invalid JSON.
pub fn parse_analyze_response(raw: &str) -> Result<AnalyzeResponse, ContractError> {
    serde_json::from_str(raw).map_err(ContractError::Decode)
}

/// Wire contract errors.
#[derive(Debug, Error)]
pub enum ContractError {
    /// JSON decode failure.
    #[error("wire decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Parsed payload violates contract invariants.
    #[error("wire contract violation: {0}")]
    InvalidContract(String),
}
