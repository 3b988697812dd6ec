#![warn(missing_docs)]
//! # veritext-view
//!
//! ## Purpose
//! Defines the view-model layer for `veritext`: progress tracking and result
//! pagination for one scan/upload session.
//!
//! ## Responsibilities
//! - Track session progress through an explicit phase machine.
//! - Clamp and monotonize displayed percentages.
//! - Expose a bounded pagination cursor over received pages.
//!
//! ## Data flow
//! Orchestration events mutate [`ViewState`], which drives rendered status in
//! the CLI shell.
//!
//! ## Ownership and lifetimes
//! `ViewState` owns all string/status values to simplify event reducers and
//! keep socket callbacks free of borrows into view memory.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. The only
//! fallible operation is an out-of-range page jump, which reports
//! [`ViewError::PageOutOfRange`] and leaves the cursor unchanged.
//!
//! ## Security and privacy notes
//! View state intentionally excludes secrets (emails, tokens, raw bytes).

use thiserror::Error;

/// Lifecycle phase of one tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// No session started.
    Idle,
    /// Socket connection in progress.
    Connecting,
    /// Session is streaming or processing.
    Active,
    /// Session finished successfully; percent forced to 100.
    Done,
    /// Session failed; percent frozen at last known value.
    Failed,
    /// Session cancelled by the caller; percent frozen.
    Cancelled,
}

impl ScanPhase {
    /// Returns `true` for absorbing states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanPhase::Done | ScanPhase::Failed | ScanPhase::Cancelled
        )
    }
}

/// Progress state machine for one session.
///
/// Percentages are clamped to `[0, 100]` and never regress while the session
/// is active. Events arriving after a terminal phase are ignored, which
/// tolerates progress frames that trail a completion message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressTracker {
    phase: ScanPhase,
    stage_label: String,
    percent: f64,
    expected_units: Option<u32>,
    completed_units: u32,
}

impl ProgressTracker {
    /// Creates an idle tracker.
    pub fn new() -> Self {
        Self {
            phase: ScanPhase::Idle,
            stage_label: String::new(),
            percent: 0.0,
            expected_units: None,
            completed_units: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Last displayed percentage in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Label of the currently running stage.
    pub fn stage_label(&self) -> &str {
        &self.stage_label
    }

    /// Marks the session as connecting.
    pub fn on_connecting(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = ScanPhase::Connecting;
    }

    /// Applies a server-reported percentage for a named stage.
    pub fn on_reported_percent(&mut self, stage_label: &str, percent: f64) {
        if self.phase.is_terminal() {
            return;
        }

        self.phase = ScanPhase::Active;
        self.stage_label = stage_label.to_string();
        // Displayed progress never moves backwards within a session.
        self.percent = self.percent.max(percent.clamp(0.0, 100.0));
    }

    /// Records the expected unit count (for example a page-count hint).
    pub fn set_expected_units(&mut self, expected: u32) {
        if self.phase.is_terminal() {
            return;
        }
        self.expected_units = Some(expected.max(1));
        self.apply_synthetic();
    }

    /// Records one completed unit and refreshes the synthetic percentage.
    ///
    /// Without an expected-unit hint the percentage is left unchanged; the
    /// terminal `Done` transition still forces 100.
    pub fn on_unit_completed(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = ScanPhase::Active;
        self.completed_units += 1;
        self.apply_synthetic();
    }

    /// Terminal success; percent forced to 100.
    pub fn on_done(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = ScanPhase::Done;
        self.percent = 100.0;
    }

    /// Terminal failure; percent frozen at the last known value.
    pub fn on_failed(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = ScanPhase::Failed;
    }

    /// Terminal cancellation; percent frozen.
    pub fn on_cancelled(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = ScanPhase::Cancelled;
    }

    fn apply_synthetic(&mut self) {
        let Some(expected) = self.expected_units else {
            return;
        };

        let synthetic = self.completed_units as f64 / expected as f64 * 100.0;
        self.percent = self.percent.max(synthetic.clamp(0.0, 100.0));
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded cursor over received result pages.
///
/// `total_pages` grows as new page numbers are observed mid-session and
/// never decreases within a session. The invariant
/// `1 <= current_page <= total_pages` holds whenever `total_pages > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    current_page: u32,
    total_pages: u32,
}

impl PaginationCursor {
    /// Creates a cursor with no pages observed yet.
    pub fn new() -> Self {
        Self {
            current_page: 1,
            total_pages: 0,
        }
    }

    /// Currently selected page (one-based).
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Highest page count observed so far.
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Grows the page range; never shrinks it.
    pub fn observe_page(&mut self, page: u32) {
        self.total_pages = self.total_pages.max(page);
    }

    /// Advances one page, clamped at the end.
    pub fn next(&mut self) {
        if self.total_pages > 0 {
            self.current_page = (self.current_page + 1).min(self.total_pages);
        }
    }

    /// Goes back one page, clamped at the start.
    pub fn previous(&mut self) {
        self.current_page = self.current_page.saturating_sub(1).max(1);
    }

    /// Jumps to page `n`.
    ///
    /// # Errors
    /// Returns [`ViewError::PageOutOfRange`] and leaves the cursor unchanged
    /// when `n` is outside `[1, total_pages]`.
    pub fn jump_to(&mut self, page: u32) -> Result<(), ViewError> {
        if page == 0 || page > self.total_pages {
            return Err(ViewError::PageOutOfRange {
                requested: page,
                total_pages: self.total_pages,
            });
        }

        self.current_page = page;
        Ok(())
    }

    /// Resets for a fresh session.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate view-model state for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Session progress machine.
    pub progress: ProgressTracker,
    /// Result page cursor.
    pub cursor: PaginationCursor,
    /// Human-readable status line.
    pub status_line: String,
    /// Non-fatal per-chunk failures reported by the server.
    pub chunk_failures: u64,
    /// Inbound frames that could not be parsed.
    pub malformed_frames: u64,
}

impl ViewState {
    /// Creates default view state.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            progress: ProgressTracker::new(),
            cursor: PaginationCursor::new(),
            status_line: "No scan yet".to_string(),
            chunk_failures: 0,
            malformed_frames: 0,
        }
    }

    /// Replaces the status line.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status_line = status.into();
    }

    /// Records one non-fatal per-chunk failure; the session continues.
    pub fn record_chunk_failure(&mut self, page: u32, chunk: u32, error: &str) {
        self.chunk_failures += 1;
        self.status_line = format!("Error on page {page}, chunk {chunk}: {error}");
    }

    /// Records one unparseable inbound frame; the session continues.
    pub fn record_malformed_frame(&mut self) {
        self.malformed_frames += 1;
        self.status_line = "Error receiving data from server".to_string();
    }

    /// Resets all per-session state, keeping the version.
    pub fn reset_for_new_session(&mut self) {
        self.progress = ProgressTracker::new();
        self.cursor.reset();
        self.status_line = "No scan yet".to_string();
        self.chunk_failures = 0;
        self.malformed_frames = 0;
    }
}

/// View-model errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    /// Jump target was outside the valid page range.
    #[error("page {requested} is outside the valid range 1..={total_pages}")]
    PageOutOfRange {
        /// Requested page number.
        requested: u32,
        /// Current page range upper bound.
        total_pages: u32,
    },
}
