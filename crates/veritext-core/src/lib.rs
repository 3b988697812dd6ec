#![warn(missing_docs)]
//! # veritext-core
//!
//! ## Purpose
//! Defines the pure data model used across the `veritext` workspace.
//!
//! ## Responsibilities
//! - Represent classification labels and per-chunk classification events.
//! - Buffer classified text per page in arrival order.
//! - Compute validated fixed-size chunk plans for streaming uploads.
//!
//! ## Data flow
//! Wire decoding emits [`ClassificationEvent`] values that aggregation code
//! folds into histograms and appends into [`PageBuffer`]. Upload code derives
//! a [`ChunkPlan`] from file size before any byte leaves the machine.
//!
//! ## Ownership and lifetimes
//! Events and page entries own their text (`String`) to avoid hidden
//! borrow/lifetime coupling between socket callbacks and view state.
//!
//! ## Error model
//! Validation failures (empty file, zero chunk size, page number zero) return
//! [`CoreError`] variants with caller-actionable categorization.
//!
//! ## Security and privacy notes
//! This crate never logs document text or session tokens. Buffered text stays
//! in memory for the lifetime of one scan session only.
//!
//! ## Example
//! ```rust
//! use veritext_core::{ChunkPlan, DEFAULT_CHUNK_SIZE};
//!
//! let plan = ChunkPlan::new(3 * DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE).unwrap();
//! assert_eq!(plan.chunk_count(), 3);
//! ```

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upload chunk size: one mebibyte.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum accepted upload size enforced before any network I/O.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Content-origin classification category.
///
/// Wire messages carry the numeric index; see `veritext-contract` for the
/// index mapping. The set is fixed and small; servers may introduce indices
/// outside it, which callers must treat as unknown and drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Fully machine-generated text.
    Ai,
    /// Machine-generated text post-edited to read human.
    Humanised,
    /// Human-written text.
    Human,
    /// Human-written text polished by a machine.
    Polished,
    /// Classifier could not decide.
    Undetermined,
    /// Reserved category used by the extended analysis endpoint.
    NewCategory,
}

impl Label {
    /// All labels in wire-index order.
    pub const ALL: [Label; 6] = [
        Label::Ai,
        Label::Humanised,
        Label::Human,
        Label::Polished,
        Label::Undetermined,
        Label::NewCategory,
    ];

    /// Number of known categories.
    pub const COUNT: usize = Self::ALL.len();

    /// Maps a wire category index to a label.
    ///
    /// Returns `None` for indices outside the known set; callers drop such
    /// events rather than erroring.
    pub fn from_index(index: u32) -> Option<Label> {
        match index {
            0 => Some(Label::Ai),
            1 => Some(Label::Humanised),
            2 => Some(Label::Human),
            3 => Some(Label::Polished),
            4 => Some(Label::Undetermined),
            5 => Some(Label::NewCategory),
            _ => None,
        }
    }

    /// Returns the wire category index for this label.
    pub fn index(&self) -> u32 {
        match self {
            Label::Ai => 0,
            Label::Humanised => 1,
            Label::Human => 2,
            Label::Polished => 3,
            Label::Undetermined => 4,
            Label::NewCategory => 5,
        }
    }

    /// Human-readable legend name.
    pub fn name(&self) -> &'static str {
        match self {
            Label::Ai => "AI",
            Label::Humanised => "Humanised",
            Label::Human => "Human",
            Label::Polished => "Polished",
            Label::Undetermined => "Undetermined",
            Label::NewCategory => "New Category",
        }
    }
}

/// One classified text chunk pushed by the scan service.
///
/// Transient: consumed once by aggregation, then retained only inside the
/// page buffer copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    /// One-based page number the chunk belongs to.
    pub page: u32,
    /// Zero-based chunk index within the page.
    pub chunk_index: u32,
    /// Classified text slice.
    pub text: String,
    /// Resolved classification category.
    pub label: Label,
}

impl ClassificationEvent {
    /// Constructs a validated event.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPageNumber`] when `page == 0`.
    pub fn new(
        page: u32,
        chunk_index: u32,
        text: impl Into<String>,
        label: Label,
    ) -> Result<Self, CoreError> {
        if page == 0 {
            return Err(CoreError::InvalidPageNumber);
        }

        Ok(Self {
            page,
            chunk_index,
            text: text.into(),
            label,
        })
    }

    /// Histogram weight of this event: the Unicode scalar count of its text.
    pub fn weight(&self) -> u64 {
        self.text.chars().count() as u64
    }
}

/// One buffered `(text, label)` pair inside a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    /// Classified text slice.
    pub text: String,
    /// Classification category.
    pub label: Label,
}

/// Ordered mapping from page number to arrival-ordered classified entries.
///
/// Grows monotonically during one scan session; [`PageBuffer::clear`] resets
/// it when a new scan starts. Insertion order within a page reflects arrival
/// order, which the protocol does not guarantee to match document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageBuffer {
    pages: BTreeMap<u32, Vec<PageEntry>>,
    max_page: u32,
}

impl PageBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry to a page bucket, creating the bucket on first
    /// sight and extending the observed maximum page.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPageNumber`] when `page == 0`.
    pub fn push(&mut self, page: u32, entry: PageEntry) -> Result<(), CoreError> {
        if page == 0 {
            return Err(CoreError::InvalidPageNumber);
        }

        self.pages.entry(page).or_default().push(entry);
        self.max_page = self.max_page.max(page);
        Ok(())
    }

    /// Returns the entries buffered for `page`, empty if none arrived yet.
    pub fn entries(&self, page: u32) -> &[PageEntry] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest page number observed so far (0 before any event).
    pub fn max_page(&self) -> u32 {
        self.max_page
    }

    /// Number of pages that have at least one buffered entry.
    pub fn populated_page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns `true` when no entries are buffered.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Iterates `(page, entries)` in ascending page order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[PageEntry])> {
        self.pages
            .iter()
            .map(|(page, entries)| (*page, entries.as_slice()))
    }

    /// Drops all buffered pages for a fresh scan session.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.max_page = 0;
    }
}

/// Validated fixed-size chunking of one upload source.
///
/// The plan is pure arithmetic over `(total_bytes, chunk_size)`; reading and
/// transmitting the byte windows is transport code's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_bytes: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Creates a validated chunk plan.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyFile`] when `total_bytes == 0` and
    /// [`CoreError::InvalidChunkSize`] when `chunk_size == 0`.
    pub fn new(total_bytes: u64, chunk_size: u64) -> Result<Self, CoreError> {
        if total_bytes == 0 {
            return Err(CoreError::EmptyFile);
        }
        if chunk_size == 0 {
            return Err(CoreError::InvalidChunkSize);
        }

        Ok(Self {
            total_bytes,
            chunk_size,
        })
    }

    /// Total source size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Configured chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks, counting the trailing remainder chunk.
    pub fn chunk_count(&self) -> u64 {
        self.total_bytes.div_ceil(self.chunk_size)
    }

    /// Byte range of chunk `index`, or `None` past the end of the source.
    pub fn byte_range(&self, index: u64) -> Option<Range<u64>> {
        if index >= self.chunk_count() {
            return None;
        }

        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_bytes);
        Some(start..end)
    }

    /// Length in bytes of chunk `index`, or `None` past the end.
    pub fn chunk_len(&self, index: u64) -> Option<u64> {
        self.byte_range(index).map(|range| range.end - range.start)
    }
}

/// Error type for core model validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Upload sources must contain at least one byte.
    #[error("upload source is empty")]
    EmptyFile,
    /// Chunk size must be strictly positive.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Page numbers are one-based.
    #[error("page number must be at least 1")]
    InvalidPageNumber,
    /// Byte accounting exceeded the declared source size.
    #[error("sent byte count {sent} exceeds declared total {total}")]
    ByteOverrun {
        /// Bytes recorded as sent.
        sent: u64,
        /// Declared total source size.
        total: u64,
    },
}
