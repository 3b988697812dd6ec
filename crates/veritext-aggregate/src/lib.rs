#![warn(missing_docs)]
//! # veritext-aggregate
//!
//! ## Purpose
//! Folds streamed classification events into deterministic weighted
//! statistics for one scan session.
//!
//! ## Responsibilities
//! - Accumulate a per-category histogram weighted by text length.
//! - Buffer classified text per page in arrival order.
//! - Compute one-decimal legend percentages that never divide by zero.
//!
//! ## Data flow
//! Decoded wire events -> [`ScanAggregator::apply_classified`] ->
//! histogram + page buffer consumed by view-model rendering.
//!
//! ## Ownership and lifetimes
//! The aggregator owns all accumulated state, enabling callers to inspect a
//! consistent snapshot at any point, including after cancellation.
//!
//! ## Error model
//! Only structural violations (page zero) error. Unknown category indices
//! are a policy outcome, not an error: they are dropped and reported via
//! [`ApplyOutcome::UnknownLabel`].
//!
//! ## Security and privacy notes
//! Aggregation mutates no content; buffered text lives only as long as the
//! session.

use veritext_core::{ClassificationEvent, CoreError, Label, PageBuffer, PageEntry};

/// Weighted per-category histogram.
///
/// Each event contributes its text length (not a count of 1) to its
/// category's bucket. The `total` always equals the sum of all buckets; both
/// are updated together per event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationHistogram {
    weights: [u64; Label::COUNT],
    total: u64,
}

impl ClassificationHistogram {
    /// Creates an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `weight` to `label`'s bucket and to the running total.
    pub fn record(&mut self, label: Label, weight: u64) {
        self.weights[label.index() as usize] += weight;
        self.total += weight;
    }

    /// Accumulated weight for one label.
    pub fn weight(&self, label: Label) -> u64 {
        self.weights[label.index() as usize]
    }

    /// Sum of all per-label weights.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Percentage share of one label, rounded to one decimal place.
    ///
    /// Defined as `0.0` when the total weight is zero, never `NaN`.
    pub fn percentage(&self, label: Label) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        let raw = self.weight(label) as f64 / self.total as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }

    /// Resets all buckets for a fresh session.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One rendered legend row.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    /// Classification category.
    pub label: Label,
    /// Accumulated weight for the category.
    pub weight: u64,
    /// One-decimal percentage share.
    pub percentage: f64,
}

/// Outcome of applying one wire-level classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event was counted and buffered.
    Recorded,
    /// Category index was outside the known set; event was dropped.
    UnknownLabel,
}

/// Session-scoped aggregation of classification events.
///
/// Histogram folding is commutative and associative, so delivery order does
/// not affect final statistics; only within-page display order follows
/// arrival order.
#[derive(Debug, Clone, Default)]
pub struct ScanAggregator {
    histogram: ClassificationHistogram,
    pages: PageBuffer,
    dropped_unknown: u64,
}

impl ScanAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one wire-level classification identified by category index.
    ///
    /// Unknown indices are silently dropped per contract policy: nothing is
    /// counted, nothing is buffered, and subsequent events keep processing.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPageNumber`] when `page == 0`.
    pub fn apply_classified(
        &mut self,
        page: u32,
        chunk_index: u32,
        text: &str,
        category_index: u32,
    ) -> Result<ApplyOutcome, CoreError> {
        let Some(label) = Label::from_index(category_index) else {
            self.dropped_unknown += 1;
            return Ok(ApplyOutcome::UnknownLabel);
        };

        let event = ClassificationEvent::new(page, chunk_index, text, label)?;
        self.apply_event(&event)?;
        Ok(ApplyOutcome::Recorded)
    }

    /// Applies one already-resolved classification event.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPageNumber`] when the event's page is 0.
    pub fn apply_event(&mut self, event: &ClassificationEvent) -> Result<(), CoreError> {
        self.histogram.record(event.label, event.weight());
        self.pages.push(
            event.page,
            PageEntry {
                text: event.text.clone(),
                label: event.label,
            },
        )
    }

    /// Folds `(text, category_index)` pairs from the one-shot analysis
    /// endpoint through the same histogram, without page attribution.
    ///
    /// Returns the number of pairs dropped for unknown category indices.
    pub fn fold_pairs<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> u64 {
        let mut dropped = 0;
        for (text, category_index) in pairs {
            match Label::from_index(category_index) {
                Some(label) => {
                    self.histogram.record(label, text.chars().count() as u64);
                }
                None => {
                    dropped += 1;
                    self.dropped_unknown += 1;
                }
            }
        }
        dropped
    }

    /// Current histogram snapshot.
    pub fn histogram(&self) -> &ClassificationHistogram {
        &self.histogram
    }

    /// Current page buffer snapshot.
    pub fn pages(&self) -> &PageBuffer {
        &self.pages
    }

    /// Highest page number observed so far.
    pub fn max_page(&self) -> u32 {
        self.pages.max_page()
    }

    /// Count of events dropped for unknown category indices.
    pub fn dropped_unknown(&self) -> u64 {
        self.dropped_unknown
    }

    /// Legend rows for every known category, in wire-index order.
    pub fn legend(&self) -> Vec<LegendEntry> {
        Label::ALL
            .iter()
            .map(|label| LegendEntry {
                label: *label,
                weight: self.histogram.weight(*label),
                percentage: self.histogram.percentage(*label),
            })
            .collect()
    }

    /// Resets all session state for a fresh scan.
    pub fn reset(&mut self) {
        self.histogram.clear();
        self.pages.clear();
        self.dropped_unknown = 0;
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for histogram arithmetic.

    use super::*;

    #[test]
    fn percentages_define_zero_over_zero_as_zero() {
        let histogram = ClassificationHistogram::new();
        for label in Label::ALL {
            assert_eq!(histogram.percentage(label), 0.0);
        }
    }

    #[test]
    fn record_updates_bucket_and_total_together() {
        let mut histogram = ClassificationHistogram::new();
        histogram.record(Label::Ai, 3);
        histogram.record(Label::Human, 5);

        assert_eq!(histogram.weight(Label::Ai), 3);
        assert_eq!(histogram.weight(Label::Human), 5);
        assert_eq!(histogram.total(), 8);
    }

    #[test]
    fn fold_pairs_reports_dropped_unknowns() {
        let mut aggregator = ScanAggregator::new();
        let dropped = aggregator.fold_pairs([("keep", 2), ("drop", 77)]);

        assert_eq!(dropped, 1);
        assert_eq!(aggregator.histogram().total(), 4);
    }
}
