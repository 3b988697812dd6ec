#![warn(missing_docs)]
//! # veritext-benchmarks
//!
//! Lightweight NFR guardrails for the aggregation and digest hot paths.
//! All content lives in `tests/`.
