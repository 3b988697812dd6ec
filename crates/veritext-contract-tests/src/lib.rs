#![warn(missing_docs)]
//! # veritext-contract-tests
//!
//! Holds the frozen wire-contract schemas' validation suite. All content
//! lives in `tests/`; see the workspace `contracts/` directory for the
//! schemas and fixtures themselves.
