//! Integration test suite.
//!
//! Parses fixture result files written into temporary directories and
//! imports them into the in-memory Quality Center backend.
//!
//! Run with: cargo test --test integration

mod fixtures;

mod workbench_tests;
