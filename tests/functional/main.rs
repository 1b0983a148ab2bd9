// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the tenant-cluster reconciliation pipeline.
//!
//! These tests run complete passes through the version router WITHOUT
//! requiring a live Kubernetes cluster. Every unit is backed by an in-memory
//! store, and chart packages come from a temporary directory.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_teardown_removes_everything
//! ```
//!
//! ## Test Categories
//!
//! - **Diff tests**: patch computation for the create/update/delete cases
//! - **Scenario tests**: full passes covering creation, version changes,
//!   cancellation, routing, retries, packages and teardown

mod diff_tests;
mod mock_state;
mod scenario_tests;

// Re-export for use in tests
pub use mock_state::*;
