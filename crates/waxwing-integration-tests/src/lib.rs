//! Integration test crate for the Waxwing roster engine.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise flows across multiple workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p waxwing-integration-tests
//! ```
