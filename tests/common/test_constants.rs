//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Base URL of the orchestrator under test.
pub const ROOT_URL: &str = "https://ci.example.com/";

/// Base URL of another orchestrator sharing the project.
pub const OTHER_ROOT_URL: &str = "https://other-ci.example.com/";
