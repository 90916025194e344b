//! # Session Controller Test Utilities
//!
//! Shared test utilities for the Sanctuary Session Controller.
//!
//! This crate provides mock implementations and test fixtures for
//! isolated controller testing without requiring real infrastructure.
//!
//! ## Modules
//!
//! - `scripted_classifier` - Scripted semantic classifier (no network)
//! - `fixtures` - Pre-configured dependencies and session parameters
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let classifier = ScriptedClassifier::clean();
//!     let deps = TestDeps::new().with_classifier(classifier.clone()).build();
//!
//!     // Run your test against deps...
//!     assert_eq!(classifier.calls(), 0);
//! }
//! ```

pub mod fixtures;
pub mod scripted_classifier;

pub use fixtures::{drain_events, test_create_params, wait_for_event, TestDeps};
pub use scripted_classifier::ScriptedClassifier;
