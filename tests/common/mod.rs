//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestSystem;
//!
//! #[tokio::test]
//! async fn test_tick() {
//!     let system = TestSystem::new();
//!     let id = system.published_post("test content");
//!     system.service.enqueue_for_analysis(&[id], "default").unwrap();
//!     system.service.batch_analyze().await.unwrap();
//! }
//! ```

mod analyzer;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use analyzer::ScriptedAnalyzer;
#[allow(unused_imports)]
pub use fixtures::{TestSystem, ANNOTATED_BODY};
#[allow(unused_imports)]
pub use server::{FakeAnalysisServer, ScriptedResponse};
