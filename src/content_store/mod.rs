//! Content repository boundary.
//!
//! The orchestrator never owns content; it reads item bodies, writes analyzed
//! bodies back and keeps its job records in per-item metadata.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use schema::CONTENT_VERSIONED_SCHEMAS;
pub use store::SqliteContentStore;
pub use trait_def::ContentStore;
