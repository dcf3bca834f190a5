//! Audit session storage boundary.
//!
//! Sessions, accepted tags, reading aggregates and session events live behind
//! [`AuditStore`]. Two implementations exist: an in-memory store for tests and
//! local runs, and a Postgres store for persistent deployments.

pub mod in_memory;
mod plan;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryAuditStore;
pub use postgres::PostgresAuditStore;
pub use query::{EventFilter, Page, Pagination, ReadingFilter};
pub use r#trait::{AuditStore, ScanOutcome, StoreError, TagDedupStore};
