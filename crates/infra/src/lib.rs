//! Infrastructure layer: storage, collaborator lookups, and the audit engine.

pub mod directory;
pub mod engine;
pub mod store;

pub use directory::{
    DirectoryFixtures, InMemoryDirectory, OperatorDirectory, OperatorRef, PostgresDirectory,
    ProductCatalog,
};
pub use engine::{AuditEngine, AuditError, ErrorKind, SessionReport};
pub use store::{
    AuditStore, EventFilter, InMemoryAuditStore, Page, Pagination, PostgresAuditStore,
    ReadingFilter, ScanOutcome, StoreError, TagDedupStore,
};
