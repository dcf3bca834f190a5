use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stocktake_audit::{
    DateRange, ReadingAggregate, ReadingTotals, ResolvedScan, Session, SessionDetail, SessionEvent,
    SessionStatus,
};
use stocktake_core::{DomainError, SessionId};

use super::query::{EventFilter, Page, Pagination, ReadingFilter};

/// Audit store operation error.
///
/// Storage-level outcomes. The engine maps these onto its own failure
/// taxonomy; `Backend` is the only variant that signals an infrastructure
/// fault.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an open session already exists")]
    OpenSessionExists,

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {0} is not open")]
    SessionNotOpen(SessionId),

    #[error("unknown product code: {0}")]
    UnknownProduct(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result of applying one scan batch.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Scans whose tag was new and which were counted.
    pub accepted: usize,
    /// Scans skipped because their tag was already accepted.
    pub duplicates: usize,
}

/// At-most-once tag acceptance.
///
/// Records are global (not keyed by session); the scope is re-anchored by
/// `reset`, which session creation performs.
#[async_trait::async_trait]
pub trait TagDedupStore: Send + Sync {
    /// Drop every accepted tag.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Insert `tag_id` if absent. Returns `true` only for the call that
    /// performed the insert, even when callers race on the same tag.
    async fn accept_if_new(&self, session_id: SessionId, tag_id: &str) -> Result<bool, StoreError>;
}

/// Persistent state of the audit engine: sessions, reading aggregates and
/// session events.
///
/// ## Atomicity requirements
///
/// Implementations must provide, as single storage operations:
/// - `insert_open_session`: reject when another session is open, otherwise
///   insert the session and purge accepted tags, all or nothing
/// - `close_session`: status transition guarded against concurrent closes
/// - `apply_scans`: tag acceptance plus aggregate increment for the whole
///   batch; an unknown product on a new tag rolls the batch back entirely
///
/// Aggregate increments must never be lost when the same (session, product)
/// is scanned by concurrent batches.
#[async_trait::async_trait]
pub trait AuditStore: TagDedupStore {
    async fn insert_open_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    async fn find_open_session(&self) -> Result<Option<Session>, StoreError>;

    /// Apply [`Session::close`] to the stored session and persist the result.
    async fn close_session(
        &self,
        id: SessionId,
        target: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, StoreError>;

    /// Session plus its aggregates and events.
    async fn load_detail(&self, id: SessionId) -> Result<Option<SessionDetail>, StoreError>;

    async fn apply_scans(
        &self,
        session_id: SessionId,
        scans: Vec<ResolvedScan>,
    ) -> Result<ScanOutcome, StoreError>;

    /// Append events to an open session, in order.
    async fn append_events(
        &self,
        session_id: SessionId,
        events: Vec<SessionEvent>,
    ) -> Result<(), StoreError>;

    async fn list_readings(
        &self,
        session_id: SessionId,
        filter: &ReadingFilter,
        pagination: Pagination,
    ) -> Result<Page<ReadingAggregate>, StoreError>;

    async fn list_events(
        &self,
        session_id: SessionId,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<SessionEvent>, StoreError>;

    /// Sessions whose start time falls inside `range`.
    async fn sessions_started_within(&self, range: &DateRange) -> Result<Vec<Session>, StoreError>;

    /// Reading totals per session. Sessions without readings may be absent.
    async fn reading_totals(
        &self,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, ReadingTotals>, StoreError>;
}

#[async_trait::async_trait]
impl<S> TagDedupStore for Arc<S>
where
    S: TagDedupStore + ?Sized,
{
    async fn reset(&self) -> Result<(), StoreError> {
        (**self).reset().await
    }

    async fn accept_if_new(&self, session_id: SessionId, tag_id: &str) -> Result<bool, StoreError> {
        (**self).accept_if_new(session_id, tag_id).await
    }
}

#[async_trait::async_trait]
impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    async fn insert_open_session(&self, session: &Session) -> Result<(), StoreError> {
        (**self).insert_open_session(session).await
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        (**self).get_session(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        (**self).list_sessions().await
    }

    async fn find_open_session(&self) -> Result<Option<Session>, StoreError> {
        (**self).find_open_session().await
    }

    async fn close_session(
        &self,
        id: SessionId,
        target: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        (**self).close_session(id, target, ended_at).await
    }

    async fn load_detail(&self, id: SessionId) -> Result<Option<SessionDetail>, StoreError> {
        (**self).load_detail(id).await
    }

    async fn apply_scans(
        &self,
        session_id: SessionId,
        scans: Vec<ResolvedScan>,
    ) -> Result<ScanOutcome, StoreError> {
        (**self).apply_scans(session_id, scans).await
    }

    async fn append_events(
        &self,
        session_id: SessionId,
        events: Vec<SessionEvent>,
    ) -> Result<(), StoreError> {
        (**self).append_events(session_id, events).await
    }

    async fn list_readings(
        &self,
        session_id: SessionId,
        filter: &ReadingFilter,
        pagination: Pagination,
    ) -> Result<Page<ReadingAggregate>, StoreError> {
        (**self).list_readings(session_id, filter, pagination).await
    }

    async fn list_events(
        &self,
        session_id: SessionId,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<SessionEvent>, StoreError> {
        (**self).list_events(session_id, filter, pagination).await
    }

    async fn sessions_started_within(&self, range: &DateRange) -> Result<Vec<Session>, StoreError> {
        (**self).sessions_started_within(range).await
    }

    async fn reading_totals(
        &self,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, ReadingTotals>, StoreError> {
        (**self).reading_totals(session_ids).await
    }
}
