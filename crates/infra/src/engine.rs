//! Audit engine: the application-level entry point for every session operation.
//!
//! ```text
//! create ──> Operator Directory ──> store (insert open + purge tags)
//! scans  ──> Product Catalog (per distinct code) ──> store (dedup + upsert, one tx)
//! events ──> store (append while open)
//! close  ──> store (guarded transition)
//! metrics ─> store (sessions, totals) + Operator Directory (names) ──> pure metrics
//! ```
//!
//! The engine contains no IO itself; it composes the store and collaborator
//! traits, so tests run it against the in-memory implementations.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stocktake_audit::metrics;
use stocktake_audit::{
    DateRange, GeneralMetrics, NewSessionEvent, Operator, OperatorMetrics, Product, ReadingAggregate,
    ReportRow, ResolvedScan, ScanReading, Session, SessionCounts, SessionDetail, SessionEvent,
    SessionStatus,
};
use stocktake_core::{DomainError, EventId, OperatorId, SessionId};

use crate::directory::{OperatorDirectory, OperatorRef, ProductCatalog};
use crate::store::{AuditStore, EventFilter, Page, Pagination, ReadingFilter, StoreError};

/// Coarse failure category, used by callers to pick a response.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("operator not found: {0}")]
    OperatorNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("an open session already exists")]
    SessionAlreadyOpen,

    #[error("{0}")]
    SessionAlreadyClosed(String),

    #[error("session {0} is not open")]
    SessionNotOpen(SessionId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::OperatorNotFound(_)
            | AuditError::SessionNotFound(_)
            | AuditError::ProductNotFound(_) => ErrorKind::NotFound,
            AuditError::SessionAlreadyOpen
            | AuditError::SessionAlreadyClosed(_)
            | AuditError::SessionNotOpen(_) => ErrorKind::Conflict,
            AuditError::Validation(_) => ErrorKind::Validation,
            AuditError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::OperatorNotFound(_) => "operator_not_found",
            AuditError::SessionNotFound(_) => "session_not_found",
            AuditError::ProductNotFound(_) => "product_not_found",
            AuditError::SessionAlreadyOpen => "session_already_open",
            AuditError::SessionAlreadyClosed(_) => "session_already_closed",
            AuditError::SessionNotOpen(_) => "session_not_open",
            AuditError::Validation(_) => "validation_error",
            AuditError::Store(_) => "internal_error",
        }
    }
}

impl From<DomainError> for AuditError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => AuditError::Validation(msg),
            DomainError::Conflict(msg) => AuditError::SessionAlreadyClosed(msg),
        }
    }
}

impl From<StoreError> for AuditError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::OpenSessionExists => AuditError::SessionAlreadyOpen,
            StoreError::SessionNotFound(id) => AuditError::SessionNotFound(id),
            StoreError::SessionNotOpen(id) => AuditError::SessionNotOpen(id),
            StoreError::UnknownProduct(code) => AuditError::ProductNotFound(code),
            StoreError::Domain(err) => err.into(),
            other @ StoreError::Backend(_) => AuditError::Store(other),
        }
    }
}

/// Report rows plus the counts printed alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub summary: SessionCounts,
    pub rows: Vec<ReportRow>,
}

/// Orchestrates session operations over a store and the two collaborators.
///
/// Generic over the store (`S`), product catalog (`C`) and operator
/// directory (`D`), so the same engine runs in-memory in tests and against
/// Postgres in deployments.
#[derive(Debug)]
pub struct AuditEngine<S, C, D> {
    store: S,
    catalog: C,
    directory: D,
}

impl<S, C, D> AuditEngine<S, C, D> {
    pub fn new(store: S, catalog: C, directory: D) -> Self {
        Self {
            store,
            catalog,
            directory,
        }
    }
}

impl<S, C, D> AuditEngine<S, C, D>
where
    S: AuditStore,
    C: ProductCatalog,
    D: OperatorDirectory,
{
    /// Resolve an operator reference, without any active-status check.
    pub async fn resolve_operator(&self, operator: &OperatorRef) -> Result<Operator, AuditError> {
        self.directory
            .lookup_by_ref(operator)
            .await?
            .ok_or_else(|| AuditError::OperatorNotFound(operator.to_string()))
    }

    /// Resolve the operator and open a session for them.
    pub async fn create_session(&self, operator: &OperatorRef) -> Result<Session, AuditError> {
        let operator = self.resolve_operator(operator).await?;
        self.start_session(&operator).await
    }

    /// Open a session for an already resolved operator.
    ///
    /// Purges the accepted tags in the same storage operation that inserts the
    /// session, so tag identifiers can be reused across audit cycles.
    #[instrument(skip(self, operator), fields(operator_id = %operator.id), err)]
    pub async fn start_session(&self, operator: &Operator) -> Result<Session, AuditError> {
        let session = Session::open(SessionId::new(), operator.id, Utc::now());
        match self.store.insert_open_session(&session).await {
            Ok(()) => {
                info!(session_id = %session.id, "audit session opened");
                Ok(session)
            }
            Err(StoreError::OpenSessionExists) => {
                warn!("rejected session creation: another session is open");
                Err(AuditError::SessionAlreadyOpen)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(session_id = %id, status = %target), err)]
    pub async fn close_session(
        &self,
        id: SessionId,
        target: SessionStatus,
    ) -> Result<Session, AuditError> {
        if !target.is_terminal() {
            return Err(AuditError::Validation(
                "target status must be finalized or cancelled".to_string(),
            ));
        }
        let session = self.store.close_session(id, target, Utc::now()).await?;
        info!(
            duration_minutes = session.duration_minutes().unwrap_or_default(),
            "audit session {}",
            session.status
        );
        Ok(session)
    }

    pub async fn finalize(&self, id: SessionId) -> Result<Session, AuditError> {
        self.close_session(id, SessionStatus::Finalized).await
    }

    pub async fn cancel(&self, id: SessionId) -> Result<Session, AuditError> {
        self.close_session(id, SessionStatus::Cancelled).await
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Session, AuditError> {
        self.store
            .get_session(id)
            .await?
            .ok_or(AuditError::SessionNotFound(id))
    }

    pub async fn get_detail(&self, id: SessionId) -> Result<SessionDetail, AuditError> {
        self.store
            .load_detail(id)
            .await?
            .ok_or(AuditError::SessionNotFound(id))
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, AuditError> {
        Ok(self.store.list_sessions().await?)
    }

    pub async fn open_session(&self) -> Result<Option<Session>, AuditError> {
        Ok(self.store.find_open_session().await?)
    }

    /// Count a batch of tag scans into the session's per-product aggregates.
    ///
    /// Tags already accepted since the last session creation are skipped. An
    /// unknown product code on a new tag fails the whole batch and nothing
    /// from it is kept.
    #[instrument(skip(self, readings), fields(session_id = %id, reading_count = readings.len()), err)]
    pub async fn submit_readings(
        &self,
        id: SessionId,
        readings: Vec<ScanReading>,
    ) -> Result<SessionDetail, AuditError> {
        for reading in &readings {
            reading.validate()?;
        }

        let mut products: HashMap<String, Option<Product>> = HashMap::new();
        for reading in &readings {
            if !products.contains_key(&reading.product_code) {
                let product = self.catalog.lookup_by_code(&reading.product_code).await?;
                products.insert(reading.product_code.clone(), product);
            }
        }

        let scans: Vec<ResolvedScan> = readings
            .into_iter()
            .map(|reading| ResolvedScan {
                product: products.get(&reading.product_code).cloned().flatten(),
                reading,
            })
            .collect();

        let outcome = self.store.apply_scans(id, scans).await.inspect_err(|e| {
            if let StoreError::UnknownProduct(code) = e {
                warn!(product_code = %code, "rejected reading batch: unknown product");
            }
        })?;
        if outcome.duplicates > 0 {
            debug!(duplicates = outcome.duplicates, "skipped already accepted tags");
        }
        info!(accepted = outcome.accepted, "readings recorded");

        self.get_detail(id).await
    }

    #[instrument(skip(self, events), fields(session_id = %id, event_count = events.len()), err)]
    pub async fn append_events(
        &self,
        id: SessionId,
        events: Vec<NewSessionEvent>,
    ) -> Result<SessionDetail, AuditError> {
        for event in &events {
            event.validate()?;
        }
        let logged: Vec<SessionEvent> = events
            .into_iter()
            .map(|e| e.into_logged(EventId::new(), id))
            .collect();

        self.store.append_events(id, logged).await?;
        self.get_detail(id).await
    }

    pub async fn list_readings(
        &self,
        id: SessionId,
        filter: &ReadingFilter,
        pagination: Pagination,
    ) -> Result<Page<ReadingAggregate>, AuditError> {
        self.get_session(id).await?;
        Ok(self.store.list_readings(id, filter, pagination).await?)
    }

    pub async fn list_events(
        &self,
        id: SessionId,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<SessionEvent>, AuditError> {
        self.get_session(id).await?;
        Ok(self.store.list_events(id, filter, pagination).await?)
    }

    async fn operator_names(
        &self,
        sessions: &[Session],
    ) -> Result<HashMap<OperatorId, String>, AuditError> {
        let ids: Vec<OperatorId> = sessions
            .iter()
            .map(|s| s.operator_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        Ok(self.directory.names_for(&ids).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn general_metrics(&self, range: &DateRange) -> Result<GeneralMetrics, AuditError> {
        let sessions = self.store.sessions_started_within(range).await?;
        let names = self.operator_names(&sessions).await?;
        Ok(metrics::general_metrics(&sessions, range, &names))
    }

    /// Statistics for one operator. An operator the directory cannot resolve
    /// is reported under the `unknown` name rather than failing.
    #[instrument(skip(self), fields(operator_id = %operator_id), err)]
    pub async fn operator_metrics(
        &self,
        operator_id: OperatorId,
        range: &DateRange,
    ) -> Result<OperatorMetrics, AuditError> {
        let sessions = self.store.sessions_started_within(range).await?;
        let name = self
            .directory
            .find_by_id(operator_id)
            .await?
            .map(|o| o.username);
        Ok(metrics::operator_metrics(
            operator_id,
            name.as_deref(),
            &sessions,
            range,
        ))
    }

    pub async fn summary(&self, range: &DateRange) -> Result<SessionCounts, AuditError> {
        let sessions = self.store.sessions_started_within(range).await?;
        Ok(metrics::session_counts(&sessions, range))
    }

    #[instrument(skip(self), err)]
    pub async fn report(&self, range: &DateRange) -> Result<SessionReport, AuditError> {
        let sessions = self.store.sessions_started_within(range).await?;
        let names = self.operator_names(&sessions).await?;
        let ids: Vec<SessionId> = sessions.iter().map(|s| s.id).collect();
        let totals = self.store.reading_totals(&ids).await?;

        Ok(SessionReport {
            summary: metrics::session_counts(&sessions, range),
            rows: metrics::report_rows(&sessions, range, &names, &totals),
        })
    }
}
