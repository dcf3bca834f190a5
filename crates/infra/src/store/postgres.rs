//! Postgres-backed audit store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) on `audit_sessions_single_open` | `23505` | `OpenSessionExists` | Concurrent session creation lost the race |
//! | Database (other) | Any other | `Backend` | Constraint violations, syntax errors |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Concurrency
//!
//! - session creation relies on the partial unique index over open sessions
//! - scan batches and event appends hold `FOR SHARE` on the session row, closes
//!   take `FOR UPDATE`, so a close waits for in-flight batches and vice versa
//! - tag acceptance is `INSERT .. ON CONFLICT DO NOTHING RETURNING`; the row
//!   coming back is the proof of first acceptance
//! - aggregate increments are a single upsert, never read-modify-write
//! - a batch inserts its tags in sorted order, then upserts one aggregate per
//!   product in ascending product order; concurrent batches therefore lock
//!   rows in the same order and queue instead of deadlocking

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Row, Transaction};
use tracing::{Span, field, instrument};

use stocktake_audit::{
    DateRange, ReadingAggregate, ReadingTotals, ResolvedScan, Session, SessionDetail,
    SessionEvent, SessionStatus,
};
use stocktake_core::{EventId, OperatorId, ProductId, SessionId};

use super::plan::{Increment, distinct_tags, plan_scans};
use super::query::{EventFilter, Page, Pagination, ReadingFilter};
use super::r#trait::{AuditStore, ScanOutcome, StoreError, TagDedupStore};

/// Postgres-backed audit store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store can be
/// cloned freely and shared across request handlers.
#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("running audit store migrations");
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Lock the session row for the rest of the transaction and require it open.
async fn lock_open_session(
    tx: &mut Transaction<'_, Postgres>,
    session_id: SessionId,
) -> Result<(), StoreError> {
    let row = sqlx::query("SELECT status FROM audit_sessions WHERE id = $1 FOR SHARE")
        .bind(session_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_session", e))?;

    let Some(row) = row else {
        return Err(StoreError::SessionNotFound(session_id));
    };
    let status: String = row
        .try_get("status")
        .map_err(|e| map_sqlx_error("lock_session", e))?;
    if status != SessionStatus::Open.as_str() {
        return Err(StoreError::SessionNotOpen(session_id));
    }
    Ok(())
}

/// Insert the given tags, skipping those already accepted, and return the
/// ones this call inserted. Rows go in sorted order.
async fn insert_tags(
    conn: &mut sqlx::PgConnection,
    session_id: SessionId,
    tag_ids: &[String],
) -> Result<HashSet<String>, StoreError> {
    if tag_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let rows = sqlx::query(
        r#"
        INSERT INTO tag_scan_records (tag_id, session_id)
        SELECT t.tag_id, $2
        FROM unnest($1::text[]) AS t(tag_id)
        ORDER BY t.tag_id
        ON CONFLICT (tag_id) DO NOTHING
        RETURNING tag_id
        "#,
    )
    .bind(tag_ids)
    .bind(session_id.as_uuid())
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_tags", e))?;

    rows.iter()
        .map(|r| {
            r.try_get::<String, _>("tag_id")
                .map_err(|e| map_sqlx_error("insert_tags", e))
        })
        .collect()
}

async fn purge_tags(conn: &mut sqlx::PgConnection) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM tag_scan_records")
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("purge_tags", e))?;
    Ok(())
}

/// Add one batch's count for a product; the row is created on first use.
async fn upsert_aggregate(
    tx: &mut Transaction<'_, Postgres>,
    session_id: SessionId,
    inc: &Increment<'_>,
) -> Result<(), StoreError> {
    let quantity = i64::try_from(inc.count)
        .map_err(|_| StoreError::Backend(format!("scan count {} out of range", inc.count)))?;
    sqlx::query(
        r#"
        INSERT INTO reading_aggregates (
            session_id,
            product_id,
            category_code,
            quantity,
            last_scanned_at
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (session_id, product_id)
        DO UPDATE SET
            quantity = reading_aggregates.quantity + EXCLUDED.quantity,
            last_scanned_at = EXCLUDED.last_scanned_at
        "#,
    )
    .bind(session_id.as_uuid())
    .bind(inc.product.id.as_uuid())
    .bind(&inc.product.category_code)
    .bind(quantity)
    .bind(inc.last_scanned_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_aggregate", e))?;
    Ok(())
}

#[async_trait::async_trait]
impl TagDedupStore for PostgresAuditStore {
    #[instrument(skip(self), err)]
    async fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        purge_tags(&mut conn).await
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn accept_if_new(&self, session_id: SessionId, tag_id: &str) -> Result<bool, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        let inserted = insert_tags(&mut conn, session_id, &[tag_id.to_string()]).await?;
        Ok(inserted.contains(tag_id))
    }
}

#[async_trait::async_trait]
impl AuditStore for PostgresAuditStore {
    #[instrument(skip(self, session), fields(session_id = %session.id), err)]
    async fn insert_open_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO audit_sessions (
                id,
                operator_id,
                status,
                started_at,
                ended_at,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.operator_id.as_uuid())
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "audit_sessions_single_open") {
                StoreError::OpenSessionExists
            } else {
                map_sqlx_error("insert_session", e)
            }
        })?;

        purge_tags(&mut tx).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, operator_id, status, started_at, ended_at, created_at
            FROM audit_sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?;

        row.map(|r| session_from_row(&r, "get_session")).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, operator_id, status, started_at, ended_at, created_at
            FROM audit_sessions
            ORDER BY started_at DESC, id DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sessions", e))?;

        rows.iter()
            .map(|r| session_from_row(r, "list_sessions"))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn find_open_session(&self) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, operator_id, status, started_at, ended_at, created_at
            FROM audit_sessions
            WHERE status = 'open'
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_open_session", e))?;

        row.map(|r| session_from_row(&r, "find_open_session"))
            .transpose()
    }

    #[instrument(skip(self), fields(session_id = %id, status = %target), err)]
    async fn close_session(
        &self,
        id: SessionId,
        target: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, operator_id, status, started_at, ended_at, created_at
            FROM audit_sessions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_session", e))?;

        let Some(row) = row else {
            return Err(StoreError::SessionNotFound(id));
        };
        let mut session = session_from_row(&row, "close_session")?;
        session.close(target, ended_at)?;

        sqlx::query("UPDATE audit_sessions SET status = $2, ended_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(session.status.as_str())
            .bind(session.ended_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("close_session", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(session)
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn load_detail(&self, id: SessionId) -> Result<Option<SessionDetail>, StoreError> {
        let mut tx = self.begin().await?;
        // One snapshot for the session and both collections.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, operator_id, status, started_at, ended_at, created_at
            FROM audit_sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_detail", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let session = session_from_row(&row, "load_detail")?;

        let readings = sqlx::query(
            r#"
            SELECT session_id, product_id, category_code, quantity, last_scanned_at
            FROM reading_aggregates
            WHERE session_id = $1
            ORDER BY last_scanned_at DESC, product_id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_readings", e))?
        .iter()
        .map(|r| decode::<ReadingRow>(r, "load_readings").map(Into::into))
        .collect::<Result<Vec<ReadingAggregate>, _>>()?;

        let events = sqlx::query(
            r#"
            SELECT id, session_id, kind, description, occurred_at
            FROM session_events
            WHERE session_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_events", e))?
        .iter()
        .map(|r| decode::<EventRow>(r, "load_events").map(Into::into))
        .collect::<Result<Vec<SessionEvent>, _>>()?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Some(SessionDetail {
            session,
            readings,
            events,
        }))
    }

    #[instrument(
        skip(self, scans),
        fields(
            session_id = %session_id,
            scan_count = scans.len(),
            accepted = field::Empty,
            duplicates = field::Empty
        ),
        err
    )]
    async fn apply_scans(
        &self,
        session_id: SessionId,
        scans: Vec<ResolvedScan>,
    ) -> Result<ScanOutcome, StoreError> {
        let mut tx = self.begin().await?;
        lock_open_session(&mut tx, session_id).await?;

        let fresh = insert_tags(&mut tx, session_id, &distinct_tags(&scans)).await?;
        // Returning early drops `tx`, which rolls back the tags inserted above.
        let plan = plan_scans(&scans, &fresh)?;
        for inc in plan.increments.values() {
            upsert_aggregate(&mut tx, session_id, inc).await?;
        }
        let outcome = plan.outcome;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let span = Span::current();
        span.record("accepted", outcome.accepted);
        span.record("duplicates", outcome.duplicates);
        Ok(outcome)
    }

    #[instrument(skip(self, events), fields(session_id = %session_id, event_count = events.len()), err)]
    async fn append_events(
        &self,
        session_id: SessionId,
        events: Vec<SessionEvent>,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        lock_open_session(&mut tx, session_id).await?;

        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO session_events (id, session_id, kind, description, occurred_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(session_id.as_uuid())
            .bind(&event.kind)
            .bind(&event.description)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn list_readings(
        &self,
        session_id: SessionId,
        filter: &ReadingFilter,
        pagination: Pagination,
    ) -> Result<Page<ReadingAggregate>, StoreError> {
        let product_param: Option<uuid::Uuid> = filter.product_id.map(|id| *id.as_uuid());
        let category_param: Option<&str> = filter.category_code.as_deref();

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM reading_aggregates
            WHERE session_id = $1
                AND ($2::uuid IS NULL OR product_id = $2)
                AND ($3::text IS NULL OR category_code = $3)
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(product_param)
        .bind(category_param)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_readings", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_readings", e))?;

        let items = sqlx::query(
            r#"
            SELECT session_id, product_id, category_code, quantity, last_scanned_at
            FROM reading_aggregates
            WHERE session_id = $1
                AND ($2::uuid IS NULL OR product_id = $2)
                AND ($3::text IS NULL OR category_code = $3)
            ORDER BY last_scanned_at DESC, product_id ASC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(product_param)
        .bind(category_param)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_readings", e))?
        .iter()
        .map(|r| decode::<ReadingRow>(r, "list_readings").map(Into::into))
        .collect::<Result<Vec<ReadingAggregate>, _>>()?;

        Ok(Page::new(items, total.max(0) as u64, pagination))
    }

    #[instrument(skip(self), fields(session_id = %session_id), err)]
    async fn list_events(
        &self,
        session_id: SessionId,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<SessionEvent>, StoreError> {
        let kind_param: Option<&str> = filter.kind.as_deref();

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM session_events
            WHERE session_id = $1
                AND ($2::text IS NULL OR kind = $2)
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(kind_param)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_events", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_events", e))?;

        let items = sqlx::query(
            r#"
            SELECT id, session_id, kind, description, occurred_at
            FROM session_events
            WHERE session_id = $1
                AND ($2::text IS NULL OR kind = $2)
            ORDER BY position ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(kind_param)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?
        .iter()
        .map(|r| decode::<EventRow>(r, "list_events").map(Into::into))
        .collect::<Result<Vec<SessionEvent>, _>>()?;

        Ok(Page::new(items, total.max(0) as u64, pagination))
    }

    #[instrument(skip(self), err)]
    async fn sessions_started_within(&self, range: &DateRange) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, operator_id, status, started_at, ended_at, created_at
            FROM audit_sessions
            WHERE ($1::timestamptz IS NULL OR started_at >= $1)
                AND ($2::timestamptz IS NULL OR started_at <= $2)
            ORDER BY started_at ASC, id ASC
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sessions_started_within", e))?;

        rows.iter()
            .map(|r| session_from_row(r, "sessions_started_within"))
            .collect()
    }

    #[instrument(skip(self, session_ids), fields(session_count = session_ids.len()), err)]
    async fn reading_totals(
        &self,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, ReadingTotals>, StoreError> {
        if session_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<uuid::Uuid> = session_ids.iter().map(|id| *id.as_uuid()).collect();

        let rows = sqlx::query(
            r#"
            SELECT
                session_id,
                COUNT(*) AS reading_rows,
                COALESCE(SUM(quantity), 0)::BIGINT AS total_units
            FROM reading_aggregates
            WHERE session_id = ANY($1)
            GROUP BY session_id
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reading_totals", e))?;

        let mut totals = HashMap::with_capacity(rows.len());
        for row in rows {
            let session_id: uuid::Uuid = row
                .try_get("session_id")
                .map_err(|e| map_sqlx_error("reading_totals", e))?;
            let reading_rows: i64 = row
                .try_get("reading_rows")
                .map_err(|e| map_sqlx_error("reading_totals", e))?;
            let total_units: i64 = row
                .try_get("total_units")
                .map_err(|e| map_sqlx_error("reading_totals", e))?;
            totals.insert(
                SessionId::from_uuid(session_id),
                ReadingTotals {
                    reading_rows: reading_rows.max(0) as u64,
                    total_units: total_units.max(0) as u64,
                },
            );
        }
        Ok(totals)
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Backend(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique violation of the named constraint.
fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505" && db_err.constraint() == Some(constraint);
        }
    }
    false
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow, operation: &str) -> Result<T, StoreError> {
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row in {operation}: {e}")))
}

fn session_from_row(row: &PgRow, operation: &str) -> Result<Session, StoreError> {
    decode::<SessionRow>(row, operation).map(Into::into)
}

// SQLx row types

#[derive(Debug)]
struct SessionRow {
    id: uuid::Uuid,
    operator_id: uuid::Uuid,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(SessionRow {
            id: row.try_get("id")?,
            operator_id: row.try_get("operator_id")?,
            status: status.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: SessionId::from_uuid(row.id),
            operator_id: OperatorId::from_uuid(row.operator_id),
            status: row.status,
            started_at: row.started_at,
            ended_at: row.ended_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct ReadingRow {
    session_id: uuid::Uuid,
    product_id: uuid::Uuid,
    category_code: String,
    quantity: i64,
    last_scanned_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ReadingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReadingRow {
            session_id: row.try_get("session_id")?,
            product_id: row.try_get("product_id")?,
            category_code: row.try_get("category_code")?,
            quantity: row.try_get("quantity")?,
            last_scanned_at: row.try_get("last_scanned_at")?,
        })
    }
}

impl From<ReadingRow> for ReadingAggregate {
    fn from(row: ReadingRow) -> Self {
        ReadingAggregate {
            session_id: SessionId::from_uuid(row.session_id),
            product_id: ProductId::from_uuid(row.product_id),
            category_code: row.category_code,
            quantity: row.quantity.max(0) as u64,
            last_scanned_at: row.last_scanned_at,
        }
    }
}

#[derive(Debug)]
struct EventRow {
    id: uuid::Uuid,
    session_id: uuid::Uuid,
    kind: String,
    description: String,
    occurred_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            kind: row.try_get("kind")?,
            description: row.try_get("description")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl From<EventRow> for SessionEvent {
    fn from(row: EventRow) -> Self {
        SessionEvent {
            id: EventId::from_uuid(row.id),
            session_id: SessionId::from_uuid(row.session_id),
            kind: row.kind,
            description: row.description,
            occurred_at: row.occurred_at,
        }
    }
}
