use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stocktake_audit::{
    DateRange, ReadingAggregate, ReadingTotals, ResolvedScan, Session, SessionDetail, SessionEvent,
    SessionStatus,
};
use stocktake_core::SessionId;

use super::plan::{distinct_tags, plan_scans};
use super::query::{EventFilter, Page, Pagination, ReadingFilter};
use super::r#trait::{AuditStore, ScanOutcome, StoreError, TagDedupStore};

#[derive(Debug, Default)]
struct State {
    sessions: BTreeMap<SessionId, Session>,
    /// Accepted tag id -> session that accepted it.
    tags: HashMap<String, SessionId>,
    readings: HashMap<SessionId, Vec<ReadingAggregate>>,
    events: HashMap<SessionId, Vec<SessionEvent>>,
}

impl State {
    fn open_session(&self) -> Option<&Session> {
        self.sessions.values().find(|s| s.is_open())
    }

    fn require_open(&self, id: SessionId) -> Result<&Session, StoreError> {
        match self.sessions.get(&id) {
            None => Err(StoreError::SessionNotFound(id)),
            Some(s) if !s.is_open() => Err(StoreError::SessionNotOpen(id)),
            Some(s) => Ok(s),
        }
    }

    /// Insert `tag_id` unless already accepted. `true` when this call inserted it.
    fn accept_tag(&mut self, session_id: SessionId, tag_id: &str) -> bool {
        if self.tags.contains_key(tag_id) {
            return false;
        }
        self.tags.insert(tag_id.to_string(), session_id);
        true
    }

    fn purge_tags(&mut self) {
        self.tags.clear();
    }

    fn sorted_readings(&self, id: SessionId) -> Vec<ReadingAggregate> {
        let mut rows = self.readings.get(&id).cloned().unwrap_or_default();
        rows.sort_by(|a, b| {
            b.last_scanned_at
                .cmp(&a.last_scanned_at)
                .then(a.product_id.cmp(&b.product_id))
        });
        rows
    }
}

/// In-memory audit store.
///
/// Intended for tests/dev. Every operation holds a single lock over the whole
/// state, which is what makes the batch operations atomic.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    state: RwLock<State>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl TagDedupStore for InMemoryAuditStore {
    async fn reset(&self) -> Result<(), StoreError> {
        self.write()?.purge_tags();
        Ok(())
    }

    async fn accept_if_new(&self, session_id: SessionId, tag_id: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.accept_tag(session_id, tag_id))
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert_open_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.open_session().is_some() {
            return Err(StoreError::OpenSessionExists);
        }
        state.sessions.insert(session.id, session.clone());
        state.purge_tags();
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.read()?.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn find_open_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.open_session().cloned())
    }

    async fn close_session(
        &self,
        id: SessionId,
        target: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let mut state = self.write()?;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))?;
        session.close(target, ended_at)?;
        Ok(session.clone())
    }

    async fn load_detail(&self, id: SessionId) -> Result<Option<SessionDetail>, StoreError> {
        let state = self.read()?;
        let Some(session) = state.sessions.get(&id).cloned() else {
            return Ok(None);
        };
        Ok(Some(SessionDetail {
            session,
            readings: state.sorted_readings(id),
            events: state.events.get(&id).cloned().unwrap_or_default(),
        }))
    }

    async fn apply_scans(
        &self,
        session_id: SessionId,
        scans: Vec<ResolvedScan>,
    ) -> Result<ScanOutcome, StoreError> {
        let mut state = self.write()?;
        state.require_open(session_id)?;

        // Plan against the current tags first, so a failure leaves nothing behind.
        let fresh: HashSet<String> = distinct_tags(&scans)
            .into_iter()
            .filter(|tag| !state.tags.contains_key(tag))
            .collect();
        let plan = plan_scans(&scans, &fresh)?;

        let state = &mut *state;
        for tag in &plan.accepted_tags {
            state.accept_tag(session_id, tag);
        }
        let rows = state.readings.entry(session_id).or_default();
        for inc in plan.increments.values() {
            match rows.iter_mut().find(|r| r.product_id == inc.product.id) {
                Some(row) => row.record_scans(inc.count, inc.last_scanned_at),
                None => rows.push(inc.new_row(session_id)),
            }
        }
        Ok(plan.outcome)
    }

    async fn append_events(
        &self,
        session_id: SessionId,
        events: Vec<SessionEvent>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.require_open(session_id)?;
        state.events.entry(session_id).or_default().extend(events);
        Ok(())
    }

    async fn list_readings(
        &self,
        session_id: SessionId,
        filter: &ReadingFilter,
        pagination: Pagination,
    ) -> Result<Page<ReadingAggregate>, StoreError> {
        let state = self.read()?;
        let rows = state
            .sorted_readings(session_id)
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        Ok(Page::slice(rows, pagination))
    }

    async fn list_events(
        &self,
        session_id: SessionId,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<SessionEvent>, StoreError> {
        let state = self.read()?;
        let events = state
            .events
            .get(&session_id)
            .map(|events| events.iter().filter(|e| filter.matches(e)).cloned().collect())
            .unwrap_or_default();
        Ok(Page::slice(events, pagination))
    }

    async fn sessions_started_within(&self, range: &DateRange) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .read()?
            .sessions
            .values()
            .filter(|s| range.contains(s.started_at))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn reading_totals(
        &self,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, ReadingTotals>, StoreError> {
        let state = self.read()?;
        Ok(session_ids
            .iter()
            .filter_map(|id| {
                state
                    .readings
                    .get(id)
                    .map(|rows| (*id, ReadingTotals::from_aggregates(rows)))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use stocktake_audit::{Product, ScanReading};
    use stocktake_core::{DomainError, EventId, OperatorId, ProductId};

    fn product(code: &str, category: &str) -> Product {
        Product {
            id: ProductId::new(),
            code: code.to_string(),
            name: format!("{code} item"),
            category_code: category.to_string(),
            location: "A1".to_string(),
        }
    }

    fn scan(tag: &str, product: Option<&Product>) -> ResolvedScan {
        ResolvedScan {
            reading: ScanReading::new(
                tag,
                product.map(|p| p.code.clone()).unwrap_or_else(|| "NOPE".to_string()),
                Utc::now(),
            ),
            product: product.cloned(),
        }
    }

    async fn store_with_open_session() -> (InMemoryAuditStore, Session) {
        let store = InMemoryAuditStore::new();
        let session = Session::open(SessionId::new(), OperatorId::new(), Utc::now());
        store.insert_open_session(&session).await.unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn second_open_session_is_rejected() {
        let (store, _) = store_with_open_session().await;
        let other = Session::open(SessionId::new(), OperatorId::new(), Utc::now());

        let err = store.insert_open_session(&other).await.unwrap_err();
        assert!(matches!(err, StoreError::OpenSessionExists));
        assert!(store.get_session(other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn creating_a_session_purges_accepted_tags() {
        let (store, first) = store_with_open_session().await;
        assert!(store.accept_if_new(first.id, "T1").await.unwrap());
        store
            .close_session(first.id, SessionStatus::Finalized, Utc::now())
            .await
            .unwrap();

        let second = Session::open(SessionId::new(), OperatorId::new(), Utc::now());
        store.insert_open_session(&second).await.unwrap();
        assert!(store.accept_if_new(second.id, "T1").await.unwrap());
    }

    #[tokio::test]
    async fn accept_if_new_is_true_once() {
        let store = InMemoryAuditStore::new();
        let id = SessionId::new();
        assert!(store.accept_if_new(id, "T1").await.unwrap());
        assert!(!store.accept_if_new(id, "T1").await.unwrap());

        store.reset().await.unwrap();
        assert!(store.accept_if_new(id, "T1").await.unwrap());
    }

    #[tokio::test]
    async fn batches_and_single_acceptance_share_one_tag_record() {
        let (store, session) = store_with_open_session().await;
        let p = product("P1", "BRK");

        assert!(store.accept_if_new(session.id, "T1").await.unwrap());
        let outcome = store
            .apply_scans(session.id, vec![scan("T1", Some(&p)), scan("T2", Some(&p))])
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome { accepted: 1, duplicates: 1 });
        assert!(!store.accept_if_new(session.id, "T2").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_product_rolls_back_the_whole_batch() {
        let (store, session) = store_with_open_session().await;
        let p = product("P1", "BRK");

        let err = store
            .apply_scans(session.id, vec![scan("T1", Some(&p)), scan("T2", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownProduct(code) if code == "NOPE"));

        let detail = store.load_detail(session.id).await.unwrap().unwrap();
        assert!(detail.readings.is_empty());
        // T1 was not consumed by the failed batch.
        assert!(store.accept_if_new(session.id, "T1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_with_unknown_product_is_skipped_not_failed() {
        let (store, session) = store_with_open_session().await;
        let p = product("P1", "BRK");
        store
            .apply_scans(session.id, vec![scan("T1", Some(&p))])
            .await
            .unwrap();

        let outcome = store
            .apply_scans(session.id, vec![scan("T1", None)])
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome { accepted: 0, duplicates: 1 });
    }

    #[tokio::test]
    async fn repeated_tag_inside_one_batch_counts_once() {
        let (store, session) = store_with_open_session().await;
        let p = product("P1", "BRK");

        let outcome = store
            .apply_scans(
                session.id,
                vec![scan("T1", Some(&p)), scan("T2", Some(&p)), scan("T1", Some(&p))],
            )
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome { accepted: 2, duplicates: 1 });

        let detail = store.load_detail(session.id).await.unwrap().unwrap();
        assert_eq!(detail.quantity_of(p.id), 2);
    }

    #[tokio::test]
    async fn scans_and_events_require_an_open_session() {
        let (store, session) = store_with_open_session().await;
        store
            .close_session(session.id, SessionStatus::Cancelled, Utc::now())
            .await
            .unwrap();
        let p = product("P1", "BRK");

        let err = store
            .apply_scans(session.id, vec![scan("T1", Some(&p))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotOpen(_)));

        let event = stocktake_audit::NewSessionEvent::new("pause", "", Utc::now())
            .into_logged(EventId::new(), session.id);
        let err = store.append_events(session.id, vec![event]).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotOpen(_)));

        let err = store
            .apply_scans(SessionId::new(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn closing_twice_surfaces_domain_conflict() {
        let (store, session) = store_with_open_session().await;
        store
            .close_session(session.id, SessionStatus::Finalized, Utc::now())
            .await
            .unwrap();

        let err = store
            .close_session(session.id, SessionStatus::Finalized, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn readings_are_filtered_and_paged() {
        let (store, session) = store_with_open_session().await;
        let brakes = product("P1", "BRK");
        let oil = product("P2", "OIL");
        store
            .apply_scans(
                session.id,
                vec![scan("T1", Some(&brakes)), scan("T2", Some(&oil)), scan("T3", Some(&oil))],
            )
            .await
            .unwrap();

        let filter = ReadingFilter {
            category_code: Some("OIL".to_string()),
            ..ReadingFilter::default()
        };
        let page = store
            .list_readings(session.id, &filter, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].quantity, 2);

        let first = store
            .list_readings(session.id, &ReadingFilter::default(), Pagination::new(Some(1), None))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 1);
        assert!(first.has_more);
    }

    #[tokio::test]
    async fn reading_totals_skip_sessions_without_readings() {
        let (store, session) = store_with_open_session().await;
        let p = product("P1", "BRK");
        store
            .apply_scans(session.id, vec![scan("T1", Some(&p)), scan("T2", Some(&p))])
            .await
            .unwrap();

        let other = SessionId::new();
        let totals = store.reading_totals(&[session.id, other]).await.unwrap();
        assert_eq!(totals[&session.id], ReadingTotals { reading_rows: 1, total_units: 2 });
        assert!(!totals.contains_key(&other));
    }

    #[tokio::test]
    async fn sessions_are_selected_by_start_time() {
        let store = InMemoryAuditStore::new();
        let t0 = Utc::now() - Duration::days(10);
        for days in [0, 5] {
            let mut s = Session::open(SessionId::new(), OperatorId::new(), t0 + Duration::days(days));
            store.insert_open_session(&s).await.unwrap();
            s = store
                .close_session(s.id, SessionStatus::Finalized, s.started_at + Duration::hours(1))
                .await
                .unwrap();
            assert!(s.ended_at.is_some());
        }

        let range = DateRange::new(Some(t0 + Duration::days(1)), None).unwrap();
        let within = store.sessions_started_within(&range).await.unwrap();
        assert_eq!(within.len(), 1);
        assert_eq!(within[0].started_at, t0 + Duration::days(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_batches_on_one_product_lose_no_increments() {
        let (store, session) = store_with_open_session().await;
        let store = Arc::new(store);
        let p = product("P1", "BRK");

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_scans(session.id, vec![scan(&format!("T{i}"), Some(&p))])
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let detail = store.load_detail(session.id).await.unwrap().unwrap();
        assert_eq!(detail.quantity_of(p.id), 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_on_one_tag_accepts_it_once() {
        let store = Arc::new(InMemoryAuditStore::new());
        let session_id = SessionId::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.accept_if_new(session_id, "T-shared").await.unwrap()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
