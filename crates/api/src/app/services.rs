use std::sync::Arc;

use thiserror::Error;

use stocktake_audit::{
    DateRange, GeneralMetrics, NewSessionEvent, Operator, OperatorMetrics, ReadingAggregate,
    ScanReading, Session, SessionDetail, SessionEvent, SessionStatus,
};
use stocktake_core::{OperatorId, SessionId};
use stocktake_infra::{
    AuditEngine, AuditError, DirectoryFixtures, EventFilter, InMemoryAuditStore, InMemoryDirectory,
    OperatorRef, Page, Pagination, PostgresAuditStore, PostgresDirectory, ReadingFilter,
    SessionReport, StoreError,
};

use crate::config::AppConfig;

// Engine wired to the in-memory store and directory
type InMemoryEngine =
    AuditEngine<Arc<InMemoryAuditStore>, Arc<InMemoryDirectory>, Arc<InMemoryDirectory>>;

// Engine wired to Postgres
type PersistentEngine =
    AuditEngine<Arc<PostgresAuditStore>, Arc<PostgresDirectory>, Arc<PostgresDirectory>>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to read directory fixtures {path}: {source}")]
    FixturesIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse directory fixtures: {0}")]
    FixturesParse(#[from] serde_json::Error),

    #[error("DATABASE_URL is required for persistent stores")]
    MissingDatabaseUrl,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub enum AppServices {
    InMemory {
        engine: Arc<InMemoryEngine>,
    },
    Persistent {
        engine: Arc<PersistentEngine>,
    },
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServiceError> {
    if config.use_persistent_stores {
        return build_persistent_services(config).await;
    }

    let fixtures = match &config.directory_fixtures {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ServiceError::FixturesIo {
                path: path.display().to_string(),
                source,
            })?;
            let fixtures = DirectoryFixtures::from_json(&raw)?;
            tracing::info!(
                products = fixtures.products.len(),
                operators = fixtures.operators.len(),
                "loaded directory fixtures"
            );
            fixtures
        }
        None => {
            tracing::warn!("no DIRECTORY_FIXTURES configured; directory starts empty");
            DirectoryFixtures::default()
        }
    };

    Ok(AppServices::in_memory(fixtures))
}

async fn build_persistent_services(config: &AppConfig) -> Result<AppServices, ServiceError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or(ServiceError::MissingDatabaseUrl)?;

    let store = PostgresAuditStore::connect(url, config.db_max_connections).await?;
    store.migrate().await?;
    let directory = Arc::new(PostgresDirectory::new(store.pool().clone()));
    tracing::info!("using Postgres audit store");

    Ok(AppServices::Persistent {
        engine: Arc::new(AuditEngine::new(
            Arc::new(store),
            directory.clone(),
            directory,
        )),
    })
}

impl AppServices {
    /// In-memory wiring (dev/test).
    pub fn in_memory(fixtures: DirectoryFixtures) -> Self {
        let directory = Arc::new(InMemoryDirectory::from_fixtures(fixtures));
        let store = Arc::new(InMemoryAuditStore::new());
        AppServices::InMemory {
            engine: Arc::new(AuditEngine::new(store, directory.clone(), directory)),
        }
    }

    pub async fn resolve_operator(&self, operator: &OperatorRef) -> Result<Operator, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.resolve_operator(operator).await,
            AppServices::Persistent { engine } => engine.resolve_operator(operator).await,
        }
    }

    pub async fn start_session(&self, operator: &Operator) -> Result<Session, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.start_session(operator).await,
            AppServices::Persistent { engine } => engine.start_session(operator).await,
        }
    }

    pub async fn close_session(
        &self,
        id: SessionId,
        target: SessionStatus,
    ) -> Result<Session, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.close_session(id, target).await,
            AppServices::Persistent { engine } => engine.close_session(id, target).await,
        }
    }

    pub async fn get_detail(&self, id: SessionId) -> Result<SessionDetail, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.get_detail(id).await,
            AppServices::Persistent { engine } => engine.get_detail(id).await,
        }
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.list_sessions().await,
            AppServices::Persistent { engine } => engine.list_sessions().await,
        }
    }

    pub async fn open_session(&self) -> Result<Option<Session>, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.open_session().await,
            AppServices::Persistent { engine } => engine.open_session().await,
        }
    }

    pub async fn submit_readings(
        &self,
        id: SessionId,
        readings: Vec<ScanReading>,
    ) -> Result<SessionDetail, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.submit_readings(id, readings).await,
            AppServices::Persistent { engine } => engine.submit_readings(id, readings).await,
        }
    }

    pub async fn append_events(
        &self,
        id: SessionId,
        events: Vec<NewSessionEvent>,
    ) -> Result<SessionDetail, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.append_events(id, events).await,
            AppServices::Persistent { engine } => engine.append_events(id, events).await,
        }
    }

    pub async fn list_readings(
        &self,
        id: SessionId,
        filter: &ReadingFilter,
        pagination: Pagination,
    ) -> Result<Page<ReadingAggregate>, AuditError> {
        match self {
            AppServices::InMemory { engine } => {
                engine.list_readings(id, filter, pagination).await
            }
            AppServices::Persistent { engine } => {
                engine.list_readings(id, filter, pagination).await
            }
        }
    }

    pub async fn list_events(
        &self,
        id: SessionId,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> Result<Page<SessionEvent>, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.list_events(id, filter, pagination).await,
            AppServices::Persistent { engine } => engine.list_events(id, filter, pagination).await,
        }
    }

    pub async fn general_metrics(&self, range: &DateRange) -> Result<GeneralMetrics, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.general_metrics(range).await,
            AppServices::Persistent { engine } => engine.general_metrics(range).await,
        }
    }

    pub async fn operator_metrics(
        &self,
        operator_id: OperatorId,
        range: &DateRange,
    ) -> Result<OperatorMetrics, AuditError> {
        match self {
            AppServices::InMemory { engine } => {
                engine.operator_metrics(operator_id, range).await
            }
            AppServices::Persistent { engine } => engine.operator_metrics(operator_id, range).await,
        }
    }

    pub async fn report(&self, range: &DateRange) -> Result<SessionReport, AuditError> {
        match self {
            AppServices::InMemory { engine } => engine.report(range).await,
            AppServices::Persistent { engine } => engine.report(range).await,
        }
    }
}
