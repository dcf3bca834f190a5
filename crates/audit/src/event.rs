use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{DomainError, DomainResult, EventId, SessionId};

/// Annotation submitted while a session is open (e.g. a pause).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSessionEvent {
    pub kind: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewSessionEvent {
    pub fn new(
        kind: impl Into<String>,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            occurred_at,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.kind.trim().is_empty() {
            return Err(DomainError::validation("event kind cannot be empty"));
        }
        Ok(())
    }

    pub fn into_logged(self, id: EventId, session_id: SessionId) -> SessionEvent {
        SessionEvent {
            id,
            session_id,
            kind: self.kind,
            description: self.description,
            occurred_at: self.occurred_at,
        }
    }
}

/// Append-only log entry owned by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: EventId,
    pub session_id: SessionId,
    pub kind: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}
