use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{DomainError, DomainResult, OperatorId, SessionId};

use crate::event::SessionEvent;
use crate::reading::ReadingAggregate;

/// Lifecycle state of an audit session.
///
/// `Open` is the only non-terminal state. All transition rules live in
/// [`SessionStatus::transition`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Finalized,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Finalized => "finalized",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Open)
    }

    /// Decide the next state for a close request.
    ///
    /// Only `Open -> Finalized` and `Open -> Cancelled` are defined. Leaving a
    /// terminal state is a conflict; targeting `Open` is a validation failure.
    pub fn transition(self, target: SessionStatus) -> DomainResult<SessionStatus> {
        if !target.is_terminal() {
            return Err(DomainError::validation(
                "target status must be finalized or cancelled",
            ));
        }
        match self {
            SessionStatus::Open => Ok(target),
            closed => Err(DomainError::conflict(format!(
                "session is already {}",
                closed.as_str()
            ))),
        }
    }
}

impl core::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "finalized" => Ok(SessionStatus::Finalized),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown session status '{other}'"
            ))),
        }
    }
}

/// One audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub operator_id: OperatorId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A freshly started session.
    pub fn open(id: SessionId, operator_id: OperatorId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            operator_id,
            status: SessionStatus::Open,
            started_at: now,
            ended_at: None,
            created_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Move the session into a terminal state, stamping the end time.
    pub fn close(&mut self, target: SessionStatus, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(target)?;
        self.ended_at = Some(now);
        Ok(())
    }

    /// Elapsed minutes between start and end; `None` while no end is recorded.
    pub fn duration_minutes(&self) -> Option<f64> {
        crate::metrics::duration_minutes(self)
    }
}

/// A session together with its owned collections, read in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub readings: Vec<ReadingAggregate>,
    pub events: Vec<SessionEvent>,
}

impl SessionDetail {
    pub fn quantity_of(&self, product_id: stocktake_core::ProductId) -> u64 {
        self.readings
            .iter()
            .find(|r| r.product_id == product_id)
            .map(|r| r.quantity)
            .unwrap_or(0)
    }

    pub fn total_units(&self) -> u64 {
        self.readings.iter().map(|r| r.quantity).sum()
    }
}
