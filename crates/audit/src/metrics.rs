//! Read-side statistics over stored sessions.
//!
//! Everything here is a pure function of the sessions (and reading totals)
//! passed in; callers load the data and supply operator display names.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{OperatorId, SessionId};

use crate::directory::UNKNOWN_OPERATOR;
use crate::range::DateRange;
use crate::reading::ReadingTotals;
use crate::session::{Session, SessionStatus};

/// How many operators the fastest-operator ranking keeps.
pub const FASTEST_OPERATORS_LIMIT: usize = 5;

/// Elapsed minutes between start and end, fractional. `None` without an end.
pub fn duration_minutes(session: &Session) -> Option<f64> {
    let ended_at = session.ended_at?;
    let elapsed = ended_at - session.started_at;
    Some(elapsed.num_milliseconds() as f64 / 60_000.0)
}

/// Round to two decimal places, the precision reports are published with.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub total_sessions: u64,
    pub finalized_sessions: u64,
    pub cancelled_sessions: u64,
    pub open_sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorMetrics {
    pub operator_id: OperatorId,
    pub operator_name: String,
    pub total_sessions: u64,
    pub finalized_sessions: u64,
    pub cancelled_sessions: u64,
    pub avg_duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralMetrics {
    #[serde(flatten)]
    pub counts: SessionCounts,
    pub avg_duration_minutes: f64,
    pub fastest_operators: Vec<OperatorMetrics>,
    pub per_operator: Vec<OperatorMetrics>,
}

/// One line of the session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub session_id: SessionId,
    pub operator_name: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
    pub reading_rows: u64,
    pub total_units: u64,
}

/// Sessions inside `range`, ordered by start time (stable for equal starts).
fn matching<'a>(sessions: &'a [Session], range: &DateRange) -> Vec<&'a Session> {
    let mut out: Vec<&Session> = sessions.iter().filter(|s| range.contains(s.started_at)).collect();
    out.sort_by_key(|s| s.started_at);
    out
}

fn count<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> SessionCounts {
    sessions.into_iter().fold(SessionCounts::default(), |mut c, s| {
        c.total_sessions += 1;
        match s.status {
            SessionStatus::Open => c.open_sessions += 1,
            SessionStatus::Finalized => c.finalized_sessions += 1,
            SessionStatus::Cancelled => c.cancelled_sessions += 1,
        }
        c
    })
}

/// Mean duration of finalized sessions that have an end time; 0.0 if none.
fn average_finalized_duration<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> f64 {
    let durations: Vec<f64> = sessions
        .into_iter()
        .filter(|s| s.status == SessionStatus::Finalized)
        .filter_map(duration_minutes)
        .collect();

    if durations.is_empty() {
        return 0.0;
    }
    durations.iter().sum::<f64>() / durations.len() as f64
}

/// Status counts for sessions started inside `range`.
pub fn session_counts(sessions: &[Session], range: &DateRange) -> SessionCounts {
    count(matching(sessions, range))
}

/// Statistics for one operator's sessions inside `range`.
///
/// `operator_name` is the resolved display name; `None` falls back to
/// [`UNKNOWN_OPERATOR`].
pub fn operator_metrics(
    operator_id: OperatorId,
    operator_name: Option<&str>,
    sessions: &[Session],
    range: &DateRange,
) -> OperatorMetrics {
    let own: Vec<&Session> = matching(sessions, range)
        .into_iter()
        .filter(|s| s.operator_id == operator_id)
        .collect();
    let counts = count(own.iter().copied());

    OperatorMetrics {
        operator_id,
        operator_name: operator_name.unwrap_or(UNKNOWN_OPERATOR).to_string(),
        total_sessions: counts.total_sessions,
        finalized_sessions: counts.finalized_sessions,
        cancelled_sessions: counts.cancelled_sessions,
        avg_duration_minutes: round2(average_finalized_duration(own)),
    }
}

/// Dashboard metrics for sessions started inside `range`.
///
/// Operators appear in order of their earliest matching session; the fastest
/// ranking keeps that order for equal averages.
pub fn general_metrics(
    sessions: &[Session],
    range: &DateRange,
    operator_names: &HashMap<OperatorId, String>,
) -> GeneralMetrics {
    let in_range = matching(sessions, range);

    let mut operators: Vec<OperatorId> = Vec::new();
    for s in &in_range {
        if !operators.contains(&s.operator_id) {
            operators.push(s.operator_id);
        }
    }

    let per_operator: Vec<OperatorMetrics> = operators
        .into_iter()
        .map(|id| {
            operator_metrics(
                id,
                operator_names.get(&id).map(String::as_str),
                sessions,
                range,
            )
        })
        .collect();

    let mut fastest: Vec<OperatorMetrics> = per_operator
        .iter()
        .filter(|m| m.avg_duration_minutes > 0.0)
        .cloned()
        .collect();
    fastest.sort_by(|a, b| a.avg_duration_minutes.total_cmp(&b.avg_duration_minutes));
    fastest.truncate(FASTEST_OPERATORS_LIMIT);

    GeneralMetrics {
        counts: count(in_range.iter().copied()),
        avg_duration_minutes: round2(average_finalized_duration(in_range)),
        fastest_operators: fastest,
        per_operator,
    }
}

/// One row per session started inside `range`, newest first.
///
/// `duration_minutes` is `None` for open sessions and for sessions that ended
/// the instant they started.
///
/// Sessions missing from `totals` have no readings.
pub fn report_rows(
    sessions: &[Session],
    range: &DateRange,
    operator_names: &HashMap<OperatorId, String>,
    totals: &HashMap<SessionId, ReadingTotals>,
) -> Vec<ReportRow> {
    let mut rows: Vec<&Session> = matching(sessions, range);
    rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    rows.into_iter()
        .map(|s| {
            let t = totals.get(&s.id).copied().unwrap_or_default();
            ReportRow {
                session_id: s.id,
                operator_name: operator_names
                    .get(&s.operator_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_OPERATOR.to_string()),
                status: s.status,
                started_at: s.started_at,
                ended_at: s.ended_at,
                // A zero-length session reports no duration.
                duration_minutes: duration_minutes(s).filter(|d| *d != 0.0).map(round2),
                reading_rows: t.reading_rows,
                total_units: t.total_units,
            }
        })
        .collect()
}
