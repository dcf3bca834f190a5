use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stocktake_audit::{DateRange, NewSessionEvent, ScanReading, Session, SessionDetail};
use stocktake_core::{OperatorId, ProductId, SessionId};
use stocktake_infra::{EventFilter, Page, Pagination, ReadingFilter};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Operator username or id.
    pub operator: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    pub tag_id: String,
    pub product_code: String,
    pub scanned_at: DateTime<Utc>,
}

impl From<ReadingRequest> for ScanReading {
    fn from(value: ReadingRequest) -> Self {
        ScanReading::new(value.tag_id, value.product_code, value.scanned_at)
    }
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<EventRequest> for NewSessionEvent {
    fn from(value: EventRequest) -> Self {
        NewSessionEvent::new(value.kind, value.description, value.occurred_at)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadingListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub product_id: Option<String>,
    pub category_code: Option<String>,
}

impl ReadingListQuery {
    pub fn into_parts(self) -> Result<(ReadingFilter, Pagination), axum::response::Response> {
        let product_id = self
            .product_id
            .map(|raw| parse_id::<ProductId>(&raw))
            .transpose()?;
        Ok((
            ReadingFilter {
                product_id,
                category_code: self.category_code,
            },
            Pagination::new(self.limit, self.offset),
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub kind: Option<String>,
}

impl EventListQuery {
    pub fn into_parts(self) -> (EventFilter, Pagination) {
        (
            EventFilter { kind: self.kind },
            Pagination::new(self.limit, self.offset),
        )
    }
}

/// `start`/`end` accept RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A
/// plain end date covers the whole day.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeQuery {
    pub fn to_range(&self) -> Result<DateRange, axum::response::Response> {
        let start = self
            .start
            .as_deref()
            .map(|raw| parse_instant(raw, false))
            .transpose()?;
        let end = self
            .end
            .as_deref()
            .map(|raw| parse_instant(raw, true))
            .transpose()?;
        DateRange::new(start, end).map_err(|e| errors::validation_error(e.to_string()))
    }
}

fn parse_instant(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, axum::response::Response> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| errors::validation_error(format!("invalid date '{raw}'")))?;
    let at = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    at.map(|naive| naive.and_utc())
        .ok_or_else(|| errors::validation_error(format!("invalid date '{raw}'")))
}

pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr<Err = stocktake_core::DomainError>,
{
    raw.parse::<T>()
        .map_err(|e| errors::json_error(axum::http::StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

pub fn parse_session_id(raw: &str) -> Result<SessionId, axum::response::Response> {
    parse_id::<SessionId>(raw)
}

pub fn parse_operator_id(raw: &str) -> Result<OperatorId, axum::response::Response> {
    parse_id::<OperatorId>(raw)
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn session_to_json(session: &Session) -> serde_json::Value {
    serde_json::json!({
        "id": session.id.to_string(),
        "operator_id": session.operator_id.to_string(),
        "status": session.status.as_str(),
        "started_at": session.started_at,
        "ended_at": session.ended_at,
        "created_at": session.created_at,
        "duration_minutes": session.duration_minutes(),
    })
}

pub fn detail_to_json(detail: &SessionDetail) -> serde_json::Value {
    let mut value = session_to_json(&detail.session);
    value["readings"] = serde_json::json!(detail.readings);
    value["events"] = serde_json::json!(detail.events);
    value["total_units"] = serde_json::json!(detail.total_units());
    value
}

pub fn page_to_json<T: Serialize>(page: &Page<T>) -> serde_json::Value {
    serde_json::json!({
        "items": page.items,
        "count": page.items.len(),
        "total": page.total,
        "limit": page.pagination.limit,
        "offset": page.pagination.offset,
        "has_more": page.has_more,
    })
}
