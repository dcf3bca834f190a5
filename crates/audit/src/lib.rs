//! Inventory audit domain.
//!
//! Session lifecycle rules, scan aggregation values, the session event log
//! entries and the metrics computed over finished sessions. Pure logic only
//! (no IO, no HTTP, no storage).

pub mod directory;
pub mod event;
pub mod metrics;
pub mod range;
pub mod reading;
pub mod session;

pub use directory::{Operator, Product, UNKNOWN_OPERATOR};
pub use event::{NewSessionEvent, SessionEvent};
pub use metrics::{GeneralMetrics, OperatorMetrics, ReportRow, SessionCounts};
pub use range::DateRange;
pub use reading::{ReadingAggregate, ReadingTotals, ResolvedScan, ScanReading};
pub use session::{Session, SessionDetail, SessionStatus};
