use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{DomainError, DomainResult, ProductId, SessionId};

use crate::directory::Product;

/// One tag observation submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReading {
    pub tag_id: String,
    pub product_code: String,
    pub scanned_at: DateTime<Utc>,
}

impl ScanReading {
    pub fn new(
        tag_id: impl Into<String>,
        product_code: impl Into<String>,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tag_id: tag_id.into(),
            product_code: product_code.into(),
            scanned_at,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.tag_id.trim().is_empty() {
            return Err(DomainError::validation("tag_id cannot be empty"));
        }
        if self.product_code.trim().is_empty() {
            return Err(DomainError::validation("product_code cannot be empty"));
        }
        Ok(())
    }
}

/// A reading whose product has been looked up in the catalog.
///
/// `product` is `None` when the code did not resolve. That only becomes an
/// error if the tag turns out to be new; duplicates are skipped before the
/// product matters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScan {
    pub reading: ScanReading,
    pub product: Option<Product>,
}

/// Running count of accepted scans for one product within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingAggregate {
    pub session_id: SessionId,
    pub product_id: ProductId,
    pub category_code: String,
    pub quantity: u64,
    pub last_scanned_at: DateTime<Utc>,
}

impl ReadingAggregate {
    /// Row created by the first accepted scan of a product in a session.
    pub fn first_scan(session_id: SessionId, product: &Product, scanned_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            product_id: product.id,
            category_code: product.category_code.clone(),
            quantity: 1,
            last_scanned_at: scanned_at,
        }
    }

    /// Count one more accepted scan. The timestamp follows the latest
    /// contributing reading as reported by the client.
    pub fn record_scan(&mut self, scanned_at: DateTime<Utc>) {
        self.record_scans(1, scanned_at);
    }

    /// Count `count` accepted scans at once; `scanned_at` is the last of them.
    pub fn record_scans(&mut self, count: u64, scanned_at: DateTime<Utc>) {
        self.quantity += count;
        self.last_scanned_at = scanned_at;
    }
}

/// Distinct aggregate rows and summed units for one session.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingTotals {
    pub reading_rows: u64,
    pub total_units: u64,
}

impl ReadingTotals {
    pub fn from_aggregates<'a>(rows: impl IntoIterator<Item = &'a ReadingAggregate>) -> Self {
        rows.into_iter().fold(Self::default(), |acc, r| Self {
            reading_rows: acc.reading_rows + 1,
            total_units: acc.total_units + r.quantity,
        })
    }
}
