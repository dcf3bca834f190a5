//! Batch planning shared by the store implementations.
//!
//! A batch is applied in two fixed phases: accept the distinct tag ids in
//! sorted order, then bump one aggregate per product in ascending product
//! order. Every batch takes its locks in the same order, so concurrent
//! batches wait on each other instead of deadlocking.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use stocktake_audit::{Product, ReadingAggregate, ResolvedScan};
use stocktake_core::{ProductId, SessionId};

use super::r#trait::{ScanOutcome, StoreError};

/// Distinct tag ids of a batch, sorted.
pub(crate) fn distinct_tags(scans: &[ResolvedScan]) -> Vec<String> {
    let mut tags: Vec<String> = scans.iter().map(|s| s.reading.tag_id.clone()).collect();
    tags.sort_unstable();
    tags.dedup();
    tags
}

/// Accepted scans of one product within a batch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Increment<'a> {
    pub product: &'a Product,
    pub count: u64,
    /// Client timestamp of the last counted reading, in request order.
    pub last_scanned_at: DateTime<Utc>,
}

impl Increment<'_> {
    /// Aggregate row for a product this session has not counted yet.
    pub fn new_row(&self, session_id: SessionId) -> ReadingAggregate {
        let mut row = ReadingAggregate::first_scan(session_id, self.product, self.last_scanned_at);
        row.record_scans(self.count - 1, self.last_scanned_at);
        row
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScanPlan<'a> {
    /// Tags this batch counts, in request order.
    pub accepted_tags: Vec<&'a str>,
    /// Keyed (and therefore iterated) in ascending product order.
    pub increments: BTreeMap<ProductId, Increment<'a>>,
    pub outcome: ScanOutcome,
}

/// Decide every scan of a batch.
///
/// `fresh` holds the tags that were not accepted before this batch. A scan
/// counts when its tag is fresh and has not already counted earlier in the
/// same batch; everything else is a duplicate. A counted scan without a
/// product fails the whole batch.
pub(crate) fn plan_scans<'a>(
    scans: &'a [ResolvedScan],
    fresh: &HashSet<String>,
) -> Result<ScanPlan<'a>, StoreError> {
    let mut plan = ScanPlan::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for scan in scans {
        let tag = scan.reading.tag_id.as_str();
        if !fresh.contains(tag) || !seen.insert(tag) {
            plan.outcome.duplicates += 1;
            continue;
        }
        let product = scan
            .product
            .as_ref()
            .ok_or_else(|| StoreError::UnknownProduct(scan.reading.product_code.clone()))?;

        plan.accepted_tags.push(tag);
        plan.increments
            .entry(product.id)
            .and_modify(|inc| {
                inc.count += 1;
                inc.last_scanned_at = scan.reading.scanned_at;
            })
            .or_insert(Increment {
                product,
                count: 1,
                last_scanned_at: scan.reading.scanned_at,
            });
        plan.outcome.accepted += 1;
    }

    Ok(plan)
}
