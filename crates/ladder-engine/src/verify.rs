//! Materialized index verification and repair.
//!
//! Verification recomputes each record's implied-filter set from the graph and
//! diffs it against the index. Disagreements are reported, logged and left
//! for [`MaterializationManager::repair`]; they never abort the caller.

use ladder_catalog::{EntityStore, FilterId, RecordId};
use roaring::RoaringBitmap;

use crate::error::{EngineError, Result};
use crate::materialize::{BatchReport, CancelToken, MaterializationManager};
use crate::resolver::ImplicationResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDiscrepancy {
    pub record: RecordId,
    /// Implied by the record's chosen filters but absent from the index.
    pub missing: Vec<FilterId>,
    /// In the index but no longer implied.
    pub stale: Vec<FilterId>,
}

impl From<IndexDiscrepancy> for EngineError {
    fn from(d: IndexDiscrepancy) -> Self {
        EngineError::InconsistentIndex {
            record: d.record,
            missing: d.missing,
            stale: d.stale,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub checked: usize,
    /// Queued records, skipped because their staleness is already known.
    pub pending: usize,
    pub discrepancies: Vec<IndexDiscrepancy>,
    /// Records whose ground truth could not be computed.
    pub unverifiable: Vec<(RecordId, String)>,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty() && self.unverifiable.is_empty()
    }

    pub fn records(&self) -> RoaringBitmap {
        self.discrepancies
            .iter()
            .map(|d| d.record.raw())
            .chain(self.unverifiable.iter().map(|(r, _)| r.raw()))
            .collect()
    }
}

fn to_filters(bitmap: &RoaringBitmap) -> Vec<FilterId> {
    bitmap.iter().map(FilterId::new).collect()
}

impl MaterializationManager {
    fn diff<S>(&self, store: &S, record: RecordId) -> Result<Option<IndexDiscrepancy>>
    where
        S: EntityStore + ?Sized,
    {
        let truth = match store.record(record) {
            Some(current) => ImplicationResolver::new(store).materialized_set(&current)?,
            None => RoaringBitmap::new(),
        };
        let actual = self.implied_of(record).unwrap_or_default();
        if truth == actual {
            return Ok(None);
        }
        Ok(Some(IndexDiscrepancy {
            record,
            missing: to_filters(&(&truth - &actual)),
            stale: to_filters(&(&actual - &truth)),
        }))
    }

    /// Compare every stored and every materialized record with its ground truth.
    pub fn verify<S>(&self, store: &S) -> VerificationReport
    where
        S: EntityStore + ?Sized,
    {
        let pending = self.pending_records();
        let records = (store.record_ids() | self.index.read().records()) - &pending;

        let mut report = VerificationReport {
            pending: pending.len() as usize,
            ..VerificationReport::default()
        };
        for raw in records.iter() {
            let record = RecordId::new(raw);
            report.checked += 1;
            match self.diff(store, record) {
                Ok(None) => {}
                Ok(Some(discrepancy)) => {
                    tracing::warn!(
                        %record,
                        missing = ?discrepancy.missing,
                        stale = ?discrepancy.stale,
                        "materialized index disagrees with implication graph"
                    );
                    report.discrepancies.push(discrepancy);
                }
                Err(err) => {
                    tracing::warn!(%record, error = %err, "could not verify record");
                    report.unverifiable.push((record, err.to_string()));
                }
            }
        }
        report
    }

    /// Verify a single record, failing with `InconsistentIndex`. A queued
    /// record passes, as in [`verify`](Self::verify): reads already overlay it.
    pub fn check_record<S>(&self, store: &S, record: RecordId) -> Result<()>
    where
        S: EntityStore + ?Sized,
    {
        if store.record(record).is_none() && self.implied_of(record).is_none() {
            return Err(EngineError::not_found(record));
        }
        if self.pending_records().contains(record.raw()) {
            return Ok(());
        }
        match self.diff(store, record)? {
            None => Ok(()),
            Some(discrepancy) => Err(discrepancy.into()),
        }
    }

    /// Recompute the records a verification flagged.
    pub fn repair<S>(&self, store: &S, report: &VerificationReport) -> BatchReport
    where
        S: EntityStore + ?Sized,
    {
        self.run_batch(store, &report.records(), &CancelToken::new())
    }
}
