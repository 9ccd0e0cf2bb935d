//! Materialized implied-filter index.
//!
//! For every record the index stores
//!
//! ```text
//! materialized(record) = ⋃ { implied_by(cf) | cf ∈ record.chosen_filters }
//!                        minus user-defined implied filters
//! ```
//!
//! together with the inverse `implied filter -> {records}` bitmaps that the
//! record qualifier reads. The index is a cache: the implication graph stays
//! authoritative, and every write that can change the image of a record's
//! chosen filters must be reported through a trigger:
//!
//! 1. a record's chosen filters changed
//! 2. implication edges were added (including a freshly created implied filter)
//! 3. an implication edge was removed
//!
//! Recomputing a record happens under a per-record lock and swaps the record's
//! whole set in one index write, so concurrent readers see either the old or
//! the new set, never a mix. Batches check their [`CancelToken`] between
//! records, which gives the same guarantee for cancelled jobs.
//!
//! In deferred mode triggers only queue record ids. Records a batch could not
//! finish (failed or cancelled) are queued too. Queued records are answered
//! from the graph at read time until a flush recomputes them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use ahash::AHashMap;
use dashmap::DashMap;
use ladder_catalog::{EntityStore, FilterId, RecordId};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::config::{MaterializationConfig, TriggerMode};
use crate::error::Result;
use crate::resolver::ImplicationResolver;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MaterializedIndex {
    by_record: AHashMap<RecordId, RoaringBitmap>,
    by_filter: AHashMap<FilterId, RoaringBitmap>,
}

impl MaterializedIndex {
    /// Implied filters (raw ids) materialized for a record.
    pub fn implied_of(&self, record: RecordId) -> Option<&RoaringBitmap> {
        self.by_record.get(&record)
    }

    /// Records (raw ids) materialized as satisfying `filter`.
    pub fn records_with(&self, filter: FilterId) -> Option<&RoaringBitmap> {
        self.by_filter.get(&filter)
    }

    /// Number of materialized records.
    pub fn len(&self) -> usize {
        self.by_record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_record.is_empty()
    }

    pub fn records(&self) -> RoaringBitmap {
        self.by_record.keys().map(|r| r.raw()).collect()
    }

    /// Returns `true` if the stored set changed.
    fn replace(&mut self, record: RecordId, implied: RoaringBitmap) -> bool {
        let old = match self.by_record.get(&record) {
            Some(old) if *old == implied => return false,
            Some(old) => old.clone(),
            None => RoaringBitmap::new(),
        };
        for raw in (&old - &implied).iter() {
            self.unlink(FilterId::new(raw), record);
        }
        for raw in (&implied - &old).iter() {
            self.by_filter
                .entry(FilterId::new(raw))
                .or_default()
                .insert(record.raw());
        }
        self.by_record.insert(record, implied);
        true
    }

    fn remove(&mut self, record: RecordId) -> bool {
        let Some(old) = self.by_record.remove(&record) else {
            return false;
        };
        for raw in old.iter() {
            self.unlink(FilterId::new(raw), record);
        }
        true
    }

    fn unlink(&mut self, filter: FilterId, record: RecordId) {
        if let Some(records) = self.by_filter.get_mut(&filter) {
            records.remove(record.raw());
            if records.is_empty() {
                self.by_filter.remove(&filter);
            }
        }
    }
}

/// Cooperative cancellation flag shared with a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one batch of record recomputations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records whose materialized set changed.
    pub updated: usize,
    /// Records recomputed to the same set.
    pub unchanged: usize,
    /// Records dropped from the index because the store no longer has them.
    pub removed: usize,
    /// Records that could not be recomputed, with the reason.
    pub failed: Vec<(RecordId, String)>,
    /// Records left untouched because the batch was cancelled.
    pub skipped: Vec<RecordId>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Records to retry: failed plus skipped, sorted.
    pub fn unresolved(&self) -> Vec<RecordId> {
        let mut out: Vec<RecordId> = self
            .failed
            .iter()
            .map(|(r, _)| *r)
            .chain(self.skipped.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Updated,
    Unchanged,
    Removed,
}

pub struct MaterializationManager {
    config: MaterializationConfig,
    pub(crate) index: RwLock<MaterializedIndex>,
    pub(crate) record_locks: DashMap<RecordId, Arc<Mutex<()>>>,
    /// Deferred-mode queue: record -> enqueue epoch.
    pending: Mutex<AHashMap<RecordId, u64>>,
    epoch: AtomicU64,
}

impl MaterializationManager {
    pub fn new(config: MaterializationConfig) -> Self {
        Self {
            config,
            index: RwLock::new(MaterializedIndex::default()),
            record_locks: DashMap::new(),
            pending: Mutex::new(AHashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MaterializationConfig {
        &self.config
    }

    /// Copy of the current index.
    pub fn snapshot(&self) -> MaterializedIndex {
        self.index.read().clone()
    }

    pub fn implied_of(&self, record: RecordId) -> Option<RoaringBitmap> {
        self.index.read().implied_of(record).cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn pending_records(&self) -> RoaringBitmap {
        self.pending.lock().keys().map(|r| r.raw()).collect()
    }

    fn record_lock(&self, record: RecordId) -> Arc<Mutex<()>> {
        self.record_locks.entry(record).or_default().clone()
    }

    /// Drop a pending entry, unless it was re-queued after `seen` was read.
    /// Callers hold the index write lock.
    fn clear_pending(&self, record: RecordId, seen: Option<u64>) {
        let mut pending = self.pending.lock();
        if seen.is_some() && pending.get(&record).copied() == seen {
            pending.remove(&record);
        }
    }

    /// Recompute one record against the store. A record the store no longer
    /// has is removed from the index.
    pub(crate) fn recompute<S>(&self, store: &S, record: RecordId) -> Result<Outcome>
    where
        S: EntityStore + ?Sized,
    {
        let lock = self.record_lock(record);
        let _guard = lock.lock();
        let seen = self.pending.lock().get(&record).copied();

        let Some(current) = store.record(record) else {
            let mut index = self.index.write();
            let removed = index.remove(record);
            self.clear_pending(record, seen);
            return Ok(if removed {
                Outcome::Removed
            } else {
                Outcome::Unchanged
            });
        };

        let implied = ImplicationResolver::new(store).materialized_set(&current)?;
        let mut index = self.index.write();
        let changed = index.replace(record, implied);
        self.clear_pending(record, seen);
        Ok(if changed {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        })
    }

    /// Remove a record from the index, the queue and the lock table.
    pub fn forget(&self, record: RecordId) {
        let lock = self.record_lock(record);
        {
            let _guard = lock.lock();
            let mut index = self.index.write();
            index.remove(record);
            self.pending.lock().remove(&record);
        }
        self.record_locks.remove(&record);
    }

    /// Recompute `records` in parallel. Failures are collected, never
    /// propagated, so one bad record cannot block the rest.
    pub fn run_batch<S>(&self, store: &S, records: &RoaringBitmap, cancel: &CancelToken) -> BatchReport
    where
        S: EntityStore + ?Sized,
    {
        let ids: Vec<RecordId> = records.iter().map(RecordId::new).collect();
        let results: Vec<(RecordId, Option<Result<Outcome>>)> = ids
            .into_par_iter()
            .map(|record| {
                if cancel.is_cancelled() {
                    (record, None)
                } else {
                    (record, Some(self.recompute(store, record)))
                }
            })
            .collect();

        let mut report = BatchReport::default();
        for (record, result) in results {
            match result {
                None => report.skipped.push(record),
                Some(Ok(Outcome::Updated)) => report.updated += 1,
                Some(Ok(Outcome::Unchanged)) => report.unchanged += 1,
                Some(Ok(Outcome::Removed)) => report.removed += 1,
                Some(Err(err)) => {
                    tracing::warn!(%record, error = %err, "materialization failed for record");
                    report.failed.push((record, err.to_string()));
                }
            }
        }

        // Unresolved records stay queued: reads answer them from the graph
        // until a later flush succeeds.
        if !report.is_complete() {
            let unresolved: RoaringBitmap =
                report.unresolved().into_iter().map(|r| r.raw()).collect();
            self.enqueue(&unresolved);
        }

        if !report.is_complete() || report.updated > 0 || report.removed > 0 {
            tracing::info!(
                updated = report.updated,
                unchanged = report.unchanged,
                removed = report.removed,
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "materialization batch finished"
            );
        }
        report
    }

    /// Run a batch on a background thread.
    pub fn spawn_batch<S>(
        self: &Arc<Self>,
        store: Arc<S>,
        records: RoaringBitmap,
        cancel: CancelToken,
    ) -> std::io::Result<JoinHandle<BatchReport>>
    where
        S: EntityStore + 'static,
    {
        let manager = Arc::clone(self);
        std::thread::Builder::new()
            .name("ladder_materialize".to_string())
            .spawn(move || manager.run_batch(store.as_ref(), &records, &cancel))
    }

    fn enqueue(&self, records: &RoaringBitmap) -> usize {
        let mut pending = self.pending.lock();
        for raw in records.iter() {
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
            pending.insert(RecordId::new(raw), epoch);
        }
        pending.len()
    }

    /// Apply a trigger's affected records per the configured trigger mode.
    pub fn schedule<S>(&self, store: &S, records: RoaringBitmap) -> BatchReport
    where
        S: EntityStore + ?Sized,
    {
        if records.is_empty() {
            return BatchReport::default();
        }
        match self.config.trigger_mode {
            TriggerMode::Synchronous => self.run_batch(store, &records, &CancelToken::new()),
            TriggerMode::Deferred => {
                let queued = self.enqueue(&records);
                if queued >= self.config.max_pending {
                    self.flush(store)
                } else {
                    BatchReport::default()
                }
            }
        }
    }

    /// Recompute every queued record.
    pub fn flush<S>(&self, store: &S) -> BatchReport
    where
        S: EntityStore + ?Sized,
    {
        let records = self.pending_records();
        if records.is_empty() {
            return BatchReport::default();
        }
        self.run_batch(store, &records, &CancelToken::new())
    }

    /// Recompute every record in the store and drop index entries for
    /// records that no longer exist.
    pub fn rebuild_all<S>(&self, store: &S, cancel: &CancelToken) -> BatchReport
    where
        S: EntityStore + ?Sized,
    {
        let records = store.record_ids() | self.index.read().records();
        self.run_batch(store, &records, cancel)
    }

    /// Records within `within` that the index says satisfy `filter`, with
    /// queued records answered from the graph instead of the index.
    pub fn records_satisfying<S>(
        &self,
        store: &S,
        filter: FilterId,
        within: &RoaringBitmap,
    ) -> RoaringBitmap
    where
        S: EntityStore + ?Sized,
    {
        let index = self.index.read();
        let mut out = index
            .records_with(filter)
            .map(|records| records & within)
            .unwrap_or_default();

        let stale: RoaringBitmap = self
            .pending
            .lock()
            .keys()
            .map(|r| r.raw())
            .filter(|raw| within.contains(*raw))
            .collect();
        if stale.is_empty() {
            return out;
        }

        let implying = store.implying(filter);
        for raw in stale.iter() {
            out.remove(raw);
            let satisfied = store.record(RecordId::new(raw)).map_or(false, |record| {
                record
                    .chosen_filters
                    .iter()
                    .any(|cf| implying.contains(cf.raw()))
            });
            if satisfied {
                out.insert(raw);
            }
        }
        drop(index);
        out
    }
}
