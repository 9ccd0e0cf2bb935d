//! `LadderEngine`: the read API and write hooks offered to the rest of the
//! site (rankings views, filter dropdowns, filter authoring, submissions).

use std::sync::Arc;
use std::thread::JoinHandle;

use ladder_catalog::{ChartId, EntityStore, Filter, FilterId, LadderId, RecordId};
use roaring::RoaringBitmap;

use crate::config::{EngineConfig, QualifyStrategy};
use crate::error::{EngineError, Result};
use crate::evaluator::{Evaluation, LadderEvaluator, RankedRecord};
use crate::materialize::{BatchReport, CancelToken, MaterializationManager};
use crate::qualifier::RecordQualifier;
use crate::resolver::ImplicationResolver;
use crate::verify::VerificationReport;

pub struct LadderEngine<S: EntityStore> {
    store: Arc<S>,
    config: EngineConfig,
    materializer: Option<Arc<MaterializationManager>>,
}

impl<S: EntityStore + 'static> LadderEngine<S> {
    /// Build an engine over `store`. With materialization enabled the index
    /// is built from scratch before this returns.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let materializer = if config.materialization.enabled {
            let manager = Arc::new(MaterializationManager::new(
                config.materialization.clone(),
            ));
            let report = manager.rebuild_all(store.as_ref(), &CancelToken::new());
            tracing::info!(
                records = report.updated + report.unchanged,
                failed = report.failed.len(),
                "materialized index built"
            );
            Some(manager)
        } else {
            None
        };
        Ok(Self {
            store,
            config,
            materializer,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn materializer(&self) -> Option<&Arc<MaterializationManager>> {
        self.materializer.as_ref()
    }

    fn require_materializer(&self) -> Result<&Arc<MaterializationManager>> {
        self.materializer
            .as_ref()
            .ok_or_else(|| EngineError::Config("materialization is disabled".to_string()))
    }

    fn qualifier(&self, strategy: QualifyStrategy) -> Result<RecordQualifier<'_, S>> {
        if strategy == QualifyStrategy::Materialized && self.materializer.is_none() {
            return Err(EngineError::Config(
                "materialized strategy requires materialization.enabled".to_string(),
            ));
        }
        Ok(RecordQualifier::new(
            self.store.as_ref(),
            self.materializer.as_deref(),
            strategy,
        ))
    }

    fn evaluator(&self) -> Result<LadderEvaluator<'_, S>> {
        Ok(LadderEvaluator::new(
            self.store.as_ref(),
            self.qualifier(self.config.strategy)?,
        ))
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Chosen filters (raw ids) implying `implied`.
    pub fn resolve(&self, implied: FilterId) -> Result<RoaringBitmap> {
        ImplicationResolver::new(self.store.as_ref()).resolve(implied)
    }

    /// Records (raw ids) of `chart` satisfying `filter`.
    pub fn qualify(&self, chart: ChartId, filter: FilterId) -> Result<RoaringBitmap> {
        self.qualify_with(chart, filter, self.config.strategy)
    }

    /// `qualify` with an explicit strategy for implied filters.
    pub fn qualify_with(
        &self,
        chart: ChartId,
        filter: FilterId,
        strategy: QualifyStrategy,
    ) -> Result<RoaringBitmap> {
        self.qualifier(strategy)?.qualify(chart, filter)
    }

    /// Records (raw ids) of `chart` satisfying every rule filter of `ladder`.
    pub fn evaluate(&self, chart: ChartId, ladder: LadderId) -> Result<RoaringBitmap> {
        Ok(self.evaluate_traced(chart, ladder)?.records)
    }

    pub fn evaluate_traced(&self, chart: ChartId, ladder: LadderId) -> Result<Evaluation> {
        self.evaluator()?.evaluate(chart, ladder)
    }

    /// Evaluated records in ranking order.
    pub fn rank(&self, chart: ChartId, ladder: LadderId) -> Result<Vec<RankedRecord>> {
        self.evaluator()?.rank(chart, ladder)
    }

    /// Materialized implied filters of a record, if it is indexed.
    pub fn materialized(&self, record: RecordId) -> Option<RoaringBitmap> {
        self.materializer.as_ref()?.implied_of(record)
    }

    // ========================================================================
    // Write hooks
    // ========================================================================

    fn schedule(&self, records: RoaringBitmap) -> BatchReport {
        match &self.materializer {
            Some(manager) => manager.schedule(self.store.as_ref(), records),
            None => BatchReport::default(),
        }
    }

    /// Kind check for an implication edge; returns the implied filter.
    fn check_edge(&self, chosen: FilterId, implied: FilterId) -> Result<Filter> {
        let rejected = |reason: String| EngineError::CyclicImplication {
            chosen,
            implied,
            reason,
        };
        if chosen == implied {
            return Err(rejected("a filter cannot imply itself".to_string()));
        }
        let source = self
            .store
            .filter(chosen)
            .ok_or_else(|| EngineError::not_found(chosen))?;
        let target = self
            .store
            .filter(implied)
            .ok_or_else(|| EngineError::not_found(implied))?;
        if !source.is_chosen() {
            return Err(rejected(format!("source {chosen} is an implied filter")));
        }
        if !target.is_implied() {
            return Err(rejected(format!("target {implied} is a chosen filter")));
        }
        Ok(target)
    }

    /// Trigger 1: a record was created or its chosen filters changed.
    pub fn on_record_chosen_filters_changed(&self, record: RecordId) -> Result<BatchReport> {
        if self.store.record(record).is_none() {
            return Err(EngineError::not_found(record));
        }
        let mut records = RoaringBitmap::new();
        records.insert(record.raw());
        Ok(self.schedule(records))
    }

    /// A record was deleted from the store.
    pub fn on_record_removed(&self, record: RecordId) {
        if let Some(manager) = &self.materializer {
            manager.forget(record);
        }
    }

    /// Trigger 2: `chosen -> implied` was added.
    pub fn on_implication_edge_added(
        &self,
        chosen: FilterId,
        implied: FilterId,
    ) -> Result<BatchReport> {
        let target = self.check_edge(chosen, implied)?;
        if target.is_user_defined() {
            return Ok(BatchReport::default());
        }
        Ok(self.schedule(self.store.records_holding(chosen)))
    }

    /// Trigger 3: `chosen -> implied` was removed.
    pub fn on_implication_edge_removed(
        &self,
        chosen: FilterId,
        implied: FilterId,
    ) -> Result<BatchReport> {
        let target = self.check_edge(chosen, implied)?;
        if target.is_user_defined() {
            return Ok(BatchReport::default());
        }
        Ok(self.schedule(self.store.records_holding(chosen)))
    }

    /// Trigger 2 for a new implied filter created together with its edges.
    pub fn on_implied_filter_created(&self, implied: FilterId) -> Result<BatchReport> {
        let filter = self
            .store
            .filter(implied)
            .ok_or_else(|| EngineError::not_found(implied))?;
        if !filter.is_implied() {
            return Err(EngineError::WrongFilterKind {
                filter: implied,
                expected: "an implied",
            });
        }
        if filter.is_user_defined() {
            return Ok(BatchReport::default());
        }
        let mut affected = RoaringBitmap::new();
        for raw in self.store.implying(implied).iter() {
            affected |= self.store.records_holding(FilterId::new(raw));
        }
        Ok(self.schedule(affected))
    }

    /// Recompute every queued record.
    pub fn flush(&self) -> BatchReport {
        match &self.materializer {
            Some(manager) => manager.flush(self.store.as_ref()),
            None => BatchReport::default(),
        }
    }

    /// Number of queued records.
    pub fn pending(&self) -> usize {
        self.materializer
            .as_ref()
            .map_or(0, |manager| manager.pending_len())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub fn verify(&self) -> Result<VerificationReport> {
        Ok(self.require_materializer()?.verify(self.store.as_ref()))
    }

    pub fn check_record(&self, record: RecordId) -> Result<()> {
        self.require_materializer()?
            .check_record(self.store.as_ref(), record)
    }

    pub fn repair(&self, report: &VerificationReport) -> Result<BatchReport> {
        Ok(self
            .require_materializer()?
            .repair(self.store.as_ref(), report))
    }

    /// Recompute the whole index on the calling thread.
    pub fn rebuild_materialization(&self) -> Result<BatchReport> {
        Ok(self
            .require_materializer()?
            .rebuild_all(self.store.as_ref(), &CancelToken::new()))
    }

    /// Recompute `records` (default: every record) on a background thread.
    pub fn spawn_rebuild(
        &self,
        records: Option<RoaringBitmap>,
        cancel: CancelToken,
    ) -> Result<JoinHandle<BatchReport>> {
        let manager = self.require_materializer()?;
        let records = match records {
            Some(records) => records,
            None => self.store.record_ids() | manager.index.read().records(),
        };
        Ok(manager.spawn_batch(Arc::clone(&self.store), records, cancel)?)
    }
}
