//! Record qualification: which records of a chart satisfy one filter.
//!
//! Chosen filters are an exact lookup in the store's `filter -> records`
//! index. Implied filters go one of two ways:
//!
//! - computed: `⋃ { records holding cf | cf ∈ resolve(filter) }`, costing one
//!   bitmap union per implying chosen filter. Filters implied by thousands of
//!   chosen filters make this the dominant cost of ladder evaluation.
//! - materialized: one bitmap lookup in the materialized index.
//!
//! Both return identical sets for the same store state. User-defined implied
//! filters are never materialized and always take the computed path.

use ladder_catalog::{ChartId, EntityStore, Filter, FilterId, FilterKind};
use roaring::RoaringBitmap;

use crate::config::QualifyStrategy;
use crate::error::{EngineError, Result};
use crate::materialize::MaterializationManager;
use crate::resolver::ImplicationResolver;

/// Path actually taken for one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifyPath {
    Chosen,
    Computed,
    Materialized,
}

pub struct RecordQualifier<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    materializer: Option<&'a MaterializationManager>,
    strategy: QualifyStrategy,
}

impl<'a, S: EntityStore + ?Sized> RecordQualifier<'a, S> {
    /// `strategy` must not be `Materialized` without a materializer; the
    /// engine validates this before building a qualifier.
    pub fn new(
        store: &'a S,
        materializer: Option<&'a MaterializationManager>,
        strategy: QualifyStrategy,
    ) -> Self {
        Self {
            store,
            materializer,
            strategy,
        }
    }

    /// Records of `chart` satisfying `filter`.
    pub fn qualify(&self, chart: ChartId, filter: FilterId) -> Result<RoaringBitmap> {
        let records = self
            .store
            .records_in_chart(chart)
            .ok_or_else(|| EngineError::not_found(chart))?;
        Ok(self.qualify_within(&records, filter)?.0)
    }

    /// Subset of `within` satisfying `filter`, and the path used.
    pub(crate) fn qualify_within(
        &self,
        within: &RoaringBitmap,
        filter_id: FilterId,
    ) -> Result<(RoaringBitmap, QualifyPath)> {
        let filter = self
            .store
            .filter(filter_id)
            .ok_or_else(|| EngineError::not_found(filter_id))?;

        match filter.kind {
            FilterKind::Chosen => Ok((
                self.store.records_holding(filter_id) & within,
                QualifyPath::Chosen,
            )),
            FilterKind::Implied { .. } => self.qualify_implied(within, &filter),
        }
    }

    fn qualify_implied(
        &self,
        within: &RoaringBitmap,
        filter: &Filter,
    ) -> Result<(RoaringBitmap, QualifyPath)> {
        let materializer = match self.materializer {
            Some(m) if !filter.is_user_defined() => Some(m),
            _ => None,
        };
        let resolver = ImplicationResolver::new(self.store);

        let chosen = match (self.strategy, materializer) {
            (QualifyStrategy::Materialized, Some(m)) => {
                return Ok(self.materialized(m, within, filter.id));
            }
            (QualifyStrategy::Adaptive { threshold }, Some(m)) => {
                let chosen = resolver.resolve_filter(filter)?;
                if chosen.len() > threshold as u64 {
                    return Ok(self.materialized(m, within, filter.id));
                }
                chosen
            }
            _ => resolver.resolve_filter(filter)?,
        };

        let mut out = RoaringBitmap::new();
        for raw in chosen.iter() {
            out |= self.store.records_holding(FilterId::new(raw)) & within;
        }
        Ok((out, QualifyPath::Computed))
    }

    fn materialized(
        &self,
        materializer: &MaterializationManager,
        within: &RoaringBitmap,
        filter: FilterId,
    ) -> (RoaringBitmap, QualifyPath) {
        (
            materializer.records_satisfying(self.store, filter, within),
            QualifyPath::Materialized,
        )
    }
}
