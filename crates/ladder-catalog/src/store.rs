//! Read-only entity access.
//!
//! The evaluation engine consumes the catalog through this trait only. Every
//! method is side-effect free and returns owned data, so implementations can
//! sit behind their own read consistency (locks, snapshots, a database
//! connection) without leaking it to callers.

use roaring::RoaringBitmap;

use crate::ids::{ChartId, ChartTypeId, FilterId, GameId, LadderId, RecordId};
use crate::model::{Chart, ChartType, Filter, Game, Ladder, Record};

pub trait EntityStore: Send + Sync {
    fn game(&self, id: GameId) -> Option<Game>;

    fn ladder(&self, id: LadderId) -> Option<Ladder>;

    fn chart(&self, id: ChartId) -> Option<Chart>;

    fn chart_type(&self, id: ChartTypeId) -> Option<ChartType>;

    fn filter(&self, id: FilterId) -> Option<Filter>;

    fn record(&self, id: RecordId) -> Option<Record>;

    /// Records of a chart, `None` if the chart is unknown.
    fn records_in_chart(&self, chart: ChartId) -> Option<RoaringBitmap>;

    /// Records (across all charts) whose chosen-filter set contains `chosen`.
    fn records_holding(&self, chosen: FilterId) -> RoaringBitmap;

    /// Forward implication edges of a chosen filter.
    fn implied_by(&self, chosen: FilterId) -> RoaringBitmap;

    /// Backward implication edges of an implied filter.
    fn implying(&self, implied: FilterId) -> RoaringBitmap;

    /// Every record id in the store.
    fn record_ids(&self) -> RoaringBitmap;
}

impl<S: EntityStore + ?Sized> EntityStore for std::sync::Arc<S> {
    fn game(&self, id: GameId) -> Option<Game> {
        (**self).game(id)
    }

    fn ladder(&self, id: LadderId) -> Option<Ladder> {
        (**self).ladder(id)
    }

    fn chart(&self, id: ChartId) -> Option<Chart> {
        (**self).chart(id)
    }

    fn chart_type(&self, id: ChartTypeId) -> Option<ChartType> {
        (**self).chart_type(id)
    }

    fn filter(&self, id: FilterId) -> Option<Filter> {
        (**self).filter(id)
    }

    fn record(&self, id: RecordId) -> Option<Record> {
        (**self).record(id)
    }

    fn records_in_chart(&self, chart: ChartId) -> Option<RoaringBitmap> {
        (**self).records_in_chart(chart)
    }

    fn records_holding(&self, chosen: FilterId) -> RoaringBitmap {
        (**self).records_holding(chosen)
    }

    fn implied_by(&self, chosen: FilterId) -> RoaringBitmap {
        (**self).implied_by(chosen)
    }

    fn implying(&self, implied: FilterId) -> RoaringBitmap {
        (**self).implying(implied)
    }

    fn record_ids(&self) -> RoaringBitmap {
        (**self).record_ids()
    }
}
