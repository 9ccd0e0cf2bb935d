//! Ladder evaluation: the conjunction of a ladder's rule filters over one
//! chart's records.

use ladder_catalog::{ChartId, EntityStore, FilterId, LadderId, RankOrder, RecordId, UserId};
use roaring::RoaringBitmap;
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::qualifier::{QualifyPath, RecordQualifier};

/// Result of one evaluation with enough detail to see short-circuiting.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub records: RoaringBitmap,
    /// Rule filters actually qualified, in ladder order.
    pub evaluated: Vec<(FilterId, QualifyPath)>,
    /// The candidate set went empty before every rule filter was evaluated.
    pub short_circuited: bool,
}

impl Evaluation {
    pub fn record_ids(&self) -> Vec<RecordId> {
        self.records.iter().map(RecordId::new).collect()
    }
}

pub struct LadderEvaluator<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    qualifier: RecordQualifier<'a, S>,
}

impl<'a, S: EntityStore + ?Sized> LadderEvaluator<'a, S> {
    pub fn new(store: &'a S, qualifier: RecordQualifier<'a, S>) -> Self {
        Self { store, qualifier }
    }

    /// Records of `chart` satisfying every rule filter of `ladder`.
    ///
    /// Starts from all records of the chart (so an empty rule list returns
    /// them all) and narrows by one rule filter at a time. Once the candidate
    /// set is empty the remaining rule filters are not looked at.
    pub fn evaluate(&self, chart_id: ChartId, ladder_id: LadderId) -> Result<Evaluation> {
        let chart = self
            .store
            .chart(chart_id)
            .ok_or_else(|| EngineError::not_found(chart_id))?;
        let ladder = self
            .store
            .ladder(ladder_id)
            .ok_or_else(|| EngineError::not_found(ladder_id))?;
        if ladder.game != chart.game {
            return Err(EngineError::LadderNotApplicable {
                ladder: ladder.id,
                ladder_game: ladder.game,
                chart: chart.id,
                chart_game: chart.game,
            });
        }

        let mut candidates = self
            .store
            .records_in_chart(chart_id)
            .ok_or_else(|| EngineError::not_found(chart_id))?;
        let mut evaluated = Vec::with_capacity(ladder.rule_filters.len());

        for &filter in &ladder.rule_filters {
            if candidates.is_empty() {
                tracing::debug!(
                    %chart_id,
                    %ladder_id,
                    remaining = ladder.rule_filters.len() - evaluated.len(),
                    "ladder evaluation short-circuited"
                );
                return Ok(Evaluation {
                    records: candidates,
                    evaluated,
                    short_circuited: true,
                });
            }
            let (matched, path) = self.qualifier.qualify_within(&candidates, filter)?;
            tracing::debug!(%filter, ?path, matched = matched.len(), "rule filter qualified");
            candidates = matched;
            evaluated.push((filter, path));
        }

        Ok(Evaluation {
            records: candidates,
            evaluated,
            short_circuited: false,
        })
    }

    /// Evaluated records in ranking order.
    ///
    /// Ordered by value per the chart type's [`RankOrder`]; equal values
    /// share a rank (1, 2, 2, 4) and are listed by record id.
    pub fn rank(&self, chart_id: ChartId, ladder_id: LadderId) -> Result<Vec<RankedRecord>> {
        let evaluation = self.evaluate(chart_id, ladder_id)?;
        let chart = self
            .store
            .chart(chart_id)
            .ok_or_else(|| EngineError::not_found(chart_id))?;
        let order = self
            .store
            .chart_type(chart.chart_type)
            .ok_or_else(|| EngineError::not_found(chart.chart_type))?
            .rank_order;

        let mut records = Vec::with_capacity(evaluation.records.len() as usize);
        for raw in evaluation.records.iter() {
            let id = RecordId::new(raw);
            let record = self
                .store
                .record(id)
                .ok_or_else(|| EngineError::not_found(id))?;
            records.push(record);
        }
        records.sort_by(|a, b| {
            let by_value = match order {
                RankOrder::HigherIsBetter => b.value.cmp(&a.value),
                RankOrder::LowerIsBetter => a.value.cmp(&b.value),
            };
            by_value.then(a.id.cmp(&b.id))
        });

        let mut out: Vec<RankedRecord> = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            let rank = match out.last() {
                Some(prev) if prev.value == record.value => prev.rank,
                _ => position + 1,
            };
            out.push(RankedRecord {
                rank,
                record: record.id,
                user: record.user,
                value: record.value,
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedRecord {
    pub rank: usize,
    pub record: RecordId,
    pub user: UserId,
    pub value: i64,
}
