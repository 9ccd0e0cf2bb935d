//! In-memory indexed catalog.
//!
//! `MemoryStore` keeps every entity in ordered maps and maintains three
//! indexes alongside them:
//!
//! - `chart -> {records}`
//! - `chosen filter -> {records}` (across charts)
//! - the bidirectional [`FilterGraph`]
//!
//! All writes validate catalog invariants before touching any index, so a
//! rejected write leaves the store unchanged.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::error::{CatalogError, Result};
use crate::graph::FilterGraph;
use crate::ids::{
    ChartGroupId, ChartId, ChartTypeId, EntityRef, FilterGroupId, FilterId, GameId, LadderId,
    RecordId, UserId,
};
use crate::model::{
    Chart, ChartGroup, ChartGroupKind, ChartType, Filter, FilterGroup, FilterKind, Game,
    Implication, Ladder, RankOrder, Record, User,
};
use crate::store::EntityStore;

/// Next free id per entity kind; past `u32::MAX` once the id space is used up.
#[derive(Debug, Default)]
struct NextIds {
    game: u64,
    user: u64,
    ladder: u64,
    chart_group: u64,
    chart: u64,
    chart_type: u64,
    filter_group: u64,
    filter: u64,
    record: u64,
}

fn bump(next: &mut u64, raw: u32) {
    *next = (*next).max(u64::from(raw) + 1);
}

fn allocate(next: u64, kind: &'static str) -> Result<u32> {
    u32::try_from(next).map_err(|_| CatalogError::IdSpaceExhausted(kind))
}

#[derive(Debug, Default)]
pub(crate) struct CatalogData {
    pub(crate) games: BTreeMap<GameId, Game>,
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) ladders: BTreeMap<LadderId, Ladder>,
    pub(crate) chart_groups: BTreeMap<ChartGroupId, ChartGroup>,
    pub(crate) chart_types: BTreeMap<ChartTypeId, ChartType>,
    pub(crate) filter_groups: BTreeMap<FilterGroupId, FilterGroup>,
    pub(crate) filters: BTreeMap<FilterId, Filter>,
    pub(crate) charts: BTreeMap<ChartId, Chart>,
    pub(crate) records: BTreeMap<RecordId, Record>,
    pub(crate) graph: FilterGraph,
    records_by_chart: AHashMap<ChartId, RoaringBitmap>,
    records_by_filter: AHashMap<FilterId, RoaringBitmap>,
    next: NextIds,
}

impl CatalogData {
    fn filter_ref(&self, id: FilterId) -> Result<&Filter> {
        self.filters.get(&id).ok_or_else(|| CatalogError::not_found(id))
    }

    fn chart_ref(&self, id: ChartId) -> Result<&Chart> {
        self.charts.get(&id).ok_or_else(|| CatalogError::not_found(id))
    }

    fn require_game(&self, id: GameId) -> Result<()> {
        if self.games.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::not_found(id))
        }
    }

    /// Chart type that scopes a filter (through its filter group).
    fn filter_chart_type(&self, filter: &Filter) -> Result<&ChartType> {
        let group = self
            .filter_groups
            .get(&filter.group)
            .ok_or_else(|| CatalogError::not_found(filter.group))?;
        self.chart_types
            .get(&group.chart_type)
            .ok_or_else(|| CatalogError::not_found(group.chart_type))
    }

    fn validate_chosen_filters(&self, chart: &Chart, filters: &BTreeSet<FilterId>) -> Result<()> {
        for &fid in filters {
            let filter = self.filter_ref(fid)?;
            if !filter.is_chosen() {
                return Err(CatalogError::NotChosen(fid));
            }
            if self.filter_chart_type(filter)?.id != chart.chart_type {
                return Err(CatalogError::FilterOutOfScope {
                    filter: fid,
                    scope: EntityRef::ChartType(chart.chart_type),
                });
            }
        }
        Ok(())
    }

    fn validate_rule_filters(&self, game: GameId, filters: &[FilterId]) -> Result<()> {
        for &fid in filters {
            let filter = self.filter_ref(fid)?;
            if self.filter_chart_type(filter)?.game != game {
                return Err(CatalogError::FilterOutOfScope {
                    filter: fid,
                    scope: EntityRef::Game(game),
                });
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inserts with caller-chosen ids (snapshot restore and `add_*`)
    // ------------------------------------------------------------------------

    pub(crate) fn insert_game(&mut self, game: Game) -> Result<()> {
        if self.games.contains_key(&game.id) {
            return Err(CatalogError::DuplicateId(game.id.into()));
        }
        bump(&mut self.next.game, game.id.raw());
        self.games.insert(game.id, game);
        Ok(())
    }

    pub(crate) fn insert_user(&mut self, user: User) -> Result<()> {
        if self.users.contains_key(&user.id) {
            return Err(CatalogError::DuplicateId(user.id.into()));
        }
        bump(&mut self.next.user, user.id.raw());
        self.users.insert(user.id, user);
        Ok(())
    }

    pub(crate) fn insert_chart_type(&mut self, chart_type: ChartType) -> Result<()> {
        if self.chart_types.contains_key(&chart_type.id) {
            return Err(CatalogError::DuplicateId(chart_type.id.into()));
        }
        self.require_game(chart_type.game)?;
        bump(&mut self.next.chart_type, chart_type.id.raw());
        self.chart_types.insert(chart_type.id, chart_type);
        Ok(())
    }

    pub(crate) fn insert_filter_group(&mut self, group: FilterGroup) -> Result<()> {
        if self.filter_groups.contains_key(&group.id) {
            return Err(CatalogError::DuplicateId(group.id.into()));
        }
        if !self.chart_types.contains_key(&group.chart_type) {
            return Err(CatalogError::not_found(group.chart_type));
        }
        bump(&mut self.next.filter_group, group.id.raw());
        self.filter_groups.insert(group.id, group);
        Ok(())
    }

    pub(crate) fn insert_filter(&mut self, filter: Filter) -> Result<()> {
        if self.filters.contains_key(&filter.id) {
            return Err(CatalogError::DuplicateId(filter.id.into()));
        }
        if !self.filter_groups.contains_key(&filter.group) {
            return Err(CatalogError::not_found(filter.group));
        }
        if let FilterKind::Implied {
            author: Some(author),
        } = filter.kind
        {
            if !self.users.contains_key(&author) {
                return Err(CatalogError::not_found(author));
            }
        }
        bump(&mut self.next.filter, filter.id.raw());
        self.filters.insert(filter.id, filter);
        Ok(())
    }

    pub(crate) fn insert_implication(&mut self, chosen: FilterId, implied: FilterId) -> Result<bool> {
        if chosen == implied {
            return Err(CatalogError::CyclicImplication {
                chosen,
                implied,
                reason: "a filter cannot imply itself".to_string(),
            });
        }
        let source = self.filter_ref(chosen)?;
        let target = self.filter_ref(implied)?;
        if !source.is_chosen() {
            return Err(CatalogError::CyclicImplication {
                chosen,
                implied,
                reason: format!("source {chosen} is an implied filter"),
            });
        }
        if !target.is_implied() {
            return Err(CatalogError::CyclicImplication {
                chosen,
                implied,
                reason: format!("target {implied} is a chosen filter"),
            });
        }
        Ok(self.graph.insert(chosen, implied))
    }

    pub(crate) fn insert_chart_group(&mut self, group: ChartGroup) -> Result<()> {
        if self.chart_groups.contains_key(&group.id) {
            return Err(CatalogError::DuplicateId(group.id.into()));
        }
        self.require_game(group.game)?;
        if let Some(parent_id) = group.parent {
            let parent = self
                .chart_groups
                .get(&parent_id)
                .ok_or_else(|| CatalogError::not_found(parent_id))?;
            if parent.kind != ChartGroupKind::Internal {
                return Err(CatalogError::WrongGroupKind {
                    group: parent_id,
                    expected: ChartGroupKind::Internal,
                });
            }
            if parent.game != group.game {
                return Err(CatalogError::ForeignGame {
                    entity: EntityRef::ChartGroup(parent_id),
                    game: group.game,
                });
            }
        }
        bump(&mut self.next.chart_group, group.id.raw());
        self.chart_groups.insert(group.id, group);
        Ok(())
    }

    pub(crate) fn insert_chart(&mut self, chart: Chart) -> Result<()> {
        if self.charts.contains_key(&chart.id) {
            return Err(CatalogError::DuplicateId(chart.id.into()));
        }
        let group = self
            .chart_groups
            .get(&chart.group)
            .ok_or_else(|| CatalogError::not_found(chart.group))?;
        if group.kind != ChartGroupKind::Leaf {
            return Err(CatalogError::WrongGroupKind {
                group: chart.group,
                expected: ChartGroupKind::Leaf,
            });
        }
        if group.game != chart.game {
            return Err(CatalogError::ForeignGame {
                entity: EntityRef::ChartGroup(chart.group),
                game: chart.game,
            });
        }
        let chart_type = self
            .chart_types
            .get(&chart.chart_type)
            .ok_or_else(|| CatalogError::not_found(chart.chart_type))?;
        if chart_type.game != chart.game {
            return Err(CatalogError::ForeignGame {
                entity: EntityRef::ChartType(chart.chart_type),
                game: chart.game,
            });
        }
        bump(&mut self.next.chart, chart.id.raw());
        self.records_by_chart.entry(chart.id).or_default();
        self.charts.insert(chart.id, chart);
        Ok(())
    }

    pub(crate) fn insert_ladder(&mut self, ladder: Ladder) -> Result<()> {
        if self.ladders.contains_key(&ladder.id) {
            return Err(CatalogError::DuplicateId(ladder.id.into()));
        }
        self.require_game(ladder.game)?;
        if self
            .ladders
            .values()
            .any(|l| l.game == ladder.game && l.order == ladder.order)
        {
            return Err(CatalogError::DuplicateLadderOrder {
                game: ladder.game,
                order: ladder.order,
            });
        }
        self.validate_rule_filters(ladder.game, &ladder.rule_filters)?;
        bump(&mut self.next.ladder, ladder.id.raw());
        self.ladders.insert(ladder.id, ladder);
        Ok(())
    }

    pub(crate) fn insert_record(&mut self, record: Record) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(CatalogError::DuplicateId(record.id.into()));
        }
        if !self.users.contains_key(&record.user) {
            return Err(CatalogError::not_found(record.user));
        }
        let chart = self.chart_ref(record.chart)?;
        self.validate_chosen_filters(chart, &record.chosen_filters)?;

        let raw = record.id.raw();
        self.records_by_chart
            .entry(record.chart)
            .or_default()
            .insert(raw);
        for &fid in &record.chosen_filters {
            self.records_by_filter.entry(fid).or_default().insert(raw);
        }
        bump(&mut self.next.record, raw);
        self.records.insert(record.id, record);
        Ok(())
    }

    fn unindex_record_filter(&mut self, filter: FilterId, record: RecordId) {
        if let Some(records) = self.records_by_filter.get_mut(&filter) {
            records.remove(record.raw());
            if records.is_empty() {
                self.records_by_filter.remove(&filter);
            }
        }
    }
}

/// Thread-safe in-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<CatalogData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_data(data: CatalogData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&CatalogData) -> R) -> R {
        f(&self.data.read())
    }

    // ========================================================================
    // Catalog configuration
    // ========================================================================

    pub fn add_game(&self, name: &str) -> Result<GameId> {
        let mut data = self.data.write();
        let id = GameId::new(allocate(data.next.game, "game")?);
        data.insert_game(Game {
            id,
            name: name.to_string(),
        })?;
        Ok(id)
    }

    pub fn add_user(&self, name: &str) -> Result<UserId> {
        let mut data = self.data.write();
        let id = UserId::new(allocate(data.next.user, "user")?);
        data.insert_user(User {
            id,
            name: name.to_string(),
        })?;
        Ok(id)
    }

    pub fn add_chart_type(
        &self,
        game: GameId,
        name: &str,
        rank_order: RankOrder,
    ) -> Result<ChartTypeId> {
        let mut data = self.data.write();
        let id = ChartTypeId::new(allocate(data.next.chart_type, "chart type")?);
        data.insert_chart_type(ChartType {
            id,
            game,
            name: name.to_string(),
            rank_order,
        })?;
        Ok(id)
    }

    pub fn add_filter_group(&self, chart_type: ChartTypeId, name: &str) -> Result<FilterGroupId> {
        let mut data = self.data.write();
        let id = FilterGroupId::new(allocate(data.next.filter_group, "filter group")?);
        data.insert_filter_group(FilterGroup {
            id,
            chart_type,
            name: name.to_string(),
        })?;
        Ok(id)
    }

    pub fn add_chosen_filter(&self, group: FilterGroupId, name: &str) -> Result<FilterId> {
        self.add_filter(group, name, FilterKind::Chosen)
    }

    /// Add an implied filter; `author` marks it as user-defined.
    pub fn add_implied_filter(
        &self,
        group: FilterGroupId,
        name: &str,
        author: Option<UserId>,
    ) -> Result<FilterId> {
        self.add_filter(group, name, FilterKind::Implied { author })
    }

    fn add_filter(&self, group: FilterGroupId, name: &str, kind: FilterKind) -> Result<FilterId> {
        let mut data = self.data.write();
        let id = FilterId::new(allocate(data.next.filter, "filter")?);
        data.insert_filter(Filter {
            id,
            group,
            name: name.to_string(),
            kind,
        })?;
        Ok(id)
    }

    /// Add a `chosen -> implied` edge. Returns `false` if it already existed.
    pub fn add_implication(&self, chosen: FilterId, implied: FilterId) -> Result<bool> {
        let added = self.data.write().insert_implication(chosen, implied)?;
        tracing::debug!(%chosen, %implied, added, "implication edge inserted");
        Ok(added)
    }

    /// Remove a `chosen -> implied` edge. Returns `false` if it was absent.
    pub fn remove_implication(&self, chosen: FilterId, implied: FilterId) -> Result<bool> {
        let mut data = self.data.write();
        data.filter_ref(chosen)?;
        data.filter_ref(implied)?;
        let removed = data.graph.remove(chosen, implied);
        tracing::debug!(%chosen, %implied, removed, "implication edge removed");
        Ok(removed)
    }

    pub fn add_chart_group(
        &self,
        game: GameId,
        parent: Option<ChartGroupId>,
        name: &str,
        kind: ChartGroupKind,
    ) -> Result<ChartGroupId> {
        let mut data = self.data.write();
        let id = ChartGroupId::new(allocate(data.next.chart_group, "chart group")?);
        data.insert_chart_group(ChartGroup {
            id,
            game,
            name: name.to_string(),
            parent,
            kind,
        })?;
        Ok(id)
    }

    /// Add a chart under a leaf group; its game is taken from the group.
    pub fn add_chart(
        &self,
        group: ChartGroupId,
        name: &str,
        chart_type: ChartTypeId,
    ) -> Result<ChartId> {
        let mut data = self.data.write();
        let game = data
            .chart_groups
            .get(&group)
            .map(|g| g.game)
            .ok_or_else(|| CatalogError::not_found(group))?;
        let id = ChartId::new(allocate(data.next.chart, "chart")?);
        data.insert_chart(Chart {
            id,
            game,
            group,
            name: name.to_string(),
            chart_type,
        })?;
        Ok(id)
    }

    pub fn add_ladder(
        &self,
        game: GameId,
        name: &str,
        tier: &str,
        order: i32,
        rule_filters: Vec<FilterId>,
    ) -> Result<LadderId> {
        let mut data = self.data.write();
        let id = LadderId::new(allocate(data.next.ladder, "ladder")?);
        data.insert_ladder(Ladder {
            id,
            game,
            name: name.to_string(),
            tier: tier.to_string(),
            order,
            rule_filters,
        })?;
        Ok(id)
    }

    /// Replace a ladder's rule filters.
    pub fn set_ladder_rule_filters(&self, ladder: LadderId, rule_filters: Vec<FilterId>) -> Result<()> {
        let mut data = self.data.write();
        let game = data
            .ladders
            .get(&ladder)
            .map(|l| l.game)
            .ok_or_else(|| CatalogError::not_found(ladder))?;
        data.validate_rule_filters(game, &rule_filters)?;
        if let Some(l) = data.ladders.get_mut(&ladder) {
            l.rule_filters = rule_filters;
        }
        Ok(())
    }

    // ========================================================================
    // Records
    // ========================================================================

    pub fn add_record<I>(
        &self,
        chart: ChartId,
        user: UserId,
        value: i64,
        chosen_filters: I,
    ) -> Result<RecordId>
    where
        I: IntoIterator<Item = FilterId>,
    {
        let mut data = self.data.write();
        let id = RecordId::new(allocate(data.next.record, "record")?);
        data.insert_record(Record {
            id,
            chart,
            user,
            value,
            chosen_filters: chosen_filters.into_iter().collect(),
        })?;
        Ok(id)
    }

    /// Replace a record's chosen-filter set.
    pub fn set_record_chosen_filters<I>(&self, record: RecordId, chosen_filters: I) -> Result<()>
    where
        I: IntoIterator<Item = FilterId>,
    {
        let new_filters: BTreeSet<FilterId> = chosen_filters.into_iter().collect();
        let mut data = self.data.write();
        let existing = data
            .records
            .get(&record)
            .ok_or_else(|| CatalogError::not_found(record))?;
        let chart = data.chart_ref(existing.chart)?;
        data.validate_chosen_filters(chart, &new_filters)?;

        let old_filters = existing.chosen_filters.clone();
        for &fid in old_filters.difference(&new_filters) {
            data.unindex_record_filter(fid, record);
        }
        for &fid in new_filters.difference(&old_filters) {
            data.records_by_filter
                .entry(fid)
                .or_default()
                .insert(record.raw());
        }
        if let Some(r) = data.records.get_mut(&record) {
            r.chosen_filters = new_filters;
        }
        Ok(())
    }

    pub fn set_record_value(&self, record: RecordId, value: i64) -> Result<()> {
        let mut data = self.data.write();
        let r = data
            .records
            .get_mut(&record)
            .ok_or_else(|| CatalogError::not_found(record))?;
        r.value = value;
        Ok(())
    }

    pub fn remove_record(&self, record: RecordId) -> Result<Record> {
        let mut data = self.data.write();
        let removed = data
            .records
            .remove(&record)
            .ok_or_else(|| CatalogError::not_found(record))?;
        if let Some(records) = data.records_by_chart.get_mut(&removed.chart) {
            records.remove(record.raw());
        }
        for &fid in &removed.chosen_filters {
            data.unindex_record_filter(fid, record);
        }
        Ok(removed)
    }

    // ========================================================================
    // Catalog browsing
    // ========================================================================

    /// Ladders of a game in display order.
    pub fn ladders_of_game(&self, game: GameId) -> Result<Vec<Ladder>> {
        let data = self.data.read();
        data.require_game(game)?;
        let mut out: Vec<Ladder> = data
            .ladders
            .values()
            .filter(|l| l.game == game)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.order);
        Ok(out)
    }

    pub fn root_groups(&self, game: GameId) -> Result<Vec<ChartGroup>> {
        let data = self.data.read();
        data.require_game(game)?;
        Ok(data
            .chart_groups
            .values()
            .filter(|g| g.game == game && g.parent.is_none())
            .cloned()
            .collect())
    }

    pub fn child_groups(&self, group: ChartGroupId) -> Result<Vec<ChartGroup>> {
        let data = self.data.read();
        if !data.chart_groups.contains_key(&group) {
            return Err(CatalogError::not_found(group));
        }
        Ok(data
            .chart_groups
            .values()
            .filter(|g| g.parent == Some(group))
            .cloned()
            .collect())
    }

    pub fn charts_in_group(&self, group: ChartGroupId) -> Result<Vec<Chart>> {
        let data = self.data.read();
        if !data.chart_groups.contains_key(&group) {
            return Err(CatalogError::not_found(group));
        }
        Ok(data
            .charts
            .values()
            .filter(|c| c.group == group)
            .cloned()
            .collect())
    }

    /// Filter groups of a chart type, in creation order.
    pub fn filter_groups_of(&self, chart_type: ChartTypeId) -> Result<Vec<FilterGroup>> {
        let data = self.data.read();
        if !data.chart_types.contains_key(&chart_type) {
            return Err(CatalogError::not_found(chart_type));
        }
        Ok(data
            .filter_groups
            .values()
            .filter(|g| g.chart_type == chart_type)
            .cloned()
            .collect())
    }

    /// Filters of a group, in creation order.
    pub fn filters_in_group(&self, group: FilterGroupId) -> Result<Vec<Filter>> {
        let data = self.data.read();
        if !data.filter_groups.contains_key(&group) {
            return Err(CatalogError::not_found(group));
        }
        Ok(data
            .filters
            .values()
            .filter(|f| f.group == group)
            .cloned()
            .collect())
    }

    pub fn implications(&self) -> Vec<Implication> {
        self.data.read().graph.edges()
    }

    pub fn record_count(&self) -> usize {
        self.data.read().records.len()
    }
}

impl EntityStore for MemoryStore {
    fn game(&self, id: GameId) -> Option<Game> {
        self.data.read().games.get(&id).cloned()
    }

    fn ladder(&self, id: LadderId) -> Option<Ladder> {
        self.data.read().ladders.get(&id).cloned()
    }

    fn chart(&self, id: ChartId) -> Option<Chart> {
        self.data.read().charts.get(&id).cloned()
    }

    fn chart_type(&self, id: ChartTypeId) -> Option<ChartType> {
        self.data.read().chart_types.get(&id).cloned()
    }

    fn filter(&self, id: FilterId) -> Option<Filter> {
        self.data.read().filters.get(&id).cloned()
    }

    fn record(&self, id: RecordId) -> Option<Record> {
        self.data.read().records.get(&id).cloned()
    }

    fn records_in_chart(&self, chart: ChartId) -> Option<RoaringBitmap> {
        let data = self.data.read();
        if !data.charts.contains_key(&chart) {
            return None;
        }
        Some(data.records_by_chart.get(&chart).cloned().unwrap_or_default())
    }

    fn records_holding(&self, chosen: FilterId) -> RoaringBitmap {
        self.data
            .read()
            .records_by_filter
            .get(&chosen)
            .cloned()
            .unwrap_or_default()
    }

    fn implied_by(&self, chosen: FilterId) -> RoaringBitmap {
        self.data
            .read()
            .graph
            .implied_by(chosen)
            .cloned()
            .unwrap_or_default()
    }

    fn implying(&self, implied: FilterId) -> RoaringBitmap {
        self.data
            .read()
            .graph
            .implying(implied)
            .cloned()
            .unwrap_or_default()
    }

    fn record_ids(&self) -> RoaringBitmap {
        self.data
            .read()
            .records
            .keys()
            .map(|id| id.raw())
            .collect()
    }
}
