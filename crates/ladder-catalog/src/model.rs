//! Catalog entities.
//!
//! Games, ladders, chart groups, chart types, filter groups and filters are
//! long-lived configuration. Records are player submissions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ids::{
    ChartGroupId, ChartId, ChartTypeId, FilterGroupId, FilterId, GameId, LadderId, RecordId,
    UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// A named ranking context of a game: the records of a chart that satisfy
/// every rule filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ladder {
    pub id: LadderId,
    pub game: GameId,
    pub name: String,
    /// Presentation tier, e.g. `"main"`.
    pub tier: String,
    /// Display position, unique per game.
    pub order: i32,
    /// Display order only; evaluation treats these as a conjunction.
    pub rule_filters: Vec<FilterId>,
}

/// Node kind of a chart group, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartGroupKind {
    /// Holds child chart groups.
    Internal,
    /// Holds charts.
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartGroup {
    pub id: ChartGroupId,
    pub game: GameId,
    pub name: String,
    pub parent: Option<ChartGroupId>,
    pub kind: ChartGroupKind,
}

/// Which direction of `Record::value` ranks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankOrder {
    /// Scores: larger is better.
    HigherIsBetter,
    /// Times: smaller is better.
    LowerIsBetter,
}

impl Default for RankOrder {
    fn default() -> Self {
        RankOrder::HigherIsBetter
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartType {
    pub id: ChartTypeId,
    pub game: GameId,
    pub name: String,
    pub rank_order: RankOrder,
}

/// Ordered container of filters scoped to a chart type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub id: FilterGroupId,
    pub chart_type: ChartTypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub id: ChartId,
    pub game: GameId,
    /// Always a `Leaf` group.
    pub group: ChartGroupId,
    pub name: String,
    pub chart_type: ChartTypeId,
}

/// Filter variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    /// Attached directly to records by players.
    Chosen,
    /// Satisfied by any record holding a chosen filter that implies it.
    /// `author` is set for user-defined filters.
    Implied { author: Option<UserId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub id: FilterId,
    pub group: FilterGroupId,
    pub name: String,
    pub kind: FilterKind,
}

impl Filter {
    pub fn is_chosen(&self) -> bool {
        matches!(self.kind, FilterKind::Chosen)
    }

    pub fn is_implied(&self) -> bool {
        matches!(self.kind, FilterKind::Implied { .. })
    }

    /// User-authored implied filters are kept out of the shared
    /// materialized index.
    pub fn is_user_defined(&self) -> bool {
        matches!(self.kind, FilterKind::Implied { author: Some(_) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub chart: ChartId,
    pub user: UserId,
    /// Score or time, ranked per the chart type's `RankOrder`.
    pub value: i64,
    pub chosen_filters: BTreeSet<FilterId>,
}

/// One `chosen -> implied` edge of the implication relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Implication {
    pub chosen: FilterId,
    pub implied: FilterId,
}
