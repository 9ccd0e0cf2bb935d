//! Compact entity identifiers.
//!
//! Every catalog entity is addressed by a `u32` newtype so that sets of
//! records and filters can live in Roaring bitmaps.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }
    };
}

entity_id!(GameId, "game");
entity_id!(UserId, "user");
entity_id!(
    /// Ranking context of a game.
    LadderId,
    "ladder"
);
entity_id!(ChartGroupId, "chart-group");
entity_id!(ChartId, "chart");
entity_id!(ChartTypeId, "chart-type");
entity_id!(FilterGroupId, "filter-group");
entity_id!(
    /// Chosen and implied filters share one id space.
    FilterId,
    "filter"
);
entity_id!(RecordId, "record");

/// A typed reference to any catalog entity, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Game(GameId),
    User(UserId),
    Ladder(LadderId),
    ChartGroup(ChartGroupId),
    Chart(ChartId),
    ChartType(ChartTypeId),
    FilterGroup(FilterGroupId),
    Filter(FilterId),
    Record(RecordId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Game(id) => id.fmt(f),
            EntityRef::User(id) => id.fmt(f),
            EntityRef::Ladder(id) => id.fmt(f),
            EntityRef::ChartGroup(id) => id.fmt(f),
            EntityRef::Chart(id) => id.fmt(f),
            EntityRef::ChartType(id) => id.fmt(f),
            EntityRef::FilterGroup(id) => id.fmt(f),
            EntityRef::Filter(id) => id.fmt(f),
            EntityRef::Record(id) => id.fmt(f),
        }
    }
}

macro_rules! entity_ref_from {
    ($($id:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$id> for EntityRef {
                fn from(id: $id) -> Self {
                    EntityRef::$variant(id)
                }
            }
        )*
    };
}

entity_ref_from!(
    GameId => Game,
    UserId => User,
    LadderId => Ladder,
    ChartGroupId => ChartGroup,
    ChartId => Chart,
    ChartTypeId => ChartType,
    FilterGroupId => FilterGroup,
    FilterId => Filter,
    RecordId => Record,
);
