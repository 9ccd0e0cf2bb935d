//! Ladder catalog
//!
//! The entity side of a rhythm-game ranking site:
//!
//! ```text
//! Game ─┬─ Ladder (tier, order, rule filters)
//!       ├─ ChartGroup tree ── leaf groups ── Chart ── Record (player, value, chosen filters)
//!       └─ ChartType ── FilterGroup ── Filter { Chosen | Implied }
//!
//! Chosen filter ──implies──► Implied filter   (many-to-many, FilterGraph)
//! ```
//!
//! - [`EntityStore`]: the read-only contract the evaluation engine consumes
//! - [`MemoryStore`]: an indexed, thread-safe in-memory implementation
//! - [`FilterGraph`]: bidirectional implication index with incremental edits
//! - [`CatalogSnapshot`]: JSON / binary catalog snapshots

mod error;
pub mod graph;
mod ids;
mod memory;
pub mod model;
pub mod snapshot;
mod store;


pub use error::{CatalogError, Result};
pub use graph::FilterGraph;
pub use ids::{
    ChartGroupId, ChartId, ChartTypeId, EntityRef, FilterGroupId, FilterId, GameId, LadderId,
    RecordId, UserId,
};
pub use memory::MemoryStore;
pub use model::{
    Chart, ChartGroup, ChartGroupKind, ChartType, Filter, FilterGroup, FilterKind, Game,
    Implication, Ladder, RankOrder, Record, User,
};
pub use snapshot::{CatalogSnapshot, SNAPSHOT_VERSION};
pub use store::EntityStore;
