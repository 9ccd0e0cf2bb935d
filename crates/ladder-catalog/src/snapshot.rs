//! Catalog snapshots.
//!
//! A snapshot is the full entity set plus implication edges. JSON is used for
//! hand-written fixtures; the binary form is a `LDRC` magic, a little-endian
//! `u32` version and a bincode payload. Restoring replays every insert, so a
//! snapshot that violates a catalog invariant is rejected.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::ids::ChartGroupId;
use crate::memory::{CatalogData, MemoryStore};
use crate::model::{
    Chart, ChartGroup, ChartType, Filter, FilterGroup, Game, Implication, Ladder, Record, User,
};

const SNAPSHOT_MAGIC: &[u8; 4] = b"LDRC";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub games: Vec<Game>,
    pub users: Vec<User>,
    pub chart_types: Vec<ChartType>,
    pub filter_groups: Vec<FilterGroup>,
    pub filters: Vec<Filter>,
    pub implications: Vec<Implication>,
    pub chart_groups: Vec<ChartGroup>,
    pub charts: Vec<Chart>,
    pub ladders: Vec<Ladder>,
    pub records: Vec<Record>,
}

impl CatalogSnapshot {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(CatalogError::Snapshot("missing LDRC header".to_string()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(CatalogError::Snapshot(format!(
                "unsupported snapshot version {version}"
            )));
        }
        Ok(bincode::deserialize(&bytes[8..])?)
    }

    /// Load a snapshot, choosing the format by extension (`.json` or binary).
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if is_json(path) {
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Self::from_bytes(&bytes)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = if is_json(path) {
            self.to_json_string()?.into_bytes()
        } else {
            self.to_bytes()?
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "json")
}

impl MemoryStore {
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.with_data(|data| CatalogSnapshot {
            games: data.games.values().cloned().collect(),
            users: data.users.values().cloned().collect(),
            chart_types: data.chart_types.values().cloned().collect(),
            filter_groups: data.filter_groups.values().cloned().collect(),
            filters: data.filters.values().cloned().collect(),
            implications: data.graph.edges(),
            chart_groups: data.chart_groups.values().cloned().collect(),
            charts: data.charts.values().cloned().collect(),
            ladders: data.ladders.values().cloned().collect(),
            records: data.records.values().cloned().collect(),
        })
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Result<Self> {
        let mut data = CatalogData::default();
        for game in snapshot.games {
            data.insert_game(game)?;
        }
        for user in snapshot.users {
            data.insert_user(user)?;
        }
        for chart_type in snapshot.chart_types {
            data.insert_chart_type(chart_type)?;
        }
        for group in snapshot.filter_groups {
            data.insert_filter_group(group)?;
        }
        for filter in snapshot.filters {
            data.insert_filter(filter)?;
        }
        for edge in snapshot.implications {
            data.insert_implication(edge.chosen, edge.implied)?;
        }
        for group in parents_first(snapshot.chart_groups)? {
            data.insert_chart_group(group)?;
        }
        for chart in snapshot.charts {
            data.insert_chart(chart)?;
        }
        for ladder in snapshot.ladders {
            data.insert_ladder(ladder)?;
        }
        for record in snapshot.records {
            data.insert_record(record)?;
        }
        tracing::debug!(
            records = data.records.len(),
            implications = data.graph.len(),
            "catalog snapshot restored"
        );
        Ok(MemoryStore::from_data(data))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_snapshot(CatalogSnapshot::load(path)?)
    }
}

/// Order chart groups so that every parent precedes its children.
fn parents_first(groups: Vec<ChartGroup>) -> Result<Vec<ChartGroup>> {
    let mut placed: BTreeSet<ChartGroupId> = BTreeSet::new();
    let mut pending = groups;
    let mut out = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let (ready, rest): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|g| g.parent.map_or(true, |p| placed.contains(&p)));
        if ready.is_empty() {
            let missing = rest
                .iter()
                .filter_map(|g| g.parent)
                .next()
                .ok_or_else(|| CatalogError::Snapshot("unorderable chart groups".to_string()))?;
            return Err(CatalogError::not_found(missing));
        }
        placed.extend(ready.iter().map(|g| g.id));
        out.extend(ready);
        pending = rest;
    }
    Ok(out)
}
