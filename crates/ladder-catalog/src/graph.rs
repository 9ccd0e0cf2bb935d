//! Filter implication graph.
//!
//! A bidirectional adjacency index over the `chosen -> implied` relation:
//!
//! - forward: `chosen filter -> {implied filters}` (drives materialization)
//! - backward: `implied filter -> {chosen filters}` (drives resolution)
//!
//! Both directions are plain bitmaps keyed by filter id, so reverse traversal
//! never depends on what the backing store can query. Edges are inserted and
//! removed incrementally; there is no rebuild step.

use ahash::AHashMap;
use roaring::RoaringBitmap;

use crate::ids::FilterId;
use crate::model::Implication;

#[derive(Debug, Default, Clone)]
pub struct FilterGraph {
    forward: AHashMap<FilterId, RoaringBitmap>,
    backward: AHashMap<FilterId, RoaringBitmap>,
    edges: usize,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges == 0
    }

    /// Insert an edge. Returns `false` if it was already present.
    ///
    /// Kind checks (chosen source, implied target) belong to the caller, which
    /// knows the filters; the graph only sees ids.
    pub fn insert(&mut self, chosen: FilterId, implied: FilterId) -> bool {
        let added = self
            .forward
            .entry(chosen)
            .or_insert_with(RoaringBitmap::new)
            .insert(implied.raw());
        if added {
            self.backward
                .entry(implied)
                .or_insert_with(RoaringBitmap::new)
                .insert(chosen.raw());
            self.edges += 1;
        }
        added
    }

    /// Remove an edge. Returns `false` if it was absent.
    pub fn remove(&mut self, chosen: FilterId, implied: FilterId) -> bool {
        let Some(targets) = self.forward.get_mut(&chosen) else {
            return false;
        };
        if !targets.remove(implied.raw()) {
            return false;
        }
        if targets.is_empty() {
            self.forward.remove(&chosen);
        }
        if let Some(sources) = self.backward.get_mut(&implied) {
            sources.remove(chosen.raw());
            if sources.is_empty() {
                self.backward.remove(&implied);
            }
        }
        self.edges -= 1;
        true
    }

    pub fn contains(&self, chosen: FilterId, implied: FilterId) -> bool {
        self.forward
            .get(&chosen)
            .map_or(false, |targets| targets.contains(implied.raw()))
    }

    /// Implied filters reached from one chosen filter.
    pub fn implied_by(&self, chosen: FilterId) -> Option<&RoaringBitmap> {
        self.forward.get(&chosen)
    }

    /// Chosen filters with an edge into `implied`.
    pub fn implying(&self, implied: FilterId) -> Option<&RoaringBitmap> {
        self.backward.get(&implied)
    }

    /// Union of the forward edges of every filter in `chosen`.
    pub fn image<I>(&self, chosen: I) -> RoaringBitmap
    where
        I: IntoIterator<Item = FilterId>,
    {
        let mut out = RoaringBitmap::new();
        for cf in chosen {
            if let Some(targets) = self.forward.get(&cf) {
                out |= targets;
            }
        }
        out
    }

    /// All edges, sorted.
    pub fn edges(&self) -> Vec<Implication> {
        let mut out: Vec<Implication> = self
            .forward
            .iter()
            .flat_map(|(&chosen, targets)| {
                targets.iter().map(move |implied| Implication {
                    chosen,
                    implied: FilterId::new(implied),
                })
            })
            .collect();
        out.sort_unstable();
        out
    }
}
