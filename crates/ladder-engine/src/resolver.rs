//! Implication resolution.
//!
//! Reads the implication relation straight from the store's filter graph, so
//! answers always reflect the relation at call time. This is the ground truth
//! the materialized index is rebuilt and verified against.

use ladder_catalog::{EntityStore, Filter, FilterId, FilterKind, Record};
use roaring::RoaringBitmap;

use crate::error::{EngineError, Result};

pub struct ImplicationResolver<'a, S: EntityStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: EntityStore + ?Sized> ImplicationResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Chosen filters (raw ids) with an edge into `implied`.
    pub fn resolve(&self, implied: FilterId) -> Result<RoaringBitmap> {
        let filter = self
            .store
            .filter(implied)
            .ok_or_else(|| EngineError::not_found(implied))?;
        self.resolve_filter(&filter)
    }

    pub(crate) fn resolve_filter(&self, filter: &Filter) -> Result<RoaringBitmap> {
        match filter.kind {
            FilterKind::Implied { .. } => Ok(self.store.implying(filter.id)),
            FilterKind::Chosen => Err(EngineError::WrongFilterKind {
                filter: filter.id,
                expected: "an implied",
            }),
        }
    }

    /// Implied filters a record satisfies, excluding user-defined ones.
    ///
    /// This is exactly what the materialized index must hold for `record`.
    pub fn materialized_set(&self, record: &Record) -> Result<RoaringBitmap> {
        let mut implied = RoaringBitmap::new();
        for &cf in &record.chosen_filters {
            implied |= self.store.implied_by(cf);
        }
        let mut out = RoaringBitmap::new();
        for raw in implied.iter() {
            let id = FilterId::new(raw);
            let filter = self
                .store
                .filter(id)
                .ok_or_else(|| EngineError::not_found(id))?;
            if !filter.is_user_defined() {
                out.insert(raw);
            }
        }
        Ok(out)
    }
}
