use std::sync::Arc;
use std::thread;

use anyhow::Result;
use ladder_catalog::{
    Chart, ChartGroupKind, ChartId, ChartType, ChartTypeId, EntityStore, Filter, FilterId, Game,
    GameId, Ladder, LadderId, MemoryStore, RankOrder, Record, RecordId,
};
use ladder_engine::{
    EngineConfig, EngineError, LadderEngine, QualifyPath, QualifyStrategy,
};
use parking_lot::RwLock;
use roaring::RoaringBitmap;

struct Catalog {
    store: MemoryStore,
    game: GameId,
    chart: ChartId,
    a: FilterId,
    b: FilterId,
    z: FilterId,
    implied: FilterId,
    ladder: LadderId,
    r1: RecordId,
    r2: RecordId,
}

fn catalog() -> Result<Catalog> {
    let store = MemoryStore::new();
    let game = store.add_game("Groove Coaster")?;
    let player = store.add_user("ayumi")?;
    let chart_type = store.add_chart_type(game, "Score", RankOrder::HigherIsBetter)?;
    let options = store.add_filter_group(chart_type, "Controller")?;
    let a = store.add_chosen_filter(options, "Arcade cabinet")?;
    let b = store.add_chosen_filter(options, "Booster")?;
    let z = store.add_chosen_filter(options, "Zero")?;
    let implied = store.add_implied_filter(options, "Official hardware", None)?;
    store.add_implication(b, implied)?;
    store.add_implication(z, implied)?;

    let root = store.add_chart_group(game, None, "Songs", ChartGroupKind::Internal)?;
    let leaf = store.add_chart_group(game, Some(root), "Hard", ChartGroupKind::Leaf)?;
    let chart = store.add_chart(leaf, "Got more raves?", chart_type)?;
    let r1 = store.add_record(chart, player, 1_000_000, [a, b])?;
    let r2 = store.add_record(chart, player, 990_000, [a])?;
    let ladder = store.add_ladder(game, "Official", "main", 1, vec![a, implied])?;

    Ok(Catalog {
        store,
        game,
        chart,
        a,
        b,
        z,
        implied,
        ladder,
        r1,
        r2,
    })
}

fn set(records: &[RecordId]) -> RoaringBitmap {
    records.iter().map(|r| r.raw()).collect()
}

fn materialized_config() -> EngineConfig {
    EngineConfig {
        strategy: QualifyStrategy::Materialized,
        ..EngineConfig::default()
    }
}

/// Store wrapper that can hide filters and inject extra ladder rule filters.
struct FaultyStore {
    inner: MemoryStore,
    hidden: RwLock<Vec<FilterId>>,
    appended_rules: RwLock<Vec<(LadderId, FilterId)>>,
}

impl FaultyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            hidden: RwLock::new(Vec::new()),
            appended_rules: RwLock::new(Vec::new()),
        }
    }
}

impl EntityStore for FaultyStore {
    fn game(&self, id: GameId) -> Option<Game> {
        self.inner.game(id)
    }

    fn ladder(&self, id: LadderId) -> Option<Ladder> {
        let mut ladder = self.inner.ladder(id)?;
        for &(target, filter) in self.appended_rules.read().iter() {
            if target == id {
                ladder.rule_filters.push(filter);
            }
        }
        Some(ladder)
    }

    fn chart(&self, id: ChartId) -> Option<Chart> {
        self.inner.chart(id)
    }

    fn chart_type(&self, id: ChartTypeId) -> Option<ChartType> {
        self.inner.chart_type(id)
    }

    fn filter(&self, id: FilterId) -> Option<Filter> {
        if self.hidden.read().contains(&id) {
            return None;
        }
        self.inner.filter(id)
    }

    fn record(&self, id: RecordId) -> Option<Record> {
        self.inner.record(id)
    }

    fn records_in_chart(&self, chart: ChartId) -> Option<RoaringBitmap> {
        self.inner.records_in_chart(chart)
    }

    fn records_holding(&self, chosen: FilterId) -> RoaringBitmap {
        self.inner.records_holding(chosen)
    }

    fn implied_by(&self, chosen: FilterId) -> RoaringBitmap {
        self.inner.implied_by(chosen)
    }

    fn implying(&self, implied: FilterId) -> RoaringBitmap {
        self.inner.implying(implied)
    }

    fn record_ids(&self) -> RoaringBitmap {
        self.inner.record_ids()
    }
}

#[test]
fn qualify_and_evaluate_two_record_chart() -> Result<()> {
    let c = catalog()?;
    let store = Arc::new(c.store);

    for config in [
        EngineConfig::computed_only(),
        materialized_config(),
        EngineConfig::default(),
    ] {
        let engine = LadderEngine::new(Arc::clone(&store), config)?;
        assert_eq!(engine.qualify(c.chart, c.implied)?, set(&[c.r1]));
        assert_eq!(engine.evaluate(c.chart, c.ladder)?, set(&[c.r1]));
    }
    Ok(())
}

#[test]
fn removing_an_implication_edge_propagates() -> Result<()> {
    let c = catalog()?;
    let store = Arc::new(c.store);
    let engine = LadderEngine::new(Arc::clone(&store), materialized_config())?;

    store.remove_implication(c.b, c.implied)?;
    let report = engine.on_implication_edge_removed(c.b, c.implied)?;
    assert!(report.is_complete());

    assert!(engine.qualify(c.chart, c.implied)?.is_empty());
    assert!(engine
        .qualify_with(c.chart, c.implied, QualifyStrategy::Computed)?
        .is_empty());
    let r1 = engine.materialized(c.r1).expect("r1 is indexed");
    assert!(!r1.contains(c.implied.raw()));
    engine.check_record(c.r1)?;
    assert!(engine.evaluate(c.chart, c.ladder)?.is_empty());
    Ok(())
}

#[test]
fn short_circuit_skips_unresolvable_rule_filters() -> Result<()> {
    let c = catalog()?;
    let dead_end = c.store.add_ladder(c.game, "Zero only", "side", 2, vec![c.z])?;
    let unlucky = c.store.add_ladder(c.game, "Arcade", "side", 3, vec![c.a])?;
    let store = Arc::new(FaultyStore::new(c.store));
    let dangling = FilterId::new(9_999);
    store.appended_rules.write().push((dead_end, dangling));
    store.appended_rules.write().push((unlucky, dangling));

    let engine = LadderEngine::new(Arc::clone(&store), EngineConfig::default())?;

    let traced = engine.evaluate_traced(c.chart, dead_end)?;
    assert!(traced.records.is_empty());
    assert!(traced.short_circuited);
    assert_eq!(traced.evaluated, vec![(c.z, QualifyPath::Chosen)]);

    // With candidates left the dangling rule filter is reached and reported.
    assert!(matches!(
        engine.evaluate(c.chart, unlucky),
        Err(EngineError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn failing_records_do_not_block_the_batch() -> Result<()> {
    let c = catalog()?;
    let extra = c.store.add_implied_filter(
        c.store.filter(c.a).expect("a exists").group,
        "Any controller",
        None,
    )?;
    let store = Arc::new(FaultyStore::new(c.store));
    let engine = LadderEngine::new(Arc::clone(&store), materialized_config())?;

    // R2 gains a new implied filter while R1's image becomes unreadable.
    store.inner.add_implication(c.a, extra)?;
    store.hidden.write().push(c.implied);

    let report = engine.rebuild_materialization()?;
    assert_eq!(report.updated, 1);
    assert_eq!(report.unresolved(), vec![c.r1]);
    assert_eq!(engine.pending(), 1);
    assert!(engine
        .materialized(c.r2)
        .expect("r2 is indexed")
        .contains(extra.raw()));

    store.hidden.write().clear();
    let report = engine.flush();
    assert!(report.is_complete());
    assert_eq!(report.updated, 1);
    assert_eq!(engine.pending(), 0);
    assert!(engine.verify()?.is_consistent());
    Ok(())
}

#[test]
fn background_rebuild_reports_progress() -> Result<()> {
    let c = catalog()?;
    let store = Arc::new(c.store);
    let engine = LadderEngine::new(Arc::clone(&store), materialized_config())?;

    store.add_implication(c.a, c.implied)?;
    let handle = engine.spawn_rebuild(Some(set(&[c.r2])), Default::default())?;
    let report = handle.join().expect("rebuild thread panicked");
    assert_eq!(report.updated, 1);
    assert!(report.is_complete());
    assert_eq!(engine.qualify(c.chart, c.implied)?, set(&[c.r1, c.r2]));
    Ok(())
}

#[test]
fn concurrent_triggers_and_reads_stay_consistent() -> Result<()> {
    const ROUNDS: usize = 200;

    let c = catalog()?;
    let store = Arc::new(c.store);
    let engine = LadderEngine::new(Arc::clone(&store), materialized_config())?;
    let everyone = set(&[c.r1, c.r2]);

    thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..ROUNDS {
                let filters = if round % 2 == 0 {
                    vec![c.a]
                } else {
                    vec![c.a, c.b]
                };
                store
                    .set_record_chosen_filters(c.r1, filters)
                    .expect("r1 exists");
                engine
                    .on_record_chosen_filters_changed(c.r1)
                    .expect("r1 exists");
            }
        });
        scope.spawn(|| {
            for round in 0..ROUNDS {
                if round % 2 == 0 {
                    store.add_implication(c.a, c.implied).expect("valid edge");
                    engine
                        .on_implication_edge_added(c.a, c.implied)
                        .expect("valid edge");
                } else {
                    store.remove_implication(c.a, c.implied).expect("valid edge");
                    engine
                        .on_implication_edge_removed(c.a, c.implied)
                        .expect("valid edge");
                }
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    let found = engine.qualify(c.chart, c.implied).expect("known ids");
                    assert!(found.is_subset(&everyone));
                    let ranked = engine.evaluate(c.chart, c.ladder).expect("known ids");
                    assert!(ranked.is_subset(&everyone));
                }
            });
        }
    });

    assert!(engine.verify()?.is_consistent());
    assert_eq!(
        engine.qualify(c.chart, c.implied)?,
        engine.qualify_with(c.chart, c.implied, QualifyStrategy::Computed)?
    );
    Ok(())
}

#[test]
fn rank_lists_ladder_members_best_first() -> Result<()> {
    let c = catalog()?;
    let player = c.store.add_user("sana")?;
    let r3 = c.store.add_record(c.chart, player, 1_000_050, [c.a, c.z])?;
    let store = Arc::new(c.store);
    let engine = LadderEngine::new(Arc::clone(&store), EngineConfig::default())?;

    let ranked = engine.rank(c.chart, c.ladder)?;
    let order: Vec<(usize, RecordId)> = ranked.iter().map(|r| (r.rank, r.record)).collect();
    assert_eq!(order, vec![(1, r3), (2, c.r1)]);
    assert_eq!(ranked[0].user, player);
    assert!(!ranked.iter().any(|r| r.record == c.r2));
    Ok(())
}
