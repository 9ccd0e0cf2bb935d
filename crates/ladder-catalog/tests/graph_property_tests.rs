use std::collections::BTreeSet;

use ladder_catalog::{FilterGraph, FilterId, Implication};
use proptest::prelude::*;
use roaring::RoaringBitmap;

const CHOSEN: u32 = 8;
const IMPLIED_BASE: u32 = 100;
const IMPLIED: u32 = 6;

#[derive(Debug, Clone, Copy)]
enum Edit {
    Insert(u32, u32),
    Remove(u32, u32),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    let edge = (0..CHOSEN, IMPLIED_BASE..IMPLIED_BASE + IMPLIED);
    prop_oneof![
        edge.clone().prop_map(|(c, i)| Edit::Insert(c, i)),
        edge.prop_map(|(c, i)| Edit::Remove(c, i)),
    ]
}

fn bitmap(ids: impl Iterator<Item = u32>) -> RoaringBitmap {
    ids.collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn incremental_edits_match_an_edge_set(edits in prop::collection::vec(edit_strategy(), 0..64)) {
        let mut graph = FilterGraph::new();
        let mut naive: BTreeSet<(u32, u32)> = BTreeSet::new();

        for edit in edits {
            match edit {
                Edit::Insert(c, i) => {
                    let added = graph.insert(FilterId::new(c), FilterId::new(i));
                    prop_assert_eq!(added, naive.insert((c, i)));
                }
                Edit::Remove(c, i) => {
                    let removed = graph.remove(FilterId::new(c), FilterId::new(i));
                    prop_assert_eq!(removed, naive.remove(&(c, i)));
                }
            }
        }

        prop_assert_eq!(graph.len(), naive.len());
        prop_assert_eq!(graph.is_empty(), naive.is_empty());

        for c in 0..CHOSEN {
            let expected = bitmap(naive.iter().filter(|(cc, _)| *cc == c).map(|(_, i)| *i));
            let actual = graph.implied_by(FilterId::new(c)).cloned().unwrap_or_default();
            prop_assert_eq!(actual, expected);
        }
        for i in IMPLIED_BASE..IMPLIED_BASE + IMPLIED {
            let expected = bitmap(naive.iter().filter(|(_, ii)| *ii == i).map(|(c, _)| *c));
            let actual = graph.implying(FilterId::new(i)).cloned().unwrap_or_default();
            prop_assert_eq!(actual, expected);
        }

        let edges: Vec<Implication> = naive
            .iter()
            .map(|&(c, i)| Implication { chosen: FilterId::new(c), implied: FilterId::new(i) })
            .collect();
        prop_assert_eq!(graph.edges(), edges);
    }

    #[test]
    fn image_is_union_of_forward_edges(
        edges in prop::collection::vec((0..CHOSEN, IMPLIED_BASE..IMPLIED_BASE + IMPLIED), 0..32),
        held in prop::collection::btree_set(0..CHOSEN, 0..4),
    ) {
        let mut graph = FilterGraph::new();
        for &(c, i) in &edges {
            graph.insert(FilterId::new(c), FilterId::new(i));
        }

        let expected = bitmap(
            edges
                .iter()
                .filter(|(c, _)| held.contains(c))
                .map(|(_, i)| *i),
        );
        prop_assert_eq!(graph.image(held.iter().map(|&c| FilterId::new(c))), expected);
    }
}
