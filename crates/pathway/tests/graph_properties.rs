//! Property tests: assembled graphs are always valid DAGs, selected
//! pathways are always well formed, and the selector agrees with an
//! exhaustive search over every MIE to AO path.

use proptest::prelude::*;

use extract::{BiologicalLevel, EventId, EventType, KeyEvent, ProposedRelationship};
use pathway::{AssembledGraph, GraphAssembler, PathwaySelector};
use std::cmp::Ordering;
use score::{Score, ScoredRelationship};

const LABELS: &[&str] = &[
    "Receptor activation",
    "Gene expression change",
    "Hormone synthesis decrease",
    "Apoptosis of granulosa cells",
    "Granulosa cell apoptosis",
    "Follicle loss",
    "Liver weight increase",
    "Reduced fertility",
    "Population decline",
    "Oxidative stress",
];

fn events(types: &[u8]) -> Vec<KeyEvent> {
    types
        .iter()
        .enumerate()
        .map(|(i, t)| KeyEvent {
            id: EventId(i as u32 + 1),
            label: LABELS[i % LABELS.len()].to_string(),
            description: None,
            organ: None,
            event_type: match t % 3 {
                0 => EventType::MIE,
                1 => EventType::KE,
                _ => EventType::AO,
            },
            biological_level: BiologicalLevel::Cellular,
            evidence_count: 0,
        })
        .collect()
}

fn scored(n: usize, edges: &[(usize, usize, f64)]) -> Vec<ScoredRelationship> {
    edges
        .iter()
        .map(|&(s, t, strength)| ScoredRelationship {
            proposal: ProposedRelationship {
                source_id: EventId((s % n) as u32 + 1),
                target_id: EventId((t % n) as u32 + 1),
                excerpt: format!("{s} caused {t}"),
                supporting_excerpts: vec![format!("{s} caused {t}")],
            },
            score: (strength > 0.05).then(|| Score {
                strength,
                justification: String::new(),
            }),
        })
        .collect()
}

fn graph_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<(usize, usize, f64)>)> {
    (2usize..10).prop_flat_map(|n| {
        (
            prop::collection::vec(0u8..3, n),
            prop::collection::vec((0..n, 0..n, 0.0_f64..=1.0_f64), 0..n * 3),
        )
    })
}

/// Every MIE to AO path with its weakest link, by depth-first enumeration.
fn every_route(graph: &AssembledGraph) -> Vec<(f64, Vec<EventId>)> {
    let mut routes = Vec::new();
    for start in graph.events_of(EventType::MIE) {
        let mut stack = vec![(vec![start.id], f64::INFINITY)];
        while let Some((path, weakest)) = stack.pop() {
            let last = path[path.len() - 1];
            if path.len() > 1 && graph.event(last).is_some_and(|e| e.event_type == EventType::AO) {
                routes.push((weakest, path.clone()));
            }
            for rel in graph.relationships.iter().filter(|r| r.source_id == last) {
                if path.contains(&rel.target_id) {
                    continue;
                }
                let mut next = path.clone();
                next.push(rel.target_id);
                stack.push((next, weakest.min(rel.evidence_strength)));
            }
        }
    }
    routes
}

fn id_sum(path: &[EventId]) -> u64 {
    path.iter().map(|id| u64::from(id.0)).sum()
}

/// Strongest weakest link, then more edges, then lower id sum, then the
/// lexicographically smaller id sequence.
fn preferred(a: &(f64, Vec<EventId>), b: &(f64, Vec<EventId>)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.len().cmp(&a.1.len()))
        .then_with(|| id_sum(&a.1).cmp(&id_sum(&b.1)))
        .then_with(|| a.1.cmp(&b.1))
}

proptest! {
    #[test]
    fn assembled_graphs_are_acyclic_and_consistent((types, edges) in graph_strategy()) {
        let events = events(&types);
        let n = events.len();
        let assembly = GraphAssembler::new().assemble(events, Vec::new(), scored(n, &edges));
        let graph = &assembly.graph;

        prop_assert!(graph.topological_order().is_some());
        for rel in &graph.relationships {
            prop_assert!((0.0..=1.0).contains(&rel.evidence_strength));
            prop_assert_ne!(rel.source_id, rel.target_id);
            prop_assert!(graph.event(rel.source_id).is_some());
            prop_assert!(graph.event(rel.target_id).is_some());
        }
        let mut pairs: Vec<_> = graph.relationships.iter().map(|r| r.pair()).collect();
        pairs.dedup();
        prop_assert_eq!(pairs.len(), graph.relationships.len());
    }

    #[test]
    fn selected_pathways_are_well_formed((types, edges) in graph_strategy()) {
        let events = events(&types);
        let n = events.len();
        let assembly = GraphAssembler::new().assemble(events, Vec::new(), scored(n, &edges));

        if let Ok(pathway) = PathwaySelector::new().select(&assembly.graph) {
            prop_assert!(pathway.events.len() >= 2);
            prop_assert_eq!(pathway.events[0].event_type, EventType::MIE);
            prop_assert_eq!(pathway.events.last().map(|e| e.event_type), Some(EventType::AO));
            prop_assert_eq!(pathway.links.len(), pathway.events.len() - 1);

            let bottleneck = pathway.bottleneck.unwrap();
            for (i, link) in pathway.links.iter().enumerate() {
                prop_assert_eq!(link.source_id, pathway.events[i].id);
                prop_assert_eq!(link.target_id, pathway.events[i + 1].id);
                prop_assert!(link.evidence_strength >= bottleneck);
            }

            let mut seen = pathway.ids();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), pathway.events.len());
        }
    }

    #[test]
    fn selection_matches_exhaustive_search((types, edges) in graph_strategy()) {
        let events = events(&types);
        let n = events.len();
        let assembly = GraphAssembler::new().assemble(events, Vec::new(), scored(n, &edges));
        let graph = &assembly.graph;

        let expected = every_route(graph).into_iter().min_by(preferred);
        match (PathwaySelector::new().select(graph), expected) {
            (Ok(pathway), Some((weakest, path))) => {
                prop_assert_eq!(pathway.bottleneck, Some(weakest));
                prop_assert_eq!(pathway.ids(), path);
            }
            (Err(_), None) => {}
            (Ok(pathway), None) => prop_assert!(false, "selected {:?} but no route exists", pathway.ids()),
            (Err(e), Some((_, path))) => prop_assert!(false, "{} although {:?} exists", e, path),
        }
    }
}
