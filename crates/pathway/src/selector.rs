use extract::{EventId, EventType, KeyEvent};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use crate::graph::{AssembledGraph, Relationship};

/// Ordered chain from an initiating event to an adverse outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    pub events: Vec<KeyEvent>,
    /// `links[i]` connects `events[i]` to `events[i + 1]`
    pub links: Vec<Relationship>,
    /// Weakest link strength
    pub bottleneck: Option<f64>,
}

impl Pathway {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum NoPathway {
    #[error("no molecular initiating event was extracted")]
    NoInitiatingEvent,

    #[error("no adverse outcome was extracted")]
    NoAdverseOutcome,

    #[error("no initiating event connects to an adverse outcome")]
    Disconnected,
}

/// Best path found so far to a node.
#[derive(Debug, Clone)]
struct Route {
    nodes: Vec<EventId>,
    id_sum: u64,
}

impl Route {
    fn start(id: EventId) -> Self {
        Self {
            nodes: vec![id],
            id_sum: u64::from(id.0),
        }
    }

    fn extend(&self, id: EventId) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(id);
        Self {
            nodes,
            id_sum: self.id_sum + u64::from(id.0),
        }
    }

    /// `Less` means `self` is preferred: more edges, then a lower id sum,
    /// then the lexicographically smaller id sequence.
    fn preference(&self, other: &Route) -> Ordering {
        other
            .nodes
            .len()
            .cmp(&self.nodes.len())
            .then_with(|| self.id_sum.cmp(&other.id_sum))
            .then_with(|| self.nodes.cmp(&other.nodes))
    }
}

/// Picks the MIE to AO path with the strongest weakest link.
#[derive(Debug, Clone, Default)]
pub struct PathwaySelector;

impl PathwaySelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, graph: &AssembledGraph) -> Result<Pathway, NoPathway> {
        let starts: HashSet<EventId> = graph.events_of(EventType::MIE).map(|e| e.id).collect();
        let ends: HashSet<EventId> = graph.events_of(EventType::AO).map(|e| e.id).collect();
        if starts.is_empty() {
            return Err(NoPathway::NoInitiatingEvent);
        }
        if ends.is_empty() {
            return Err(NoPathway::NoAdverseOutcome);
        }

        let (full, index) = graph.digraph();

        // Strongest threshold at which some MIE still reaches some AO
        let mut thresholds: Vec<f64> = graph.relationships.iter().map(|r| r.evidence_strength).collect();
        thresholds.sort_by(|a, b| b.total_cmp(a));
        thresholds.dedup();

        let start_nodes: Vec<NodeIndex> = starts.iter().filter_map(|id| index.get(id).copied()).collect();
        let bottleneck = thresholds
            .into_iter()
            .find(|&t| reaches_any(&full, &start_nodes, &ends, t))
            .ok_or(NoPathway::Disconnected)?;
        debug!(bottleneck, "Bottleneck threshold found");

        let route = best_route(&full, &starts, &ends, bottleneck).ok_or(NoPathway::Disconnected)?;

        let events: Vec<KeyEvent> = route
            .nodes
            .iter()
            .filter_map(|id| graph.event(*id).cloned())
            .collect();
        let links: Vec<Relationship> = route
            .nodes
            .windows(2)
            .filter_map(|pair| graph.relationship(pair[0], pair[1]).cloned())
            .collect();

        info!(
            steps = events.len(),
            bottleneck,
            "Pathway selected"
        );
        Ok(Pathway {
            events,
            links,
            bottleneck: Some(bottleneck),
        })
    }
}

fn reaches_any(graph: &DiGraph<EventId, f64>, starts: &[NodeIndex], ends: &HashSet<EventId>, threshold: f64) -> bool {
    let mut seen: HashSet<NodeIndex> = starts.iter().copied().collect();
    let mut queue: VecDeque<NodeIndex> = starts.iter().copied().collect();

    while let Some(node) = queue.pop_front() {
        for edge in graph.edges_directed(node, Direction::Outgoing) {
            if *edge.weight() < threshold {
                continue;
            }
            let next = edge.target();
            if ends.contains(&graph[next]) {
                return true;
            }
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Dynamic programme over a topological order using only edges at or above
/// `threshold`. Routes only ever begin at an MIE.
fn best_route(
    graph: &DiGraph<EventId, f64>,
    starts: &HashSet<EventId>,
    ends: &HashSet<EventId>,
    threshold: f64,
) -> Option<Route> {
    let order = toposort(graph, None).ok()?;
    let mut best: HashMap<NodeIndex, Route> = HashMap::new();

    for node in order {
        let id = graph[node];
        let mut candidate = starts.contains(&id).then(|| Route::start(id));

        for edge in graph.edges_directed(node, Direction::Incoming) {
            if *edge.weight() < threshold {
                continue;
            }
            let Some(prev) = best.get(&edge.source()) else {
                continue;
            };
            let extended = prev.extend(id);
            let better = match &candidate {
                Some(current) => extended.preference(current) == Ordering::Less,
                None => true,
            };
            if better {
                candidate = Some(extended);
            }
        }

        if let Some(route) = candidate {
            best.insert(node, route);
        }
    }

    best.into_iter()
        .filter(|(node, route)| ends.contains(&graph[*node]) && route.nodes.len() > 1)
        .map(|(_, route)| route)
        .min_by(|a, b| a.preference(b))
}
