use extract::{EventId, EventType, KeyEvent};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    LeadsTo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: EventId,
    pub target_id: EventId,
    pub evidence_strength: f64,
    pub evidence_excerpt: String,
    pub justification: String,
    pub relationship_type: RelationshipType,
}

impl Relationship {
    pub fn pair(&self) -> (EventId, EventId) {
        (self.source_id, self.target_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub key_event_id: EventId,
    pub excerpt: String,
    pub confidence: Option<f64>,
    /// Set when the record substantiates a relationship rather than the
    /// event on its own
    pub relationship: Option<(EventId, EventId)>,
}

/// One duplicate folded into its canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMerge {
    pub canonical: EventId,
    pub merged: EventId,
    pub merged_label: String,
}

/// Deduplicated, acyclic event graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledGraph {
    /// Sorted by id
    pub events: Vec<KeyEvent>,
    /// Sorted by `(source_id, target_id)`, one per pair
    pub relationships: Vec<Relationship>,
    pub evidence: Vec<EvidenceRecord>,
    pub merges: Vec<EventMerge>,
}

impl AssembledGraph {
    pub fn event(&self, id: EventId) -> Option<&KeyEvent> {
        self.events
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.events[i])
    }

    pub fn events_of(&self, event_type: EventType) -> impl Iterator<Item = &KeyEvent> {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }

    pub fn relationship(&self, source: EventId, target: EventId) -> Option<&Relationship> {
        self.relationships
            .binary_search_by_key(&(source, target), Relationship::pair)
            .ok()
            .map(|i| &self.relationships[i])
    }

    /// Directed graph over every event, edges weighted by strength.
    pub fn digraph(&self) -> (DiGraph<EventId, f64>, HashMap<EventId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for event in &self.events {
            index.insert(event.id, graph.add_node(event.id));
        }
        for rel in &self.relationships {
            if let (Some(&s), Some(&t)) = (index.get(&rel.source_id), index.get(&rel.target_id)) {
                graph.add_edge(s, t, rel.evidence_strength);
            }
        }
        (graph, index)
    }

    /// Event ids in an order where every edge points forward. `None` only if
    /// the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<EventId>> {
        let (graph, _) = self.digraph();
        toposort(&graph, None)
            .ok()
            .map(|order| order.into_iter().map(|n| graph[n]).collect())
    }

    pub fn evidence_for(&self, id: EventId) -> impl Iterator<Item = &EvidenceRecord> {
        self.evidence.iter().filter(move |r| r.key_event_id == id)
    }
}
