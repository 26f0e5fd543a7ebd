//! Turns scored candidates into a consistent event graph.
//!
//! Steps, in order: fold duplicate events into the lowest id of their
//! cluster, re-point relationships onto canonical ids, collapse repeated
//! pairs, then break cycles by dropping the weakest edge inside each
//! strongly connected component until none is left.

use extract::excerpt::most_informative;
use extract::{EventEvidence, EventId, KeyEvent, LabelNormalizer};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use score::ScoredRelationship;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::graph::{AssembledGraph, EventMerge, EvidenceRecord, Relationship, RelationshipType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    /// The scorer found no support in the excerpt
    Unsupported,
    UnknownEndpoint,
    /// Both endpoints merged into the same event
    SelfLoop,
    /// Weakest edge of a cycle
    Cycle { strength: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRelationship {
    pub source_id: EventId,
    pub target_id: EventId,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub graph: AssembledGraph,
    /// In the order the drops happened
    pub dropped: Vec<DroppedRelationship>,
}

impl Assembly {
    pub fn cycle_breaks(&self) -> impl Iterator<Item = &DroppedRelationship> {
        self.dropped
            .iter()
            .filter(|d| matches!(d.reason, DropReason::Cycle { .. }))
    }
}

struct Candidate {
    strength: f64,
    justification: String,
    excerpt: String,
    supporting_excerpts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphAssembler;

impl GraphAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        mut events: Vec<KeyEvent>,
        event_evidence: Vec<EventEvidence>,
        scored: Vec<ScoredRelationship>,
    ) -> Assembly {
        events.sort_by_key(|e| e.id);

        // Dedup
        let mut normalizer = LabelNormalizer::new();
        let mut canonical: HashMap<EventId, EventId> = HashMap::new();
        let mut merges = Vec::new();
        let mut retained = Vec::new();
        for event in events {
            let id = normalizer.canonicalize(&event);
            canonical.insert(event.id, id);
            if id == event.id {
                retained.push(event);
            } else {
                debug!(canonical = %id, merged = %event.id, label = %event.label, "Merging duplicate event");
                merges.push(EventMerge {
                    canonical: id,
                    merged: event.id,
                    merged_label: event.label,
                });
            }
        }

        // Overlapping chunks quote the same sentence for the same event
        let mut evidence: Vec<EvidenceRecord> = Vec::with_capacity(event_evidence.len());
        for e in event_evidence {
            let Some(&id) = canonical.get(&e.event_id) else {
                continue;
            };
            if evidence.iter().any(|r| r.key_event_id == id && r.excerpt == e.excerpt) {
                continue;
            }
            evidence.push(EvidenceRecord {
                key_event_id: id,
                excerpt: e.excerpt,
                confidence: e.confidence,
                relationship: None,
            });
        }

        // Re-point and group
        let mut dropped = Vec::new();
        let mut grouped: BTreeMap<(EventId, EventId), Vec<Candidate>> = BTreeMap::new();
        for item in scored {
            let (source_id, target_id) = item.pair();
            let Some(score) = item.score else {
                dropped.push(DroppedRelationship {
                    source_id,
                    target_id,
                    reason: DropReason::Unsupported,
                });
                continue;
            };

            let (Some(&s), Some(&t)) = (canonical.get(&source_id), canonical.get(&target_id)) else {
                dropped.push(DroppedRelationship {
                    source_id,
                    target_id,
                    reason: DropReason::UnknownEndpoint,
                });
                continue;
            };
            if s == t {
                dropped.push(DroppedRelationship {
                    source_id,
                    target_id,
                    reason: DropReason::SelfLoop,
                });
                continue;
            }

            grouped.entry((s, t)).or_default().push(Candidate {
                strength: score.strength.clamp(0.0, 1.0),
                justification: score.justification,
                excerpt: item.proposal.excerpt,
                supporting_excerpts: item.proposal.supporting_excerpts,
            });
        }

        let mut relationships = Vec::with_capacity(grouped.len());
        let mut relationship_evidence: BTreeMap<(EventId, EventId), Vec<EvidenceRecord>> = BTreeMap::new();
        for ((s, t), candidates) in grouped {
            let Some(best) = strongest(&candidates) else {
                continue;
            };

            let records = relationship_evidence.entry((s, t)).or_default();
            for candidate in &candidates {
                let excerpts = std::iter::once(&candidate.excerpt).chain(&candidate.supporting_excerpts);
                for excerpt in excerpts {
                    if records.iter().any(|r| &r.excerpt == excerpt) {
                        continue;
                    }
                    records.push(EvidenceRecord {
                        key_event_id: t,
                        excerpt: excerpt.clone(),
                        confidence: Some(candidate.strength),
                        relationship: Some((s, t)),
                    });
                }
            }

            relationships.push(Relationship {
                source_id: s,
                target_id: t,
                evidence_strength: best.strength,
                evidence_excerpt: best.excerpt.clone(),
                justification: best.justification.clone(),
                relationship_type: RelationshipType::LeadsTo,
            });
        }

        let relationships = break_cycles(relationships, &mut dropped);
        for rel in &relationships {
            if let Some(records) = relationship_evidence.remove(&rel.pair()) {
                evidence.extend(records);
            }
        }

        for event in &mut retained {
            event.evidence_count = evidence
                .iter()
                .filter(|r| {
                    r.key_event_id == event.id || r.relationship.is_some_and(|(source, _)| source == event.id)
                })
                .count();
        }

        info!(
            events = retained.len(),
            merged = merges.len(),
            relationships = relationships.len(),
            dropped = dropped.len(),
            "Graph assembled"
        );

        Assembly {
            graph: AssembledGraph {
                events: retained,
                relationships,
                evidence,
                merges,
            },
            dropped,
        }
    }
}

/// Highest strength wins; among equals the most informative excerpt.
fn strongest(candidates: &[Candidate]) -> Option<&Candidate> {
    let top = candidates
        .iter()
        .map(|c| c.strength)
        .max_by(|a, b| a.total_cmp(b))?;
    let tied: Vec<&Candidate> = candidates.iter().filter(|c| c.strength == top).collect();
    let excerpt = most_informative(tied.iter().map(|c| c.excerpt.as_str()))?;
    tied.into_iter().find(|c| c.excerpt == excerpt)
}

/// Drop edges until the graph is acyclic. Each round removes the weakest edge
/// lying inside a non-trivial strongly connected component; ties go to the
/// edge created last, i.e. the greatest `(source_id, target_id)`.
fn break_cycles(mut relationships: Vec<Relationship>, dropped: &mut Vec<DroppedRelationship>) -> Vec<Relationship> {
    loop {
        let mut graph = DiGraph::<EventId, ()>::new();
        let mut index = HashMap::new();
        for rel in &relationships {
            for id in [rel.source_id, rel.target_id] {
                index.entry(id).or_insert_with(|| graph.add_node(id));
            }
            graph.add_edge(index[&rel.source_id], index[&rel.target_id], ());
        }

        let mut component: HashMap<EventId, usize> = HashMap::new();
        for (i, scc) in tarjan_scc(&graph).into_iter().enumerate() {
            if scc.len() > 1 {
                for node in scc {
                    component.insert(graph[node], i);
                }
            }
        }
        if component.is_empty() {
            return relationships;
        }

        let weakest = relationships
            .iter()
            .enumerate()
            .filter(|(_, rel)| {
                matches!(
                    (component.get(&rel.source_id), component.get(&rel.target_id)),
                    (Some(a), Some(b)) if a == b
                )
            })
            .min_by(|(_, a), (_, b)| {
                a.evidence_strength
                    .total_cmp(&b.evidence_strength)
                    .then_with(|| b.pair().cmp(&a.pair()))
            })
            .map(|(i, _)| i);

        // A non-trivial component always has an internal edge
        let Some(i) = weakest else {
            return relationships;
        };
        let removed = relationships.remove(i);
        warn!(
            source = %removed.source_id,
            target = %removed.target_id,
            strength = removed.evidence_strength,
            "Cycle detected, dropping weakest edge"
        );
        dropped.push(DroppedRelationship {
            source_id: removed.source_id,
            target_id: removed.target_id,
            reason: DropReason::Cycle {
                strength: removed.evidence_strength,
            },
        });
    }
}
