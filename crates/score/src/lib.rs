pub mod cache;
pub mod error;
pub mod heuristic;
pub mod model;

pub use cache::{CacheStats, CachedScorer, PinnedScores, ScoreCache, load_pins};
pub use error::ScoreError;
pub use heuristic::HeuristicScorer;
pub use model::ModelScorer;

use async_trait::async_trait;
use extract::{CancellationToken, EventId, KeyEvent, ProposedRelationship};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Strength and reasoning assigned to one relationship excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub strength: f64,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    pub source_label: String,
    pub target_label: String,
    pub excerpt: String,
}

/// Assigns evidence strength to a proposed relationship. `Ok(None)` means the
/// excerpt does not support the relationship at all.
#[async_trait]
pub trait EvidenceScorer: Send + Sync {
    async fn score(
        &self,
        request: &ScoreRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Score>, ScoreError>;

    fn name(&self) -> &str {
        "scorer"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRelationship {
    pub proposal: ProposedRelationship,
    pub score: Option<Score>,
}

impl ScoredRelationship {
    pub fn pair(&self) -> (EventId, EventId) {
        (self.proposal.source_id, self.proposal.target_id)
    }
}

/// Score every proposal with bounded concurrency. Completion order does not
/// matter; results come back sorted by event id pair.
pub async fn score_all(
    scorer: &dyn EvidenceScorer,
    events: &[KeyEvent],
    proposals: Vec<ProposedRelationship>,
    max_concurrent: usize,
    cancel: &CancellationToken,
) -> Result<Vec<ScoredRelationship>, ScoreError> {
    let labels: HashMap<EventId, &str> = events.iter().map(|e| (e.id, e.label.as_str())).collect();
    let labels = &labels;
    let label_of = move |id: EventId| {
        labels
            .get(&id)
            .map(|label| label.to_string())
            .unwrap_or_else(|| id.to_string())
    };

    let calls: Vec<_> = proposals
        .into_iter()
        .map(|proposal| async move {
            let request = ScoreRequest {
                source_label: label_of(proposal.source_id),
                target_label: label_of(proposal.target_id),
                excerpt: proposal.excerpt.clone(),
            };
            let score = scorer.score(&request, cancel).await?;
            debug!(
                source = %proposal.source_id,
                target = %proposal.target_id,
                strength = score.as_ref().map(|s| s.strength),
                "Relationship scored"
            );
            Ok::<_, ScoreError>(ScoredRelationship { proposal, score })
        })
        .collect();
    let mut scored: Vec<ScoredRelationship> = stream::iter(calls)
        .buffer_unordered(max_concurrent.max(1))
        .try_collect()
        .await?;

    scored.sort_by_key(ScoredRelationship::pair);

    let rejected = scored.iter().filter(|s| s.score.is_none()).count();
    info!(
        scorer = scorer.name(),
        scored = scored.len() - rejected,
        rejected,
        "Evidence scoring complete"
    );
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{BiologicalLevel, EventType};

    fn event(id: u32, label: &str) -> KeyEvent {
        KeyEvent {
            id: EventId(id),
            label: label.to_string(),
            description: None,
            organ: None,
            event_type: EventType::KE,
            biological_level: BiologicalLevel::Cellular,
            evidence_count: 0,
        }
    }

    fn proposal(source: u32, target: u32, excerpt: &str) -> ProposedRelationship {
        ProposedRelationship {
            source_id: EventId(source),
            target_id: EventId(target),
            excerpt: excerpt.to_string(),
            supporting_excerpts: vec![excerpt.to_string()],
        }
    }

    #[tokio::test]
    async fn results_are_sorted_and_rejections_kept() {
        let events = vec![event(1, "A"), event(2, "B"), event(3, "C")];
        let proposals = vec![
            proposal(2, 3, "B caused C via receptor binding."),
            proposal(1, 2, "A and B were both measured."),
            proposal(1, 3, "Toluene exposure reduced C."),
        ];

        let scored = score_all(&HeuristicScorer::new(), &events, proposals, 4, &CancellationToken::new())
            .await
            .unwrap();

        let pairs: Vec<(u32, u32)> = scored.iter().map(|s| (s.pair().0.0, s.pair().1.0)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
        assert!(scored[0].score.is_none());
        assert!(scored[2].score.as_ref().unwrap().strength >= 0.8);
    }
}
