use futures::stream::{self, StreamExt, TryStreamExt};
use ingest::{Chunk, Document};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::ExtractError;
use crate::excerpt::{ExcerptLocator, most_informative, truncate_chars};
use crate::llm::{GenerationTask, LanguageModel, generate_structured};
use crate::prompt;
use crate::retry::RetryPolicy;
use crate::schema::{
    EventId, KeyEvent, ProposedRelationship, RawRelationship, RawRelationshipList,
    RejectedRelationship, RelationshipExtraction,
};

#[derive(Debug, Clone)]
pub struct RelationshipConfig {
    pub max_excerpt_chars: usize,
    /// Excerpts must be found in the document text
    pub require_verbatim_excerpts: bool,
    /// Reject edges that go down the biological level hierarchy
    pub enforce_level_progression: bool,
    pub max_concurrent_calls: usize,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            max_excerpt_chars: 600,
            require_verbatim_excerpts: true,
            enforce_level_progression: false,
            max_concurrent_calls: 3,
        }
    }
}

/// Event as shown to the model when asking for edges.
#[derive(Serialize)]
struct PromptEvent<'a> {
    id: String,
    name: &'a str,
    event_type: &'a str,
    biological_level: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Proposes directed, excerpt-backed edges between candidate events.
pub struct RelationshipExtractor {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    config: RelationshipConfig,
}

impl RelationshipExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy, config: RelationshipConfig) -> Self {
        Self { model, retry, config }
    }

    pub async fn extract(
        &self,
        document: &Document,
        chunks: &[Chunk],
        events: &[KeyEvent],
        cancel: &CancellationToken,
    ) -> Result<RelationshipExtraction, ExtractError> {
        let events_json = self.events_json(events)?;

        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| self.extract_chunk(chunk, &events_json, cancel))
            .collect();
        let per_chunk: Vec<Vec<RawRelationship>> = stream::iter(calls)
            .buffered(self.config.max_concurrent_calls.max(1))
            .try_collect()
            .await?;

        let extraction = self.validate(document, events, per_chunk.into_iter().flatten());
        info!(
            relationships = extraction.relationships.len(),
            rejected = extraction.rejected.len(),
            "Relationship extraction complete"
        );
        Ok(extraction)
    }

    fn events_json(&self, events: &[KeyEvent]) -> Result<String, ExtractError> {
        let shown: Vec<PromptEvent<'_>> = events
            .iter()
            .map(|e| PromptEvent {
                id: e.id.to_string(),
                name: &e.label,
                event_type: e.event_type.as_str(),
                biological_level: e.biological_level.as_str(),
                description: e.description.as_deref(),
            })
            .collect();

        serde_json::to_string_pretty(&shown).map_err(|e| ExtractError::InvalidResponse {
            task: GenerationTask::Relationships,
            reason: format!("could not serialise events: {e}"),
        })
    }

    async fn extract_chunk(
        &self,
        chunk: &Chunk,
        events_json: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRelationship>, ExtractError> {
        let prompt = prompt::build_relationship_prompt(&chunk.text, events_json);
        let list: RawRelationshipList = generate_structured(
            self.model.as_ref(),
            GenerationTask::Relationships,
            &prompt,
            &self.retry,
            cancel,
        )
        .await?;

        let relationships = list.into_relationships();
        debug!(chunk = chunk.index, proposals = relationships.len(), "Chunk relationships extracted");
        Ok(relationships)
    }

    /// Keep only attributable edges between known events and collapse repeats
    /// of the same pair into one proposal.
    pub fn validate<I>(&self, document: &Document, events: &[KeyEvent], raw: I) -> RelationshipExtraction
    where
        I: IntoIterator<Item = RawRelationship>,
    {
        let by_id: HashMap<EventId, &KeyEvent> = events.iter().map(|e| (e.id, e)).collect();
        let locator = ExcerptLocator::new(&document.text);

        let mut grouped: BTreeMap<(EventId, EventId), Vec<String>> = BTreeMap::new();
        let mut rejected = Vec::new();

        for rel in raw {
            let mut reject = |reason: &str| {
                warn!(
                    source = %rel.source_event_id,
                    target = %rel.target_event_id,
                    reason,
                    "Dropping relationship"
                );
                rejected.push(RejectedRelationship {
                    source: rel.source_event_id.clone(),
                    target: rel.target_event_id.clone(),
                    reason: reason.to_string(),
                });
            };

            let source = rel.source_event_id.parse::<EventId>().ok().and_then(|id| by_id.get(&id));
            let target = rel.target_event_id.parse::<EventId>().ok().and_then(|id| by_id.get(&id));
            let (Some(source), Some(target)) = (source, target) else {
                reject("endpoint is not a known event");
                continue;
            };

            if source.id == target.id {
                reject("self-loop");
                continue;
            }

            let excerpt = rel.excerpt.trim();
            if excerpt.is_empty() {
                reject("no supporting excerpt");
                continue;
            }

            let excerpt = match locator.locate(excerpt) {
                Some(found) => found,
                None if self.config.require_verbatim_excerpts => {
                    reject("excerpt not found in document");
                    continue;
                }
                None => excerpt,
            };

            if self.config.enforce_level_progression {
                let (from, to) = (source.biological_level, target.biological_level);
                if to < from {
                    reject("backward biological level progression");
                    continue;
                }
                if to.rank() - from.rank() > 2 {
                    info!(from = %from, to = %to, "Large level jump between events");
                }
            }

            let excerpt = truncate_chars(excerpt, self.config.max_excerpt_chars).to_string();
            let excerpts = grouped.entry((source.id, target.id)).or_default();
            if !excerpts.contains(&excerpt) {
                excerpts.push(excerpt);
            }
        }

        let relationships = grouped
            .into_iter()
            .filter_map(|((source_id, target_id), mut supporting_excerpts)| {
                supporting_excerpts.sort();
                let excerpt = most_informative(supporting_excerpts.iter().map(String::as_str))?.to_string();
                Some(ProposedRelationship {
                    source_id,
                    target_id,
                    excerpt,
                    supporting_excerpts,
                })
            })
            .collect();

        RelationshipExtraction {
            relationships,
            rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationRequest, LlmError};
    use crate::schema::{BiologicalLevel, EventType};
    use async_trait::async_trait;

    const TEXT: &str = "Aromatase inhibition lowered estradiol. Lower estradiol caused atresia via loss of \
                        survival signaling. Atresia was linked to reduced fertility.";

    fn event(id: u32, label: &str, event_type: EventType, level: BiologicalLevel) -> KeyEvent {
        KeyEvent {
            id: EventId(id),
            label: label.to_string(),
            description: None,
            organ: None,
            event_type,
            biological_level: level,
            evidence_count: 0,
        }
    }

    fn events() -> Vec<KeyEvent> {
        vec![
            event(1, "Inhibition of aromatase", EventType::MIE, BiologicalLevel::Molecular),
            event(2, "Decreased estradiol", EventType::KE, BiologicalLevel::Molecular),
            event(3, "Follicular atresia", EventType::KE, BiologicalLevel::Tissue),
            event(4, "Reduced fertility", EventType::AO, BiologicalLevel::Organism),
        ]
    }

    fn raw(source: &str, target: &str, excerpt: &str) -> RawRelationship {
        RawRelationship {
            source_event_id: source.to_string(),
            target_event_id: target.to_string(),
            excerpt: excerpt.to_string(),
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    fn extractor(config: RelationshipConfig) -> RelationshipExtractor {
        RelationshipExtractor::new(Arc::new(Fixed("{}")), RetryPolicy::immediate(0), config)
    }

    #[test]
    fn unknown_endpoints_and_self_loops_are_rejected() {
        let doc = Document::new(None, TEXT);
        let result = extractor(RelationshipConfig::default()).validate(
            &doc,
            &events(),
            vec![
                raw("E1", "E9", "Aromatase inhibition lowered estradiol."),
                raw("E2", "E2", "Aromatase inhibition lowered estradiol."),
                raw("E1", "E2", "   "),
                raw("E1", "E2", "Aromatase inhibition lowered estradiol."),
            ],
        );

        assert_eq!(result.relationships.len(), 1);
        let reasons: Vec<&str> = result.rejected.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec!["endpoint is not a known event", "self-loop", "no supporting excerpt"]
        );
    }

    #[test]
    fn invented_excerpts_are_rejected() {
        let doc = Document::new(None, TEXT);
        let result = extractor(RelationshipConfig::default()).validate(
            &doc,
            &events(),
            vec![raw("E3", "E4", "Atresia definitively causes infertility in all species.")],
        );
        assert!(result.relationships.is_empty());
        assert_eq!(result.rejected[0].reason, "excerpt not found in document");
    }

    #[test]
    fn repeated_pairs_keep_the_most_informative_excerpt() {
        let doc = Document::new(None, TEXT);
        let result = extractor(RelationshipConfig::default()).validate(
            &doc,
            &events(),
            vec![
                raw("E2", "E3", "lower estradiol caused atresia"),
                raw("E2", "E3", "Lower estradiol caused atresia via loss of survival signaling."),
                raw("E1", "E2", "Aromatase inhibition lowered estradiol."),
            ],
        );

        assert_eq!(result.relationships.len(), 2);
        // sorted by event id pair
        assert_eq!(result.relationships[0].source_id, EventId(1));
        let merged = &result.relationships[1];
        assert_eq!(merged.excerpt, "Lower estradiol caused atresia via loss of survival signaling.");
        assert_eq!(merged.supporting_excerpts.len(), 2);
    }

    #[test]
    fn level_progression_is_optional() {
        let doc = Document::new(None, TEXT);
        let backward = vec![raw("E4", "E3", "Atresia was linked to reduced fertility.")];

        let lenient = extractor(RelationshipConfig::default()).validate(&doc, &events(), backward.clone());
        assert_eq!(lenient.relationships.len(), 1);

        let strict = extractor(RelationshipConfig {
            enforce_level_progression: true,
            ..RelationshipConfig::default()
        })
        .validate(&doc, &events(), backward);
        assert!(strict.relationships.is_empty());
        assert_eq!(strict.rejected[0].reason, "backward biological level progression");
    }

    #[tokio::test]
    async fn extract_runs_every_chunk_and_merges() {
        let doc = Document::new(None, TEXT);
        let chunks = vec![
            Chunk::new(doc.doc_id.clone(), 0, TEXT.to_string(), (0, TEXT.len())),
            Chunk::new(doc.doc_id.clone(), 1, TEXT.to_string(), (0, TEXT.len())),
        ];
        let model = Fixed(
            r#"{"relationships":[{"source_event_id":"E3","target_event_id":"E4","excerpt":"Atresia was linked to reduced fertility."}]}"#,
        );
        let extractor =
            RelationshipExtractor::new(Arc::new(model), RetryPolicy::immediate(0), RelationshipConfig::default());

        let result = extractor
            .extract(&doc, &chunks, &events(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].supporting_excerpts.len(), 1);
    }
}
