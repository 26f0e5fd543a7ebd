use futures::stream::{self, StreamExt, TryStreamExt};
use ingest::Chunk;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::ExtractError;
use crate::excerpt::{ExcerptLocator, truncate_chars};
use crate::llm::{GenerationTask, LanguageModel, generate_structured};
use crate::prompt;
use crate::retry::RetryPolicy;
use crate::schema::{
    BiologicalLevel, EventEvidence, EventExtraction, EventId, EventType, KeyEvent, RawEvent,
    RawEventList,
};

/// Proposes candidate key events, one capability call per chunk.
pub struct EventExtractor {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    max_concurrent_calls: usize,
    max_excerpt_chars: usize,
}

impl EventExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self {
            model,
            retry,
            max_concurrent_calls: 3,
            max_excerpt_chars: 600,
        }
    }

    pub fn with_concurrency(mut self, max_concurrent_calls: usize) -> Self {
        self.max_concurrent_calls = max_concurrent_calls.max(1);
        self
    }

    pub fn with_max_excerpt_chars(mut self, max_excerpt_chars: usize) -> Self {
        self.max_excerpt_chars = max_excerpt_chars;
        self
    }

    /// Extract candidates from every chunk. Chunks are processed concurrently
    /// but merged back in chunk order before ids are assigned, so the same
    /// answers always yield the same ids.
    pub async fn extract(
        &self,
        topic: &str,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<EventExtraction, ExtractError> {
        if chunks.is_empty() {
            return Err(ExtractError::Empty {
                reason: "document has no text".to_string(),
            });
        }

        // Built up front so the buffered stream stays Send
        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| self.extract_chunk(topic, chunk, cancel))
            .collect();
        let per_chunk: Vec<Vec<RawEvent>> = stream::iter(calls)
            .buffered(self.max_concurrent_calls)
            .try_collect()
            .await?;

        let extraction = self.assign_ids(per_chunk);
        if extraction.events.is_empty() {
            return Err(ExtractError::Empty {
                reason: format!("no usable events in {} chunk(s)", chunks.len()),
            });
        }

        info!(
            events = extraction.events.len(),
            mie = extraction.count_of(EventType::MIE),
            ke = extraction.count_of(EventType::KE),
            ao = extraction.count_of(EventType::AO),
            "Event extraction complete"
        );
        if extraction.count_of(EventType::MIE) == 0 || extraction.count_of(EventType::AO) == 0 {
            warn!("No MIE or no AO extracted; pathway selection will be best-effort");
        }

        Ok(extraction)
    }

    async fn extract_chunk(
        &self,
        topic: &str,
        chunk: &Chunk,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawEvent>, ExtractError> {
        let prompt = prompt::build_event_prompt(topic, &chunk.text);
        let list: RawEventList = generate_structured(
            self.model.as_ref(),
            GenerationTask::Events,
            &prompt,
            &self.retry,
            cancel,
        )
        .await?;

        let mut events = list.into_events();
        let locator = ExcerptLocator::new(&chunk.text);
        for event in &mut events {
            let quotes = std::mem::take(&mut event.evidence);
            for quote in quotes {
                match locator.locate(&quote) {
                    Some(found) => event.evidence.push(found.to_string()),
                    None => debug!(chunk = chunk.index, label = %event.name, "Dropping event quote not found in chunk"),
                }
            }
        }
        debug!(
            chunk = chunk.index,
            tokens = chunk.estimated_tokens(),
            candidates = events.len(),
            "Chunk extracted"
        );
        Ok(events)
    }

    fn assign_ids(&self, per_chunk: Vec<Vec<RawEvent>>) -> EventExtraction {
        let mut extraction = EventExtraction::default();
        let mut next_id = 1;

        for raw in per_chunk.into_iter().flatten() {
            let label = raw.name.trim();
            if label.is_empty() {
                warn!("Skipping candidate event with an empty label");
                continue;
            }

            let Some(event_type) = raw.event_type.as_deref().and_then(EventType::parse) else {
                warn!(label, event_type = ?raw.event_type, "Skipping candidate event without a valid type");
                continue;
            };

            let biological_level =
                BiologicalLevel::resolve(raw.biological_level.as_deref(), label, event_type);

            let id = EventId(next_id);
            next_id += 1;

            for quote in raw.evidence.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
                let excerpt = truncate_chars(quote, self.max_excerpt_chars);
                if extraction.evidence.iter().any(|e| e.event_id == id && e.excerpt == excerpt) {
                    continue;
                }
                extraction.evidence.push(EventEvidence {
                    event_id: id,
                    excerpt: excerpt.to_string(),
                    confidence: None,
                });
            }

            extraction.events.push(KeyEvent {
                id,
                label: label.to_string(),
                description: non_empty(raw.description),
                organ: non_empty(raw.organ),
                event_type,
                biological_level,
                evidence_count: 0,
            });
        }

        extraction
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
