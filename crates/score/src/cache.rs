use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use extract::CancellationToken;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::{EvidenceScorer, Score, ScoreError, ScoreRequest};

/// Scores fixed ahead of time, keyed by excerpt hash. Shared read-only
/// between runs.
pub type PinnedScores = Arc<HashMap<String, Score>>;

/// Excerpt-hash keyed score cache. `None` entries remember rejections.
pub struct ScoreCache {
    entries: DashMap<String, Option<Score>>,
    pinned: PinnedScores,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ScoreCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_pins(max_entries, Arc::new(HashMap::new()))
    }

    pub fn with_pins(max_entries: usize, pinned: PinnedScores) -> Self {
        Self {
            entries: DashMap::new(),
            pinned,
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn excerpt_key(excerpt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(excerpt.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Outer `None` is a miss; inner `None` is a cached rejection.
    pub fn get(&self, excerpt: &str) -> Option<Option<Score>> {
        let key = Self::excerpt_key(excerpt);
        let found = match self.pinned.get(&key) {
            Some(pin) => Some(Some(pin.clone())),
            None => self.entries.get(&key).map(|r| r.value().clone()),
        };

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, excerpt: &str, score: Option<Score>) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .entries
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(Self::excerpt_key(excerpt), score);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached: self.entries.len(),
            pinned: self.pinned.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached: usize,
    pub pinned: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Load pinned scores from a JSON object of `excerpt hash -> score`.
pub async fn load_pins(path: &Path) -> Result<PinnedScores> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read pinned scores from {}", path.display()))?;
    let pins: HashMap<String, Score> =
        serde_json::from_str(&raw).context("Pinned scores file is not valid JSON")?;

    info!(pins = pins.len(), path = %path.display(), "Loaded pinned scores");
    Ok(Arc::new(pins))
}

/// Wraps a scorer so identical excerpts always get the same answer.
pub struct CachedScorer {
    inner: Arc<dyn EvidenceScorer>,
    cache: ScoreCache,
}

impl CachedScorer {
    pub fn new(inner: Arc<dyn EvidenceScorer>, cache: ScoreCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }
}

#[async_trait]
impl EvidenceScorer for CachedScorer {
    async fn score(
        &self,
        request: &ScoreRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Score>, ScoreError> {
        if let Some(hit) = self.cache.get(&request.excerpt) {
            debug!("Score cache hit");
            return Ok(hit);
        }

        let score = self.inner.score(request, cancel).await?;
        self.cache.insert(&request.excerpt, score.clone());
        Ok(score)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
